// AI
//! 📊 progress.rs — "Are we there yet?" — every ingestion, every hour, forever.
//!
//! 🚀 Two jobs: a live spinner per source while the bytes flow (we never know the total size of
//! a streamed array, so no percent bar, only honest counting), and a comfy-table receipt
//! once `ingest_all` returns.
//!
//! ⚠️ Watching the spinner will not make it go faster. We've tried. Science says no.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use indicatif::{ProgressBar, ProgressStyle};

use crate::orchestrator::{IngestionSummary, SourceRunState};

// -- 📏 one mebibyte. not a megabyte, pedants. I will die on this hill.
const MIB: u64 = 1024 * 1024;

// -- 🎨 redraw every N records. redrawing on every record is how terminals catch fire.
const RENDER_EVERY: u64 = 1000;

/// 📦 Bytes, scaled to something a human can read at 3am.
fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// 🔢 "1000000" → "1,000,000". You're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS if you should probably call your mom.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Live counters for one source's run. Shared by reference between pipeline stages,
/// hence the atomics.
pub(crate) struct ProgressMetrics {
    source_name: String,
    bytes: AtomicU64,
    records: AtomicU64,
    progress_bar: ProgressBar,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("bytes", &self.bytes)
            .field("records", &self.records)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 A spinner on stderr. indicatif hides it on its own when stderr isn't a terminal.
    pub(crate) fn new(source_name: &str) -> Self {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        progress_bar.enable_steady_tick(Duration::from_millis(120));
        Self::with_bar(source_name, progress_bar)
    }

    /// 🙈 Same counters, no drawing.
    pub(crate) fn hidden(source_name: &str) -> Self {
        Self::with_bar(source_name, ProgressBar::hidden())
    }

    fn with_bar(source_name: &str, progress_bar: ProgressBar) -> Self {
        Self {
            source_name: source_name.to_string(),
            bytes: AtomicU64::new(0),
            records: AtomicU64::new(0),
            progress_bar,
            start_time: Instant::now(),
        }
    }

    pub(crate) fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_record(&self) {
        let seen = self.records.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % RENDER_EVERY == 0 {
            self.render();
        }
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// 📈 Records per second since the run started. Zero until a measurable instant has passed.
    fn records_per_sec(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records() as f64 / elapsed
        } else {
            0.0
        }
    }

    fn render(&self) {
        self.progress_bar.set_message(format!(
            "{} | {} records | {} | {} rec/s | {}",
            self.source_name,
            format_number(self.records()),
            format_bytes(self.bytes()),
            format_number(self.records_per_sec() as u64),
            format_duration(self.start_time.elapsed()),
        ));
    }

    /// ✅ Final redraw, then get off the screen.
    pub(crate) fn finish(&self) {
        self.render();
        self.progress_bar.finish_and_clear();
    }
}

/// 🍽️ One row per source: what happened, how much, how long. The CLI prints this last.
pub fn summary_table(summary: &IngestionSummary) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Disabled);
    table.set_header(vec![
        "source", "state", "bytes", "decoded", "mapped", "skipped", "batches ok", "batches failed",
        "saved", "elapsed", "error",
    ]);

    for run in &summary.runs {
        let state = match (run.state, run.error_kind) {
            (SourceRunState::Failed, Some(kind)) => format!("{} ({})", run.state, kind),
            (state, _) => state.to_string(),
        };
        let right = |n: u64| Cell::new(format_number(n)).set_alignment(CellAlignment::Right);
        table.add_row(vec![
            Cell::new(&run.name),
            Cell::new(state),
            Cell::new(format_bytes(run.bytes_read)).set_alignment(CellAlignment::Right),
            right(run.records_decoded),
            right(run.records_mapped),
            right(run.records_skipped),
            right(run.save_report.batches_saved),
            right(run.save_report.batches_failed),
            right(run.save_report.records_saved),
            Cell::new(format_duration(run.elapsed)).set_alignment(CellAlignment::Right),
            Cell::new(run.error.as_deref().unwrap_or("")),
        ]);
    }
    table.to_string()
}
