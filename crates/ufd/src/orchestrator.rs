// ai
//! 🎼 Ingestion Orchestrator — wires fetch → decode → map → batch → save, one source at a time.
//!
//! 🎬 COLD OPEN — INT. CONTROL ROOM — THE TOP OF THE HOUR
//!
//! The cron fires. The orchestrator looks at its clipboard: two sources, registered in order.
//! It opens the first URL, and the bytes start to flow through the pipes. Somewhere around
//! record 4,812 a hotel claims to cost negative five dollars a night. The orchestrator logs it,
//! skips it, and does not even look up from the clipboard.
//!
//! ## Knowledge Graph 🧠
//! - Per-source state: `Idle → Fetching → Streaming → Done | Failed`, recorded in a [`SourceRun`].
//! - Fetch and decode failures end that source's run, never the whole `ingest_all`.
//! - Mapping failures end one record. Save failures end one batch (see `saver`).
//! - Sources run sequentially, in registration order. Inside a source, only saves overlap.
//! - Backpressure is free: every stage is a lazy `Stream`, pulled by the saver.
//! - `register_source` takes `&mut self`, `ingest_all` takes `&self`: registering during a run
//!   does not compile, which is the strongest "please don't" we could find. 🦆

use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::backends::{ByteStreamSource, RecordStore};
use crate::batcher::{BatchSize, Batcher};
use crate::decoder::{DEFAULT_MAX_ELEMENT_BYTES, decode_array};
use crate::error::{ConfigurationError, DecodeError, IngestError, IngestErrorKind, MappingError};
use crate::mappers::{MapperBackend, RecordMapper};
use crate::progress::ProgressMetrics;
use crate::saver::{BatchSaver, SaveConcurrency, SaveReport};

/// 📋 One registered source: where to fetch, and which mapper speaks its dialect.
#[derive(Debug, Clone)]
pub struct IngestionSource {
    pub name: String,
    pub url: String,
    pub mapper: MapperBackend,
}

/// 🔧 The knobs every per-source pipeline shares.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub batch_size: BatchSize,
    pub save_concurrency: SaveConcurrency,
    pub max_element_bytes: usize,
    /// 📊 Draw an indicatif spinner per source. Off for tests and pipes.
    pub show_progress: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: BatchSize::default(),
            save_concurrency: SaveConcurrency::default(),
            max_element_bytes: DEFAULT_MAX_ELEMENT_BYTES,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRunState {
    Idle,
    Fetching,
    Streaming,
    Done,
    Failed,
}

impl std::fmt::Display for SourceRunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SourceRunState::Idle => "idle",
            SourceRunState::Fetching => "fetching",
            SourceRunState::Streaming => "streaming",
            SourceRunState::Done => "done",
            SourceRunState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// 🧾 How one source's run went.
#[derive(Debug, Clone)]
pub struct SourceRun {
    pub name: String,
    pub state: SourceRunState,
    pub bytes_read: u64,
    pub records_decoded: u64,
    pub records_mapped: u64,
    pub records_skipped: u64,
    pub save_report: SaveReport,
    pub elapsed: Duration,
    pub error_kind: Option<IngestErrorKind>,
    pub error: Option<String>,
}

impl SourceRun {
    fn idle(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: SourceRunState::Idle,
            bytes_read: 0,
            records_decoded: 0,
            records_mapped: 0,
            records_skipped: 0,
            save_report: SaveReport::default(),
            elapsed: Duration::ZERO,
            error_kind: None,
            error: None,
        }
    }

    fn fail(&mut self, err: IngestError) {
        self.state = SourceRunState::Failed;
        self.error_kind = Some(err.kind());
        self.error = Some(err.to_string());
    }
}

/// 📜 The receipt for one `ingest_all` call. Informational: nobody has to read it.
#[derive(Debug, Clone, Default)]
pub struct IngestionSummary {
    pub runs: Vec<SourceRun>,
}

impl IngestionSummary {
    pub fn records_saved(&self) -> u64 {
        self.runs.iter().map(|r| r.save_report.records_saved).sum()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceRun> {
        self.runs.iter().filter(|r| r.state == SourceRunState::Failed)
    }

    pub fn run(&self, name: &str) -> Option<&SourceRun> {
        self.runs.iter().find(|r| r.name == name)
    }
}

/// 🎼 Owns the source list, the byte source, the store, and the shutdown switch.
#[derive(Debug)]
pub struct Orchestrator<S, St> {
    sources: Vec<IngestionSource>,
    byte_source: S,
    store: St,
    settings: PipelineSettings,
    shutdown: CancellationToken,
}

impl<S: ByteStreamSource, St: RecordStore> Orchestrator<S, St> {
    pub fn new(byte_source: S, store: St, settings: PipelineSettings) -> Self {
        Self {
            sources: Vec::new(),
            byte_source,
            store,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// ➕ Append a source. Runs happen in registration order.
    ///
    /// # Errors
    /// 💀 [`ConfigurationError`] for an empty name, an empty url, or a name that's already taken.
    pub fn register_source(&mut self, source: IngestionSource) -> Result<(), ConfigurationError> {
        if source.name.trim().is_empty() {
            return Err(ConfigurationError::MissingSourceName {
                index: self.sources.len(),
            });
        }
        if source.url.trim().is_empty() {
            return Err(ConfigurationError::MissingSourceUrl { name: source.name });
        }
        if self.sources.iter().any(|s| s.name == source.name) {
            return Err(ConfigurationError::DuplicateSource { name: source.name });
        }
        self.sources.push(source);
        Ok(())
    }

    pub fn sources(&self) -> &[IngestionSource] {
        &self.sources
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// 🛑 Cancel this token to stop after the in-flight saves drain. Sources not yet started
    /// are left `Idle`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 🚀 Run every registered source, one after the other. Never fails as a whole.
    pub async fn ingest_all(&self) -> IngestionSummary {
        let mut summary = IngestionSummary::default();
        for source in &self.sources {
            if self.shutdown.is_cancelled() {
                warn!("🛑 shutdown requested, not starting source '{}'", source.name);
                summary.runs.push(SourceRun::idle(&source.name));
                continue;
            }
            let span = info_span!("ingest", source = %source.name);
            let run = self.ingest_source(source).instrument(span).await;
            summary.runs.push(run);
        }
        summary
    }

    async fn ingest_source(&self, source: &IngestionSource) -> SourceRun {
        let started = Instant::now();
        let mut run = SourceRun::idle(&source.name);
        info!("🚀 Starting ingestion for '{}' from {}", source.name, source.url);

        run.state = SourceRunState::Fetching;
        let bytes = match self.byte_source.get_stream(&source.url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                run.fail(err.into());
                run.elapsed = started.elapsed();
                warn!("💀 Ingestion for '{}' failed before streaming: {}", source.name, run.error.as_deref().unwrap_or_default());
                return run;
            }
        };

        run.state = SourceRunState::Streaming;
        let metrics = if self.settings.show_progress {
            ProgressMetrics::new(&source.name)
        } else {
            ProgressMetrics::hidden(&source.name)
        };

        let mut decoded = 0u64;
        let mut mapped = 0u64;
        let mut skipped = 0u64;
        let mut stream_failure: Option<DecodeError> = None;

        let counted_bytes = bytes.inspect(|chunk| {
            if let Ok(chunk) = chunk {
                metrics.add_bytes(chunk.len() as u64);
            }
        });
        let records = decode_array(counted_bytes, self.settings.max_element_bytes).filter_map(|item| {
            let record = match item {
                Ok(raw) => {
                    decoded += 1;
                    metrics.add_record();
                    match source.mapper.map(raw) {
                        Ok(record) => {
                            mapped += 1;
                            Some(record)
                        }
                        Err(err) => {
                            skipped += 1;
                            log_skipped(&source.name, &err);
                            None
                        }
                    }
                }
                Err(err) => {
                    // -- 🧹 the stream ends here; records already decoded still flush as a short batch
                    stream_failure = Some(err);
                    None
                }
            };
            futures::future::ready(record)
        });

        let batches = Batcher::new(self.settings.batch_size).batches(records);
        let report = BatchSaver::new(&self.store, self.settings.save_concurrency)
            .save_batches(batches, &self.shutdown)
            .await;

        metrics.finish();
        run.bytes_read = metrics.bytes();
        run.records_decoded = decoded;
        run.records_mapped = mapped;
        run.records_skipped = skipped;
        run.elapsed = started.elapsed();

        match stream_failure {
            Some(err) => run.fail(err.into()),
            None if report.stopped_early => {
                run.state = SourceRunState::Failed;
                run.error = Some("stopped by shutdown before the document was fully ingested".to_string());
            }
            None => run.state = SourceRunState::Done,
        }
        run.save_report = report;

        match run.state {
            SourceRunState::Done => info!(
                "✅ Finished ingestion for '{}': {} decoded, {} mapped, {} skipped, {} saved, {} batches failed in {:?}",
                source.name,
                run.records_decoded,
                run.records_mapped,
                run.records_skipped,
                run.save_report.records_saved,
                run.save_report.batches_failed,
                run.elapsed
            ),
            _ => warn!(
                "💀 Ingestion for '{}' failed after {} records: {}",
                source.name,
                run.records_decoded,
                run.error.as_deref().unwrap_or_default()
            ),
        }
        run
    }
}

fn log_skipped(source_name: &str, err: &MappingError) {
    match err {
        MappingError::InvalidRecord { preview, .. } => {
            warn!("⚠️ Skipping record from '{}': {} (record: {})", source_name, err, preview);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryByteSource, InMemoryStore};
    use crate::error::PersistenceError;
    use crate::mappers::MapperKind;
    use crate::record::{CanonicalRecord, RecordKey};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn source(name: &str, url: &str, kind: MapperKind) -> IngestionSource {
        IngestionSource {
            name: name.into(),
            url: url.into(),
            mapper: MapperBackend::from_kind(kind),
        }
    }

    fn orchestrator(
        bytes: InMemoryByteSource,
        settings: PipelineSettings,
    ) -> Orchestrator<InMemoryByteSource, InMemoryStore> {
        Orchestrator::new(bytes, InMemoryStore::new(), settings)
    }

    #[tokio::test]
    async fn the_one_where_the_negative_price_hotel_is_left_at_the_door() {
        let doc = r#"[{"id":1,"priceForNight":"100"},{"id":2,"priceForNight":-5},{"priceForNight":50}]"#;
        let mut o = orchestrator(
            InMemoryByteSource::new(7).with_document("mem://s1", doc),
            PipelineSettings::default(),
        );
        o.register_source(source("source1", "mem://s1", MapperKind::Source1))
            .expect("💀 registration failed");

        let summary = o.ingest_all().await;
        let run = summary.run("source1").expect("💀 no run recorded");
        assert_eq!(run.state, SourceRunState::Done);
        assert_eq!(run.records_decoded, 3);
        assert_eq!(run.records_mapped, 2);
        assert_eq!(run.records_skipped, 1);

        let stored = o.store().snapshot().await;
        assert_eq!(stored.len(), 2);

        let first = o
            .store()
            .get(&RecordKey {
                source: "source1".into(),
                external_id: "1".into(),
            })
            .await
            .expect("💀 record 1 should be persisted");
        assert_eq!(first.price_per_night(), Some(100.0));

        let synthesized: Vec<&CanonicalRecord> = stored
            .iter()
            .filter(|r| r.external_id().starts_with("missing-source1-"))
            .collect();
        assert_eq!(synthesized.len(), 1);
        assert_eq!(synthesized[0].price_per_night(), Some(50.0));
        assert!(stored.iter().all(|r| r.external_id() != "2"), "the bad hotel never lands");
    }

    #[tokio::test]
    async fn the_one_where_an_empty_feed_bothers_nobody() {
        let mut o = orchestrator(
            InMemoryByteSource::new(1).with_document("mem://empty", "[]"),
            PipelineSettings::default(),
        );
        o.register_source(source("source1", "mem://empty", MapperKind::Source1))
            .expect("💀 registration failed");

        let summary = o.ingest_all().await;
        let run = summary.run("source1").expect("💀 no run recorded");
        assert_eq!(run.state, SourceRunState::Done);
        assert_eq!(run.save_report.batches_dispatched, 0);
        assert_eq!(o.store().save_calls(), 0);
        assert!(run.error.is_none());
    }

    #[tokio::test]
    async fn the_one_where_twelve_thousand_and_one_hotels_arrive_in_three_batches() {
        let doc = format!(
            "[{}]",
            (0..12_001)
                .map(|i| format!(r#"{{"id":{i},"city":"C{i}","pricePerNight":{}}}"#, i % 300))
                .collect::<Vec<_>>()
                .join(",")
        );
        let mut o = orchestrator(
            InMemoryByteSource::new(64 * 1024).with_document("mem://big", doc),
            PipelineSettings::default(),
        );
        o.register_source(source("source2", "mem://big", MapperKind::Source2))
            .expect("💀 registration failed");

        let summary = o.ingest_all().await;
        let run = summary.run("source2").expect("💀 no run recorded");
        assert_eq!(run.state, SourceRunState::Done);
        assert_eq!(run.save_report.batches_saved, 3);

        let mut sizes = o.store().batch_sizes().await;
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2001, 5000, 5000], "each batch is exactly one save_all call");
        assert_eq!(o.store().save_calls(), 3);
        assert_eq!(o.store().len().await, 12_001);
    }

    #[tokio::test]
    async fn the_one_where_one_broken_source_does_not_ruin_the_morning() {
        let bytes = InMemoryByteSource::new(4)
            .with_document("mem://bad", r#"{"not":"an array"}"#)
            .with_broken_document("mem://flaky", r#"[{"id":"a"},{"id":"b"},{"id"#)
            .with_document("mem://good", r#"[{"id":"x","city":"Oslo"}]"#);
        let mut o = orchestrator(
            bytes,
            PipelineSettings {
                batch_size: BatchSize::new(1).expect("💀 bad batch size"),
                ..Default::default()
            },
        );
        o.register_source(source("bad", "mem://bad", MapperKind::Source1))
            .expect("💀 registration failed");
        o.register_source(source("missing", "mem://404", MapperKind::Source1))
            .expect("💀 registration failed");
        o.register_source(source("flaky", "mem://flaky", MapperKind::Source1))
            .expect("💀 registration failed");
        o.register_source(source("good", "mem://good", MapperKind::Source2))
            .expect("💀 registration failed");

        let summary = o.ingest_all().await;
        let names: Vec<&str> = summary.runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["bad", "missing", "flaky", "good"], "registration order holds");

        let bad = summary.run("bad").expect("💀 no run for bad");
        assert_eq!(bad.state, SourceRunState::Failed);
        assert_eq!(bad.error_kind, Some(IngestErrorKind::Decode));

        let missing = summary.run("missing").expect("💀 no run for missing");
        assert_eq!(missing.state, SourceRunState::Failed);
        assert_eq!(missing.error_kind, Some(IngestErrorKind::Fetch));

        let flaky = summary.run("flaky").expect("💀 no run for flaky");
        assert_eq!(flaky.state, SourceRunState::Failed);
        assert_eq!(flaky.error_kind, Some(IngestErrorKind::Fetch));
        assert_eq!(flaky.records_decoded, 2, "elements before the break still count");
        assert_eq!(flaky.save_report.records_saved, 2, "and still land");

        let good = summary.run("good").expect("💀 no run for good");
        assert_eq!(good.state, SourceRunState::Done);
        assert_eq!(summary.failed_sources().count(), 3);
        assert_eq!(o.store().len().await, 3);
    }

    /// 🧪 A store that rejects exactly one call and remembers everything else.
    #[derive(Debug, Clone, Default)]
    struct GrumpyOnceStore {
        inner: InMemoryStore,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RecordStore for GrumpyOnceStore {
        async fn save_all(&self, records: &[CanonicalRecord]) -> Result<(), PersistenceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(PersistenceError::Rejected {
                    status: 503,
                    body: "not today".into(),
                });
            }
            self.inner.save_all(records).await
        }
    }

    #[tokio::test]
    async fn the_one_where_a_grumpy_first_batch_does_not_stop_the_second() {
        let store = GrumpyOnceStore::default();
        let mut o = Orchestrator::new(
            InMemoryByteSource::new(16).with_document("mem://s", r#"[{"id":1},{"id":2},{"id":3},{"id":4}]"#),
            store.clone(),
            PipelineSettings {
                batch_size: BatchSize::new(2).expect("💀 bad batch size"),
                save_concurrency: SaveConcurrency::new(1).expect("💀 bad concurrency"),
                ..Default::default()
            },
        );
        o.register_source(source("source1", "mem://s", MapperKind::Source1))
            .expect("💀 registration failed");

        let summary = o.ingest_all().await;
        let run = summary.run("source1").expect("💀 no run recorded");
        assert_eq!(run.state, SourceRunState::Done, "a failed batch is not a failed source");
        assert_eq!(run.save_report.batches_failed, 1);
        assert_eq!(run.save_report.batches_saved, 1);
        assert_eq!(store.inner.len().await, 2);
    }

    #[test]
    fn the_one_where_registration_checks_the_paperwork() {
        let mut o = orchestrator(InMemoryByteSource::new(1), PipelineSettings::default());
        o.register_source(source("source1", "mem://a", MapperKind::Source1))
            .expect("💀 first registration failed");

        assert_eq!(
            o.register_source(source("source1", "mem://b", MapperKind::Source1)),
            Err(ConfigurationError::DuplicateSource {
                name: "source1".into()
            })
        );
        assert_eq!(
            o.register_source(source("source2", "  ", MapperKind::Source2)),
            Err(ConfigurationError::MissingSourceUrl {
                name: "source2".into()
            })
        );
        assert_eq!(
            o.register_source(source("", "mem://c", MapperKind::Source2)),
            Err(ConfigurationError::MissingSourceName { index: 1 })
        );
        assert_eq!(o.sources().len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_shutdown_means_nobody_new_gets_started() {
        let mut o = orchestrator(
            InMemoryByteSource::new(8)
                .with_document("mem://a", r#"[{"id":1}]"#)
                .with_document("mem://b", r#"[{"id":2}]"#),
            PipelineSettings::default(),
        );
        o.register_source(source("a", "mem://a", MapperKind::Source1))
            .expect("💀 registration failed");
        o.register_source(source("b", "mem://b", MapperKind::Source2))
            .expect("💀 registration failed");

        o.shutdown_token().cancel();
        let summary = o.ingest_all().await;
        assert!(summary.runs.iter().all(|r| r.state == SourceRunState::Idle));
        assert_eq!(o.store().save_calls(), 0);
    }

    /// 🎧 Collects the message of every `warn!` that announces a skipped record.
    #[derive(Debug, Clone, Default)]
    struct SkipListener {
        heard: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl<Sub: tracing::Subscriber> tracing_subscriber::Layer<Sub> for SkipListener {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, Sub>) {
            struct Message(String);
            impl tracing::field::Visit for Message {
                fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                    if field.name() == "message" {
                        self.0 = format!("{value:?}");
                    }
                }
            }

            if *event.metadata().level() != tracing::Level::WARN {
                return;
            }
            let mut message = Message(String::new());
            event.record(&mut message);
            if message.0.contains("Skipping record") {
                self.heard
                    .lock()
                    .expect("💀 listener mutex poisoned")
                    .push(message.0);
            }
        }
    }

    #[tokio::test]
    async fn the_one_where_the_bad_hotel_gets_exactly_one_warning() {
        use tracing_subscriber::layer::SubscriberExt;

        let listener = SkipListener::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(listener.clone()));

        let doc = r#"[{"id":1,"priceForNight":"100"},{"id":2,"priceForNight":-5},{"priceForNight":50}]"#;
        let mut o = orchestrator(
            InMemoryByteSource::new(5).with_document("mem://s1", doc),
            PipelineSettings::default(),
        );
        o.register_source(source("source1", "mem://s1", MapperKind::Source1))
            .expect("💀 registration failed");
        o.ingest_all().await;

        let heard = listener.heard.lock().expect("💀 listener mutex poisoned").clone();
        assert_eq!(heard.len(), 1, "heard {heard:?}");
        assert!(heard[0].contains("source1"), "the warning names the source: {}", heard[0]);
        assert!(heard[0].contains("-5"), "the warning previews the bad value: {}", heard[0]);
    }
}
