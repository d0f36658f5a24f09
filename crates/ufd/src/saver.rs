// ai
//! 🗄️ Bounded Batch Saver — at most `C` saves in flight, and no batch failure is contagious.
//!
//! 🎬 *[three checkout lanes. a queue of batches. the fourth batch waits politely.]*
//!
//! 🧠 Knowledge graph:
//! - The in-flight set is a `FuturesUnordered`, owned by this loop and nobody else. It borrows
//!   the store, so no `Arc`, no spawned tasks, no `'static` gymnastics.
//! - While below the ceiling we race "next batch from upstream" against "some save finished".
//!   At the ceiling we stop pulling upstream entirely. That pause IS the backpressure: the
//!   decoder stops reading bytes because nobody is asking for records.
//! - Each outcome is observed on its own. A failed save is logged with its batch size and
//!   counted. Siblings keep going. Nothing is retried.
//! - Cancellation stops the pulling, never the in-flight saves. Those get drained. 🦆

use std::pin::pin;

use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backends::RecordStore;
use crate::error::{ConfigurationError, PersistenceError};
use crate::record::Batch;

const DEFAULT_SAVE_CONCURRENCY: usize = 3;

/// 🚦 The in-flight ceiling. Zero is not a speed, it's a deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i64")]
pub struct SaveConcurrency(usize);

impl SaveConcurrency {
    pub fn new(ceiling: i64) -> Result<Self, ConfigurationError> {
        if ceiling <= 0 {
            return Err(ConfigurationError::InvalidConcurrency(ceiling));
        }
        usize::try_from(ceiling)
            .map(SaveConcurrency)
            .map_err(|_| ConfigurationError::InvalidConcurrency(ceiling))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for SaveConcurrency {
    fn default() -> Self {
        SaveConcurrency(DEFAULT_SAVE_CONCURRENCY)
    }
}

impl TryFrom<i64> for SaveConcurrency {
    type Error = ConfigurationError;

    fn try_from(ceiling: i64) -> Result<Self, Self::Error> {
        SaveConcurrency::new(ceiling)
    }
}

/// 📊 What happened to every batch that passed through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub batches_dispatched: u64,
    pub batches_saved: u64,
    pub batches_failed: u64,
    pub batches_skipped_empty: u64,
    pub records_saved: u64,
    pub records_failed: u64,
    /// 🛑 Cancellation arrived before upstream ran dry.
    pub stopped_early: bool,
}

struct BatchOutcome {
    batch_no: u64,
    size: usize,
    result: Result<(), PersistenceError>,
}

impl SaveReport {
    fn absorb(&mut self, outcome: BatchOutcome) {
        match outcome.result {
            Ok(()) => {
                debug!("✅ batch #{} saved ({} records)", outcome.batch_no, outcome.size);
                self.batches_saved += 1;
                self.records_saved += outcome.size as u64;
            }
            Err(err) => {
                error!(
                    batch = outcome.batch_no,
                    batch_size = outcome.size,
                    "💀 batch #{} of {} records failed to save: {}",
                    outcome.batch_no,
                    outcome.size,
                    err
                );
                self.batches_failed += 1;
                self.records_failed += outcome.size as u64;
            }
        }
    }
}

/// 🗄️ Schedules `save_all` calls against one store with a fixed ceiling.
#[derive(Debug)]
pub struct BatchSaver<'a, St> {
    store: &'a St,
    concurrency: SaveConcurrency,
}

impl<'a, St: RecordStore> BatchSaver<'a, St> {
    pub fn new(store: &'a St, concurrency: SaveConcurrency) -> Self {
        Self { store, concurrency }
    }

    /// 🚀 Drain `batches` into the store. Always returns a report; never returns an error.
    pub async fn save_batches<S>(&self, batches: S, cancel: &CancellationToken) -> SaveReport
    where
        S: Stream<Item = Batch>,
    {
        let ceiling = self.concurrency.get();
        let mut batches = pin!(batches);
        let mut in_flight = FuturesUnordered::new();
        let mut report = SaveReport::default();

        loop {
            if in_flight.len() >= ceiling {
                // -- 🚦 lane's full. upstream waits until someone checks out.
                if let Some(outcome) = in_flight.next().await {
                    report.absorb(outcome);
                }
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("🛑 shutdown requested, draining {} in-flight saves", in_flight.len());
                    report.stopped_early = true;
                    break;
                }
                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                    report.absorb(outcome);
                }
                next = batches.next() => match next {
                    None => break,
                    Some(batch) if batch.is_empty() => report.batches_skipped_empty += 1,
                    Some(batch) => {
                        report.batches_dispatched += 1;
                        let batch_no = report.batches_dispatched;
                        debug!("📤 dispatching batch #{} ({} records)", batch_no, batch.len());
                        in_flight.push(self.save_one(batch_no, batch));
                    }
                },
            }
        }

        while let Some(outcome) = in_flight.next().await {
            report.absorb(outcome);
        }
        report
    }

    async fn save_one(&self, batch_no: u64, batch: Batch) -> BatchOutcome {
        let result = self.store.save_all(&batch).await;
        BatchOutcome {
            batch_no,
            size: batch.len(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryStore;
    use crate::record::{CanonicalRecord, NewRecord};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn batch(start: usize, len: usize) -> Batch {
        (start..start + len)
            .map(|i| {
                CanonicalRecord::create(NewRecord {
                    source: "source1".into(),
                    external_id: i.to_string(),
                    ..Default::default()
                })
                .expect("💀 fixture record rejected")
            })
            .collect()
    }

    /// 🐢 A store that takes its time and keeps score of how crowded it got.
    #[derive(Debug, Default, Clone)]
    struct SlowCountingStore {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
        /// An external id whose presence makes the whole batch fail.
        poison: Option<String>,
    }

    #[async_trait]
    impl RecordStore for SlowCountingStore {
        async fn save_all(&self, records: &[CanonicalRecord]) -> Result<(), PersistenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            match &self.poison {
                Some(bad) if records.iter().any(|r| r.external_id() == bad) => {
                    Err(PersistenceError::Transport("store hiccup".into()))
                }
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn the_one_where_zero_lanes_is_not_a_config() {
        assert_eq!(SaveConcurrency::new(0), Err(ConfigurationError::InvalidConcurrency(0)));
        assert_eq!(SaveConcurrency::default().get(), 3);
    }

    #[tokio::test]
    async fn the_one_where_the_ceiling_is_never_breached() {
        for ceiling in [1i64, 2, 3, 5] {
            let store = SlowCountingStore::default();
            let saver = BatchSaver::new(&store, SaveConcurrency::new(ceiling).expect("💀 bad ceiling"));
            let batches: Vec<Batch> = (0..12).map(|i| batch(i * 10, 10)).collect();

            let report = saver
                .save_batches(stream::iter(batches), &CancellationToken::new())
                .await;

            assert_eq!(report.batches_saved, 12);
            assert_eq!(store.calls.load(Ordering::SeqCst), 12);
            let peak = store.peak.load(Ordering::SeqCst);
            assert!(peak <= ceiling as usize, "peak {peak} exceeded ceiling {ceiling}");
            if ceiling > 1 {
                assert!(peak > 1, "saves should actually overlap, peak was {peak}");
            }
        }
    }

    #[tokio::test]
    async fn the_one_where_one_bad_batch_does_not_spoil_the_rest() {
        let store = SlowCountingStore {
            poison: Some("15".into()),
            ..Default::default()
        };
        let saver = BatchSaver::new(&store, SaveConcurrency::default());
        let batches = vec![batch(0, 10), batch(10, 10), batch(20, 10), batch(30, 5)];

        let report = saver
            .save_batches(stream::iter(batches), &CancellationToken::new())
            .await;

        assert_eq!(report.batches_dispatched, 4);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.batches_saved, 3);
        assert_eq!(report.records_failed, 10);
        assert_eq!(report.records_saved, 25);
        assert_eq!(store.calls.load(Ordering::SeqCst), 4, "later batches were still attempted");
    }

    #[tokio::test]
    async fn the_one_where_empty_batches_never_bother_the_store() {
        let store = InMemoryStore::new();
        let saver = BatchSaver::new(&store, SaveConcurrency::default());
        let report = saver
            .save_batches(stream::iter(vec![Vec::new(), batch(0, 2), Vec::new()]), &CancellationToken::new())
            .await;

        assert_eq!(report.batches_skipped_empty, 2);
        assert_eq!(report.batches_dispatched, 1);
        assert_eq!(store.save_calls(), 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn the_one_where_no_batches_means_no_calls() {
        let store = InMemoryStore::new();
        let report = BatchSaver::new(&store, SaveConcurrency::default())
            .save_batches(stream::iter(Vec::<Batch>::new()), &CancellationToken::new())
            .await;
        assert_eq!(report, SaveReport::default());
        assert_eq!(store.save_calls(), 0);
    }

    #[tokio::test]
    async fn the_one_where_cancellation_stops_pulling_but_finishes_what_started() {
        let store = InMemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = BatchSaver::new(&store, SaveConcurrency::default())
            .save_batches(stream::iter(vec![batch(0, 3), batch(3, 3)]), &cancel)
            .await;

        assert!(report.stopped_early);
        assert_eq!(report.batches_dispatched, 0, "a cancelled saver pulls nothing new");
        assert_eq!(store.save_calls(), 0);
    }

    #[tokio::test]
    async fn the_one_where_cancelling_mid_run_drains_the_in_flight_saves() {
        let store = SlowCountingStore::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        // -- 🎬 the third batch pulls the plug on its way out of upstream
        let batches = stream::iter((0..10).map(|i| batch(i * 2, 2))).inspect(move |b| {
            if b[0].external_id() == "4" {
                trigger.cancel();
            }
        });

        let report = BatchSaver::new(&store, SaveConcurrency::new(5).expect("💀 bad ceiling"))
            .save_batches(batches, &cancel)
            .await;

        assert!(report.stopped_early);
        assert_eq!(report.batches_dispatched, 3);
        assert_eq!(report.batches_saved, 3, "in-flight saves were awaited, not abandoned");
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }
}
