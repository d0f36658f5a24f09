// ai
//! 📦 Batcher — groups a lazy stream of records into fixed-size, ordered batches.
//!
//! The last batch may be short. An empty stream yields no batches at all, not one empty one.
//! Everything else is `StreamExt::chunks` doing what it was born to do.

use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::record::{Batch, CanonicalRecord};

const DEFAULT_BATCH_SIZE: usize = 5000;

/// 🔢 A batch size that has already been checked. Zero or negative never makes it this far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i64")]
pub struct BatchSize(usize);

impl BatchSize {
    pub fn new(size: i64) -> Result<Self, ConfigurationError> {
        if size <= 0 {
            return Err(ConfigurationError::InvalidBatchSize(size));
        }
        usize::try_from(size)
            .map(BatchSize)
            .map_err(|_| ConfigurationError::InvalidBatchSize(size))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        BatchSize(DEFAULT_BATCH_SIZE)
    }
}

impl TryFrom<i64> for BatchSize {
    type Error = ConfigurationError;

    fn try_from(size: i64) -> Result<Self, Self::Error> {
        BatchSize::new(size)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Batcher {
    size: BatchSize,
}

impl Batcher {
    pub fn new(size: BatchSize) -> Self {
        Self { size }
    }

    /// 🚰 Lazily regroup `records`. Pulls upstream only as fast as batches are pulled downstream.
    /// The stream owns everything it needs, so the `Batcher` itself can be a temporary.
    pub fn batches<S>(&self, records: S) -> impl Stream<Item = Batch> + use<S>
    where
        S: Stream<Item = CanonicalRecord>,
    {
        records.chunks(self.size.get())
    }
}
