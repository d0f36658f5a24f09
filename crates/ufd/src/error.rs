// ai
//! 💀 Errors — the taxonomy of everything that can go sideways between a socket and a store.
//!
//! 🧠 Knowledge graph:
//! - `FetchError` / `DecodeError` → terminal for ONE source's run. The orchestrator logs it and moves on.
//! - `MappingError` → terminal for ONE record. The mapping stage logs it and keeps streaming.
//! - `PersistenceError` → terminal for ONE batch. The saver logs it and keeps saving.
//! - `ConfigurationError` → terminal for the process, at startup, before any byte is fetched.
//! - `IngestError` is the umbrella the orchestrator records per source run.
//!
//! The app-level glue (config loading, CLI) still speaks `anyhow`. These types exist for
//! the seams where the caller needs to know WHICH kind of sad it is. 🦆

use thiserror::Error;

/// 📡 The bytes never arrived, or stopped arriving halfway through.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 🔌 The request itself failed: DNS, TCP, TLS, timeout, the usual suspects.
    #[error("request to '{url}' failed: {message}")]
    Transport { url: String, message: String },
    /// 🚫 The server answered, just not with a 2xx.
    #[error("'{url}' answered with status {status}")]
    Status { url: String, status: u16 },
    /// 💔 The body stream broke mid-flight. Not retried: a half-read array is a hard failure.
    #[error("body stream from '{url}' broke after {bytes_read} bytes: {message}")]
    BrokenStream {
        url: String,
        bytes_read: u64,
        message: String,
    },
    /// 🧾 A metadata GET returned something that was not the JSON we asked for.
    #[error("response from '{url}' was not valid JSON: {message}")]
    InvalidBody { url: String, message: String },
}

/// 🧩 The bytes arrived but they were not the JSON array we were promised.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// 💀 Malformed JSON. `offset` is the absolute byte offset in the stream.
    #[error("malformed JSON at byte {offset}: {message} (near {context:?})")]
    Parse {
        offset: u64,
        message: String,
        context: String,
    },
    /// 📐 Valid-looking JSON, wrong shape: the top level is not an array.
    #[error("expected a top-level JSON array, found {found}")]
    Schema { found: String },
    /// 🐘 One element outgrew the per-element buffer ceiling.
    #[error("array element starting at byte {offset} exceeds {limit} bytes")]
    ElementTooLarge { offset: u64, limit: usize },
    /// 🔌 The transport underneath the decoder failed.
    #[error(transparent)]
    Transport(#[from] FetchError),
}

/// 🏷️ A single raw value refused to become a canonical record.
#[derive(Debug, Error)]
pub enum MappingError {
    /// 📜 The mapped fields violate a canonical-record invariant.
    #[error("source '{source_name}' produced an invalid record: {reason}")]
    InvalidRecord {
        source_name: String,
        reason: RecordError,
        /// ✂️ A short rendering of the offending value, for the log line.
        preview: String,
    },
}

/// 📜 Canonical-record construction invariants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("record must have a non-empty source")]
    MissingSource,
    #[error("record must have a non-empty externalId")]
    MissingExternalId,
    #[error("pricePerNight must be a finite number >= 0, got {0}")]
    InvalidPrice(f64),
}

/// 🗄️ The store said no to a batch.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("store rejected the batch with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("store accepted the request but {failed} of {total} records failed: {first_reason}")]
    PartialFailure {
        failed: usize,
        total: usize,
        first_reason: String,
    },
    #[error("failed to serialize record for the store: {0}")]
    Serialization(String),
}

/// 🔧 Something in the config is wrong. Found at startup, never mid-run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("batch size must be greater than zero, got {0}")]
    InvalidBatchSize(i64),
    #[error("save concurrency must be greater than zero, got {0}")]
    InvalidConcurrency(i64),
    #[error("source #{index} has an empty name")]
    MissingSourceName { index: usize },
    #[error("source '{name}' has no url")]
    MissingSourceUrl { name: String },
    #[error("source '{name}' is registered more than once")]
    DuplicateSource { name: String },
    #[error("unknown mapper '{0}' (expected one of: source1, source2)")]
    UnknownMapper(String),
    #[error("max element bytes must be greater than zero")]
    InvalidElementLimit,
}

/// ☂️ Everything that can end a single source's run. Mapping and persistence failures are
/// contained at their own stage and never end up in here.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// 🏷️ Short label for summaries and logs, so a table cell doesn't hold a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestErrorKind {
    Fetch,
    Decode,
}

impl IngestError {
    pub fn kind(&self) -> IngestErrorKind {
        match self {
            IngestError::Fetch(_) => IngestErrorKind::Fetch,
            IngestError::Decode(DecodeError::Transport(_)) => IngestErrorKind::Fetch,
            IngestError::Decode(_) => IngestErrorKind::Decode,
        }
    }
}

impl std::fmt::Display for IngestErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            IngestErrorKind::Fetch => "fetch",
            IngestErrorKind::Decode => "decode",
        };
        f.write_str(label)
    }
}
