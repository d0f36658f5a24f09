// ai
//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 Byte sources pour the document in, record stores soak the records up.
//! Everything in between (decode, map, batch, save scheduling) is I/O-free and lives elsewhere.
//!
//! 🧠 Knowledge graph:
//! - [`ByteStreamSource`]: "give me the body of this URL, a chunk at a time". Implemented by
//!   [`HttpStreamSource`] (reqwest) and [`InMemoryByteSource`] (tests, dry runs).
//! - [`RecordStore`]: idempotent `save_all` keyed by `(source, external_id)`. Implemented by
//!   [`InMemoryStore`] and [`ElasticsearchStore`], dispatched through [`StoreBackend`].
//! - Store selection comes from config ([`StoreConfig`]), resolved once at startup.
//!
//! 🦆 The duck is here because every file must have one.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Deserialize;

use crate::error::{FetchError, PersistenceError};
use crate::record::CanonicalRecord;

pub mod elasticsearch;
pub mod http_source;
pub mod in_mem;

pub use elasticsearch::{ElasticsearchStore, ElasticsearchStoreConfig};
pub use http_source::HttpStreamSource;
pub use in_mem::{InMemoryByteSource, InMemoryStore};

/// 🧱 A document body, arriving one `Bytes` chunk at a time. Ends on EOF or the first error.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

// ===== Byte sources =====

/// 📡 Something that can open a URL and hand back its body as a byte stream.
///
/// # Contract
/// - `get_stream` resolves once the response headers are in (status checked), not when the
///   body is done. The body is pulled lazily through the returned stream.
/// - Attempted once. A body that breaks halfway is reported through the stream as an `Err`
///   item, and nobody retries it.
#[async_trait]
pub trait ByteStreamSource: Send + Sync {
    async fn get_stream(&self, url: &str) -> Result<ByteStream, FetchError>;
}

// ===== Record stores =====

/// 🗄️ The persistence boundary.
///
/// # Contract
/// - Upsert keyed by `(source, external_id)`. Saving the same records twice leaves one row per
///   key holding the last write. Never duplicates.
/// - Any batch size is accepted; backends chunk internally if their wire protocol needs it.
/// - An `Err` means the batch as a whole should be treated as failed. The caller decides what
///   that means (the saver logs it and moves on).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save_all(&self, records: &[CanonicalRecord]) -> Result<(), PersistenceError>;
}

/// 🔧 Which store the records land in.
///
/// ```toml
/// [store.Elasticsearch]
/// url = "http://localhost:9200"
/// index = "unified-data"
/// ```
/// or `[store.InMemory]` for a dry run that forgets everything on exit.
#[derive(Debug, Deserialize, Clone)]
pub enum StoreConfig {
    InMemory {},
    Elasticsearch(ElasticsearchStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::InMemory {}
    }
}

/// 🎭 The many faces of a store. The orchestrator holds one and never asks which.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    InMemory(InMemoryStore),
    Elasticsearch(ElasticsearchStore),
}

impl StoreBackend {
    /// 🏗️ Build the configured store. Elasticsearch gets pinged on the way up, so a dead
    /// cluster fails the process at startup instead of failing every batch later.
    pub async fn from_config(config: &StoreConfig) -> anyhow::Result<Self> {
        match config {
            StoreConfig::InMemory {} => Ok(StoreBackend::InMemory(InMemoryStore::new())),
            StoreConfig::Elasticsearch(es) => {
                Ok(StoreBackend::Elasticsearch(ElasticsearchStore::new(es.clone()).await?))
            }
        }
    }
}

#[async_trait]
impl RecordStore for StoreBackend {
    async fn save_all(&self, records: &[CanonicalRecord]) -> Result<(), PersistenceError> {
        match self {
            StoreBackend::InMemory(store) => store.save_all(records).await,
            StoreBackend::Elasticsearch(store) => store.save_all(records).await,
        }
    }
}
