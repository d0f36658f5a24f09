// ai
//! # Previously, on Unifeed...
//!
//! 🎬 The records needed somewhere to land that wasn't a cluster, wasn't a disk, and wasn't
//! going to page anyone at 3am. So we built a store that lives entirely in RAM and forgets
//! everything the moment the process exits. Also a byte source that serves documents out of
//! a `HashMap`, because integration tests deserve an internet that never goes down.
//!
//! ⚠️ NOT for production. For tests and dry runs. If this ends up in prod, please also deploy
//! a therapist.
//!
//! 🧠 Knowledge graph:
//! - [`InMemoryStore`] honours the full [`RecordStore`] contract: upsert by key, uuid identity
//!   on first write, `created_at` preserved and `updated_at` refreshed on later writes.
//! - Everything is behind `Arc`s so tests can clone a handle, give the original to the
//!   orchestrator, and inspect what arrived afterwards.
//! - [`InMemoryByteSource`] re-chunks each document at a fixed size so chunk boundaries land in
//!   awkward places on purpose. 🦆

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::trace;
use uuid::Uuid;

use super::{ByteStream, ByteStreamSource, RecordStore};
use crate::error::{FetchError, PersistenceError};
use crate::record::{CanonicalRecord, RecordKey};

/// 📦 A store that never forgets. Until the process exits. Then it forgets everything.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    records: Arc<Mutex<HashMap<RecordKey, CanonicalRecord>>>,
    save_calls: Arc<AtomicUsize>,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🔢 Distinct keys stored.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn get(&self, key: &RecordKey) -> Option<CanonicalRecord> {
        self.records.lock().await.get(key).cloned()
    }

    /// 📋 Every stored record, sorted by key so assertions don't depend on hash order.
    pub async fn snapshot(&self) -> Vec<CanonicalRecord> {
        let mut all: Vec<CanonicalRecord> = self.records.lock().await.values().cloned().collect();
        all.sort_by_key(CanonicalRecord::key);
        all
    }

    /// 📞 How many times `save_all` was called, empty calls included.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// 📏 The size of every batch handed to `save_all`, in call order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().await.clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn save_all(&self, records: &[CanonicalRecord]) -> Result<(), PersistenceError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().await.push(records.len());

        let now = Utc::now();
        let mut stored = self.records.lock().await;
        for record in records {
            let key = record.key();
            let previous_identity = stored
                .get(&key)
                .and_then(|prev| Some((prev.id()?.to_string(), prev.created_at()?)));
            let persisted = match previous_identity {
                Some((id, created_at)) => record.with_identity(id, created_at, now),
                None => record.with_identity(Uuid::new_v4().to_string(), now, now),
            };
            stored.insert(key, persisted);
        }
        trace!("📦 in-memory store now holds {} records", stored.len());
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Body {
    Complete(Bytes),
    /// Serves these bytes, then fails as if the connection dropped.
    BreaksAfter(Bytes),
}

/// 🧪 A byte source backed by a map of `url → document`.
#[derive(Debug, Clone)]
pub struct InMemoryByteSource {
    documents: HashMap<String, Body>,
    chunk_size: usize,
}

impl InMemoryByteSource {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            documents: HashMap::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn with_document(mut self, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.documents.insert(url.into(), Body::Complete(body.into()));
        self
    }

    /// 💔 Register a document whose stream dies after `prefix` has been served.
    pub fn with_broken_document(mut self, url: impl Into<String>, prefix: impl Into<Bytes>) -> Self {
        self.documents.insert(url.into(), Body::BreaksAfter(prefix.into()));
        self
    }

    fn chunks_of(&self, body: &Bytes) -> Vec<Result<Bytes, FetchError>> {
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < body.len() {
            let end = (start + self.chunk_size).min(body.len());
            chunks.push(Ok(body.slice(start..end)));
            start = end;
        }
        chunks
    }
}

#[async_trait]
impl ByteStreamSource for InMemoryByteSource {
    async fn get_stream(&self, url: &str) -> Result<ByteStream, FetchError> {
        let chunks = match self.documents.get(url) {
            None => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
            Some(Body::Complete(body)) => self.chunks_of(body),
            Some(Body::BreaksAfter(prefix)) => {
                let mut chunks = self.chunks_of(prefix);
                chunks.push(Err(FetchError::BrokenStream {
                    url: url.to_string(),
                    bytes_read: prefix.len() as u64,
                    message: "connection reset by peer".to_string(),
                }));
                chunks
            }
        };
        Ok(futures::stream::iter(chunks).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NewRecord;
    use serde_json::json;

    fn hotel(id: &str, name: &str) -> CanonicalRecord {
        CanonicalRecord::create(NewRecord {
            source: "source1".into(),
            external_id: id.into(),
            name: Some(name.into()),
            raw: json!({"id": id}),
            ..Default::default()
        })
        .expect("💀 fixture record rejected")
    }

    #[tokio::test]
    async fn the_one_where_saving_twice_still_leaves_one_row_per_key() {
        let store = InMemoryStore::new();
        let first = vec![hotel("1", "Old Name"), hotel("2", "Two")];
        store.save_all(&first).await.expect("💀 first save failed");

        let key = first[0].key();
        let original = store.get(&key).await.expect("💀 record 1 vanished");
        let original_id = original.id().map(str::to_string);
        assert!(original_id.is_some(), "first write assigns an id");

        let second = vec![hotel("1", "New Name"), hotel("2", "Two")];
        store.save_all(&second).await.expect("💀 second save failed");
        store.save_all(&second).await.expect("💀 third save failed");

        assert_eq!(store.len().await, 2, "no duplicates, ever");
        let updated = store.get(&key).await.expect("💀 record 1 vanished");
        assert_eq!(updated.name(), Some("New Name"), "last write wins");
        assert_eq!(updated.id().map(str::to_string), original_id, "identity is stable");
        assert_eq!(updated.created_at(), original.created_at());
        assert!(updated.updated_at() >= original.updated_at());
        assert_eq!(store.save_calls(), 3);
        assert_eq!(store.batch_sizes().await, vec![2, 2, 2]);
    }

    #[tokio::test]
    async fn the_one_where_same_external_id_in_different_sources_are_strangers() {
        let store = InMemoryStore::new();
        let from_source2 = CanonicalRecord::create(NewRecord {
            source: "source2".into(),
            external_id: "1".into(),
            ..Default::default()
        })
        .expect("💀 fixture record rejected");
        store
            .save_all(&[hotel("1", "One"), from_source2])
            .await
            .expect("💀 save failed");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn the_one_where_the_byte_source_chops_documents_into_awkward_pieces() {
        let source = InMemoryByteSource::new(3).with_document("mem://a", "[1,2,3]");
        let chunks: Vec<Bytes> = source
            .get_stream("mem://a")
            .await
            .expect("💀 known url should open")
            .map(|c| c.expect("💀 chunk failed"))
            .collect()
            .await;
        assert_eq!(chunks, vec![Bytes::from("[1,"), Bytes::from("2,3"), Bytes::from("]")]);

        match source.get_stream("mem://nope").await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 404),
            Err(other) => panic!("💀 expected a 404, got {other}"),
            Ok(_) => panic!("💀 expected a 404, got a stream"),
        }
    }
}
