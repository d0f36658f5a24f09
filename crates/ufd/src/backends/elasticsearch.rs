// ai
//! 📡 Elasticsearch store — idempotent upserts through the `_bulk` API.
//!
//! 🎬 *[records arrive in batches of 5000. the cluster accepts them in bites of 1000.]*
//! *[nobody is duplicated. the cluster does not know how close it came.]*
//!
//! 🧠 Knowledge graph:
//! - Document `_id` = [`RecordKey::document_id`](crate::record::RecordKey::document_id), so the
//!   key IS the identity. Writing the same record twice touches the same document.
//! - Each record becomes an `update` action with an `upsert` body: the first write stamps
//!   `createdAt` and `updatedAt`; later writes replace every business field and refresh
//!   `updatedAt` only. Absent optionals are sent as explicit `null`s so a field that
//!   disappeared upstream disappears here too.
//! - Batches are chunked into `bulk_chunk_size` records per request. Item-level errors in the
//!   bulk response fail the whole `save_all` with [`PersistenceError::PartialFailure`].
//! - No retries here. The saver doesn't retry either. The next scheduled run re-upserts. 🦆

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

use super::RecordStore;
use crate::error::PersistenceError;
use crate::record::CanonicalRecord;

/// 🧹 Optional canonical fields. Sent as `null` when absent so partial updates can clear them.
const NULLABLE_FIELDS: [&str; 6] = [
    "name",
    "city",
    "country",
    "availability",
    "pricePerNight",
    "priceSegment",
];

#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchStoreConfig {
    /// 📡 Cluster root, e.g. `http://localhost:9200`.
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 Wins over basic auth when both are set.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_bulk_chunk_size")]
    pub bulk_chunk_size: usize,
}

fn default_index() -> String {
    "unified-data".to_string()
}

// -- 📦 1000 docs per _bulk. big enough to be efficient, small enough to not anger the cluster
fn default_bulk_chunk_size() -> usize {
    1000
}

#[derive(Debug, Clone)]
pub struct ElasticsearchStore {
    client: reqwest::Client,
    config: ElasticsearchStoreConfig,
}

impl ElasticsearchStore {
    /// 🚀 Build the client and ping the cluster root. A dead cluster fails here, at startup.
    pub async fn new(config: ElasticsearchStoreConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept.")?;

        let store = Self { client, config };
        let response = store
            .authorized(store.client.get(&store.config.url))
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 Knocked on '{}' to check the cluster is alive. Nobody answered.",
                    store.config.url
                )
            })?;
        if !response.status().is_success() {
            anyhow::bail!(
                "💀 Elasticsearch at '{}' answered the ping with status {}. Check the url and credentials.",
                store.config.url,
                response.status()
            );
        }
        debug!("✅ Elasticsearch is home at {}", store.config.url);
        Ok(store)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    /// 🔄 Render one `_bulk` NDJSON body: an `update` action line plus an upsert body per record.
    fn render_bulk(&self, records: &[CanonicalRecord]) -> Result<String, PersistenceError> {
        let now = Utc::now();
        let mut body = String::new();
        for record in records {
            let doc_id = record.key().document_id();
            let mut doc = serde_json::to_value(record)
                .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
            if let Value::Object(ref mut fields) = doc {
                fields.insert("id".to_string(), Value::String(doc_id.clone()));
                fields.insert("updatedAt".to_string(), json!(now));
            }

            let mut upsert = doc.clone();
            if let Value::Object(ref mut fields) = upsert {
                fields.insert("createdAt".to_string(), json!(now));
            }
            if let Value::Object(ref mut fields) = doc {
                for key in NULLABLE_FIELDS {
                    fields.entry(key).or_insert(Value::Null);
                }
            }

            let action = json!({"update": {"_index": self.config.index, "_id": doc_id}});
            let source = json!({"doc": doc, "upsert": upsert});
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&source.to_string());
            body.push('\n');
        }
        Ok(body)
    }

    async fn submit_bulk(&self, records: &[CanonicalRecord]) -> Result<(), PersistenceError> {
        let payload = self.render_bulk(records)?;
        let bulk_url = format!("{}/_bulk", self.config.url.trim_end_matches('/'));
        trace!("📡 Sending {} bytes to {}", payload.len(), bulk_url);

        let response = self
            .authorized(self.client.post(&bulk_url))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await
            .map_err(|e| PersistenceError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| PersistenceError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(PersistenceError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let parsed: Value = serde_json::from_slice(&body)
            .map_err(|e| PersistenceError::Transport(format!("unreadable _bulk response: {e}")))?;
        if parsed["errors"].as_bool() != Some(true) {
            return Ok(());
        }

        let items = parsed["items"].as_array().map(Vec::as_slice).unwrap_or_default();
        let failures: Vec<&Value> = items
            .iter()
            .filter_map(|item| item.as_object()?.values().next())
            .filter(|outcome| outcome.get("error").is_some())
            .collect();
        let first_reason = failures
            .first()
            .map(|f| {
                f["error"]["reason"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| f["error"].to_string())
            })
            .unwrap_or_else(|| "errors flagged without item details".to_string());
        Err(PersistenceError::PartialFailure {
            failed: failures.len().max(1),
            total: records.len(),
            first_reason,
        })
    }
}

#[async_trait]
impl RecordStore for ElasticsearchStore {
    async fn save_all(&self, records: &[CanonicalRecord]) -> Result<(), PersistenceError> {
        for chunk in records.chunks(self.config.bulk_chunk_size.max(1)) {
            self.submit_bulk(chunk).await?;
        }
        Ok(())
    }
}
