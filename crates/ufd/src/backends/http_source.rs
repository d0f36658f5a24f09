// ai
//! 📡 HTTP Stream Source — opens a URL and hands the body over one chunk at a time.
//!
//! 🎬 *[a GET request leaves the building. headers come back. the body... keeps coming.]*
//!
//! 🧠 Knowledge graph:
//! - `get_stream`: one attempt. Non-2xx → [`FetchError::Status`]. A body that breaks mid-flight
//!   surfaces as a [`FetchError::BrokenStream`] item carrying how many bytes made it.
//! - `get_json`: small metadata GETs. Retried with exponential backoff
//!   (`base_delay * 2^(attempt-1)`), because a tiny request is cheap to repeat and a
//!   half-read 2 GB array is not.
//! - No whole-request timeout on streams: a big document legitimately takes a while. The
//!   read timeout covers "the server went quiet", the connect timeout covers "nobody's home".

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{ByteStream, ByteStreamSource};
use crate::error::FetchError;

/// 🔧 `[http]` knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpSourceConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// ⏳ Max silence between two body reads before the stream is declared dead.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_metadata_max_attempts")]
    pub metadata_max_attempts: u32,
    #[serde(default = "default_metadata_base_delay_ms")]
    pub metadata_base_delay_ms: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_metadata_max_attempts() -> u32 {
    3
}

// -- 🐇 20ms, then 40ms, then we give up. optimism has a budget.
fn default_metadata_base_delay_ms() -> u64 {
    20
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            metadata_max_attempts: default_metadata_max_attempts(),
            metadata_base_delay_ms: default_metadata_base_delay_ms(),
        }
    }
}

/// 📡 The reqwest-powered byte source. One client, reused for every source.
#[derive(Debug, Clone)]
pub struct HttpStreamSource {
    client: reqwest::Client,
    config: HttpSourceConfig,
}

impl HttpStreamSource {
    pub fn new(config: HttpSourceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably the TLS stack, possibly the moon phase.")?;
        Ok(Self { client, config })
    }

    /// 📋 GET a small JSON document, retrying transport failures and non-2xx answers.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let max_attempts = self.config.metadata_max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.get_json_once(url).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "🔄 GET '{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                        url, attempt, max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.config.metadata_base_delay_ms.saturating_mul(factor))
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| transport(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(|e| transport(url, e))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::InvalidBody {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ByteStreamSource for HttpStreamSource {
    async fn get_stream(&self, url: &str) -> Result<ByteStream, FetchError> {
        debug!("📡 Opening stream: {}", url);
        let response = self.client.get(url).send().await.map_err(|e| transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let url = url.to_string();
        let mut bytes_read = 0u64;
        let body = response.bytes_stream().map(move |chunk| match chunk {
            Ok(bytes) => {
                bytes_read += bytes.len() as u64;
                Ok(bytes)
            }
            Err(err) => Err(FetchError::BrokenStream {
                url: url.clone(),
                bytes_read,
                message: err.to_string(),
            }),
        });
        Ok(body.boxed())
    }
}

fn transport(url: &str, err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}
