// ai
//! 🚰 ufd — unifeed. Big JSON arrays in, canonical records out, one element at a time.
//!
//! The pipeline per source: [`backends::ByteStreamSource`] → [`decoder::decode_array`] →
//! [`mappers::RecordMapper`] → [`batcher::Batcher`] → [`saver::BatchSaver`], wired by
//! [`orchestrator::Orchestrator`]. Nothing in here ever holds a whole document. 🦆

pub mod app_config;
pub mod backends;
pub mod batcher;
pub mod decoder;
pub mod error;
pub mod mappers;
pub mod orchestrator;
pub mod progress;
pub mod record;
pub mod saver;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::backends::StoreBackend;
use crate::backends::http_source::HttpStreamSource;
use crate::orchestrator::{IngestionSummary, Orchestrator};

/// 🚀 Build everything from config, ingest every source once, hand back the receipt.
///
/// Fails only before the first fetch: bad config, an http client that won't build, or a store
/// that won't answer. Once sources start running, their failures live in the summary.
/// Ctrl-C stops after the in-flight saves drain.
pub async fn run(app_config: AppConfig) -> Result<IngestionSummary> {
    let settings = app_config
        .pipeline_settings()
        .context("💀 The [runtime] section has values that parse but make no sense")?;
    let sources = app_config
        .ingestion_sources()
        .context("💀 The [[sources]] list didn't survive validation")?;

    let byte_source = HttpStreamSource::new(app_config.http.clone())
        .context("💀 Couldn't build the HTTP client for the sources")?;
    let store = StoreBackend::from_config(&app_config.store)
        .await
        .context("💀 Couldn't set up the record store")?;

    let mut orchestrator = Orchestrator::new(byte_source, store, settings);
    for source in sources {
        orchestrator
            .register_source(source)
            .context("💀 Source registration failed")?;
    }
    info!("📋 {} source(s) registered", orchestrator.sources().len());

    let shutdown = orchestrator.shutdown_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, finishing in-flight saves and then stopping");
            shutdown.cancel();
        }
    });

    let summary = orchestrator.ingest_all().await;
    ctrl_c.abort();

    info!(
        "✅ Ingestion finished: {} record(s) saved, {} source(s) failed",
        summary.records_saved(),
        summary.failed_sources().count()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_bad_config_stops_us_at_the_door() {
        let mut config = AppConfig::default();
        config.runtime.batch_size = -3;
        let err = run(config).await.expect_err("💀 a negative batch size should not run");
        assert!(format!("{err:#}").contains("-3"), "got {err:#}");
    }

    #[tokio::test]
    async fn the_one_where_no_sources_means_a_quiet_empty_receipt() {
        let summary = run(AppConfig::default())
            .await
            .expect("💀 an empty config with the in-memory store should run");
        assert!(summary.runs.is_empty());
        assert_eq!(summary.records_saved(), 0);
    }
}
