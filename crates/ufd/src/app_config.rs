// ai
//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🧠 Knowledge graph:
//! - [`load_config`] merges `UFD_*` env vars (nested with `__`) and an optional TOML file.
//!   TOML wins on conflicts.
//! - Deserialization only checks shapes. Meaning is checked by [`AppConfig::validate`], which
//!   turns every "technically parses, actually nonsense" value into a [`ConfigurationError`]
//!   before a single byte is fetched.
//! - Defaults live in `#[serde(default = "...")]` functions, next to the field they feed.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::StoreConfig;
use crate::backends::http_source::HttpSourceConfig;
use crate::batcher::BatchSize;
use crate::decoder::DEFAULT_MAX_ELEMENT_BYTES;
use crate::error::ConfigurationError;
use crate::mappers::{MapperBackend, MapperKind};
use crate::orchestrator::{IngestionSource, PipelineSettings};
use crate::saver::SaveConcurrency;

/// 📦 One struct to rule them all, one struct to find them, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub http: HttpSourceConfig,
    /// 🗄️ Omitted = in-memory dry run.
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// ⚙️ `[runtime]` — the pipeline knobs. Raw numbers here; [`AppConfig::pipeline_settings`]
/// turns them into checked types.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_batch_size", alias = "batchSize")]
    pub batch_size: i64,
    #[serde(default = "default_save_concurrency", alias = "concurrency")]
    pub save_concurrency: i64,
    #[serde(default = "default_max_element_bytes")]
    pub max_element_bytes: usize,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_batch_size() -> i64 {
    BatchSize::default().get() as i64
}

fn default_save_concurrency() -> i64 {
    SaveConcurrency::default().get() as i64
}

fn default_max_element_bytes() -> usize {
    DEFAULT_MAX_ELEMENT_BYTES
}

fn default_show_progress() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            save_concurrency: default_save_concurrency(),
            max_element_bytes: default_max_element_bytes(),
            show_progress: default_show_progress(),
        }
    }
}

/// 📋 One `[[sources]]` entry, as written. Nothing is trusted until `validate`.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    pub mapper: String,
}

impl AppConfig {
    /// ✅ Everything [`crate::run`] needs, checked. First problem wins.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.pipeline_settings()?;
        self.ingestion_sources()?;
        Ok(())
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ConfigurationError> {
        if self.runtime.max_element_bytes == 0 {
            return Err(ConfigurationError::InvalidElementLimit);
        }
        Ok(PipelineSettings {
            batch_size: BatchSize::new(self.runtime.batch_size)?,
            save_concurrency: SaveConcurrency::new(self.runtime.save_concurrency)?,
            max_element_bytes: self.runtime.max_element_bytes,
            show_progress: self.runtime.show_progress,
        })
    }

    /// 🏗️ Turn `[[sources]]` into descriptors, in file order.
    pub fn ingestion_sources(&self) -> Result<Vec<IngestionSource>, ConfigurationError> {
        let mut seen = HashSet::new();
        let mut sources = Vec::with_capacity(self.sources.len());
        for (index, source) in self.sources.iter().enumerate() {
            let name = source.name.trim();
            if name.is_empty() {
                return Err(ConfigurationError::MissingSourceName { index });
            }
            let url = match source.url.as_deref().map(str::trim) {
                Some(url) if !url.is_empty() => url,
                _ => {
                    return Err(ConfigurationError::MissingSourceUrl {
                        name: name.to_string(),
                    });
                }
            };
            if !seen.insert(name) {
                return Err(ConfigurationError::DuplicateSource {
                    name: name.to_string(),
                });
            }
            let kind: MapperKind = source.mapper.parse()?;
            sources.push(IngestionSource {
                name: name.to_string(),
                url: url.to_string(),
                mapper: MapperBackend::from_kind(kind),
            });
        }
        Ok(sources)
    }
}

/// 🚀 Load the config from env vars and, if given, a TOML file.
///
/// 📐 `None` → env vars only. `Some(path)` → env vars + TOML, TOML wins. No silent fallback
/// to a default file name.
///
/// 💀 Fails when the config doesn't parse. The message says where we looked.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("UFD_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (UFD_*). \
             The file exists in our hearts, but apparently not in valid TOML.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (UFD_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}
