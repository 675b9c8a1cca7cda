use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::errors::AggError;
use crate::engine::readiness::IndexReadinessWaiter;
use crate::engine::strategy::{Strategy, StrategyKind};
use crate::engine::types::{
    AggregationRequest, DEFAULT_BATCH_SIZE, DEFAULT_DIALECT, DEFAULT_QUERY,
};
use crate::wire::ConnectionSettings;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ConnectionSettings,
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct AggregationConfig {
    pub index: String,
    #[serde(default = "default_query")]
    pub query: String,
    pub fields: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Switches to top-N mode when set
    pub topn: Option<usize>,
    pub max_groups_per_field: Option<usize>,
    #[serde(default = "default_sort_desc")]
    pub sort_desc: bool,
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_dialect")]
    pub dialect: u32,
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    /// Pool size for threaded/cooperative runs; defaults to min(cores, 8)
    pub concurrency: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_readiness_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_readiness_target")]
    pub target: f64,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub stdout_level: String,
    pub file_level: String,
}

fn default_query() -> String {
    DEFAULT_QUERY.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_sort_desc() -> bool {
    true
}

fn default_dialect() -> u32 {
    DEFAULT_DIALECT
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Sequential
}

fn default_readiness_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    250
}

fn default_readiness_target() -> f64 {
    0.999
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_readiness_timeout(),
            poll_interval_ms: default_poll_interval(),
            target: default_readiness_target(),
        }
    }
}

impl ReadinessConfig {
    pub fn waiter(&self) -> IndexReadinessWaiter {
        IndexReadinessWaiter {
            timeout: Duration::from_secs(self.timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            target: self.target,
        }
    }
}

impl AggregationConfig {
    pub fn to_request(&self) -> Result<AggregationRequest, AggError> {
        let mut builder = AggregationRequest::builder(&self.index)
            .query(&self.query)
            .fields(&self.fields)
            .batch_size(self.batch_size)
            .sort_desc(self.sort_desc)
            .dialect(self.dialect);
        if let Some(n) = self.topn {
            builder = builder.top_n(n);
        }
        if let Some(k) = self.max_groups_per_field {
            builder = builder.max_groups_per_field(k);
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout_ms(ms);
        }
        builder.build()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy.with_concurrency(self.concurrency)
    }
}

pub fn load_settings() -> Result<Settings, config::ConfigError> {
    let config_path = env::var("RQE_CONFIG").unwrap_or_else(|_| "config".to_string());
    load_settings_from(&config_path)
}

/// Reads `path` (extension optional), then applies `RQE__SECTION__KEY` overrides.
pub fn load_settings_from(path: &str) -> Result<Settings, config::ConfigError> {
    let settings: Settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(
            config::Environment::with_prefix("RQE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    Ok(settings)
}
