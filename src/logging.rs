use anyhow::Context;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::shared::config::LoggingConfig;

/// Console logs on stderr, since stdout carries the JSON outcome, plus a daily `rqe.log`.
pub fn init(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(level(&cfg.stdout_level)?);

    let file_appender = tracing_appender::rolling::daily(&cfg.log_dir, "rqe.log");
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(file_appender)
        .with_filter(level(&cfg.file_level)?);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("a global subscriber is already installed")?;

    info!(log_dir = %cfg.log_dir, "Logging initialized");
    Ok(())
}

pub(crate) fn level(name: &str) -> anyhow::Result<LevelFilter> {
    name.parse::<LevelFilter>()
        .with_context(|| format!("invalid log level {name:?}"))
}

#[cfg(test)]
pub fn init_for_tests() {
    use std::sync::Once;
    use tracing_subscriber::EnvFilter;

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rqe=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

#[cfg(test)]
#[path = "logging_test.rs"]
mod logging_test;
