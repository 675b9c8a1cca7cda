use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::shared::config::model::{Settings, load_settings};

/// Settings for the binary, read once from `RQE_CONFIG` on first access.
pub static CONFIG: Lazy<Arc<Settings>> = Lazy::new(|| match load_settings() {
    Ok(settings) => Arc::new(settings),
    Err(e) => panic!("Failed to load configuration: {e}"),
});
