use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error};

use crate::wire::TransportError;

/// Errors surfaced by the aggregation engine.
#[derive(Debug, Clone, Error)]
pub enum AggError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid field: {0:?}")]
    InvalidField(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unexpected reply shape: {0}")]
    Protocol(String),

    #[error("Index '{index}' not ready after {waited:?} (percent_indexed={percent:.4})")]
    IndexNotReady {
        index: String,
        waited: Duration,
        percent: f64,
    },

    #[error("Runtime failure: {0}")]
    Runtime(String),
}

impl AggError {
    pub fn log_error(&self, field: &str) {
        match self {
            AggError::Transport(e) => {
                error!(target: "rqe::orchestrator", field, "Transport failure: {}", e);
                debug!(target: "rqe::orchestrator", field, "Transport failure details: {:?}", e);
            }
            AggError::Server(msg) => {
                error!(target: "rqe::orchestrator", field, "Server rejected request: {}", msg);
            }
            other => {
                error!(target: "rqe::orchestrator", field, "Aggregation failed: {}", other);
            }
        }
    }
}
