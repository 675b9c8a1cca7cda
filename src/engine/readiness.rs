use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::engine::errors::AggError;
use crate::engine::request;
use crate::wire::{RespValue, Transport};

/// Polls `FT.INFO` until an index has caught up with its documents.
#[derive(Debug, Clone)]
pub struct IndexReadinessWaiter {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Fraction of documents indexed (0.0 to 1.0) that counts as ready.
    pub target: f64,
}

impl Default for IndexReadinessWaiter {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(250),
            target: 0.999,
        }
    }
}

impl IndexReadinessWaiter {
    /// Returns the last observed `percent_indexed` once ready.
    pub fn wait<T: Transport + ?Sized>(&self, conn: &mut T, index: &str) -> Result<f64, AggError> {
        let started = Instant::now();
        let cmd = request::index_info(index);

        loop {
            let info = conn.send(&cmd)?;
            match &info {
                RespValue::Error(msg) => return Err(AggError::Server(msg.clone())),
                RespValue::Map(_) | RespValue::Array(_) => {}
                other => {
                    return Err(AggError::Protocol(format!(
                        "FT.INFO returned neither a map nor a key/value array: {other:?}"
                    )));
                }
            }

            let percent = info_field(&info, "percent_indexed")
                .and_then(RespValue::as_f64)
                .unwrap_or(1.0);
            let indexing = info_field(&info, "indexing")
                .and_then(RespValue::as_f64)
                .unwrap_or(0.0);
            debug!(target: "rqe::readiness", index, percent, indexing, "Index progress");

            if percent >= self.target || indexing == 0.0 {
                info!(target: "rqe::readiness", index, percent, "Index ready");
                return Ok(percent);
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(AggError::IndexNotReady {
                    index: index.to_string(),
                    waited,
                    percent,
                });
            }
            thread::sleep(self.poll_interval);
        }
    }
}

/// Reads `key` from a map reply or from a flat `[k, v, k, v, ...]` reply.
fn info_field<'r>(info: &'r RespValue, key: &str) -> Option<&'r RespValue> {
    if let Some(value) = info.get(key) {
        return Some(value);
    }
    info.as_array()?
        .chunks_exact(2)
        .find(|pair| pair[0].as_text().is_some_and(|k| k == key))
        .map(|pair| &pair[1])
}
