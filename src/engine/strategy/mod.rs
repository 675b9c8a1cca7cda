mod cooperative;
mod sequential;
mod threaded;

pub use cooperative::CooperativeScheduler;
pub(crate) use cooperative::single_thread_runtime;
pub use sequential::SequentialScheduler;
pub use threaded::ThreadedScheduler;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::engine::errors::AggError;
use crate::engine::request;
use crate::engine::session::{CursorSession, FieldReport};
use crate::engine::types::{AggregationMode, AggregationRequest, FieldSpec};
use crate::wire::{Command, RespValue, Transport};

/// Drives every field of a request to completion.
///
/// Implementations differ only in how they hand out connections, how they run a
/// session on one, and how they wait for all sessions to finish.
pub trait Scheduler {
    fn run(&mut self, request: &AggregationRequest) -> Result<Vec<FieldReport>, AggError>;
}

/// How one aggregation call is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One connection, pipelined phases.
    Sequential,
    /// A worker thread per pooled connection, blocking I/O.
    Threaded { concurrency: usize },
    /// One task per field on a single thread, sharing `concurrency` connections.
    Cooperative { concurrency: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[serde(alias = "naive")]
    Sequential,
    Threaded,
    #[serde(alias = "async")]
    Cooperative,
}

impl StrategyKind {
    pub fn with_concurrency(self, concurrency: Option<usize>) -> Strategy {
        let concurrency = concurrency.unwrap_or_else(default_concurrency).max(1);
        match self {
            StrategyKind::Sequential => Strategy::Sequential,
            StrategyKind::Threaded => Strategy::Threaded { concurrency },
            StrategyKind::Cooperative => Strategy::Cooperative { concurrency },
        }
    }
}

impl FromStr for StrategyKind {
    type Err = AggError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "naive" => Ok(StrategyKind::Sequential),
            "threaded" => Ok(StrategyKind::Threaded),
            "cooperative" | "async" => Ok(StrategyKind::Cooperative),
            other => Err(AggError::InvalidConfig(format!("unknown strategy: {other}"))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Sequential => write!(f, "sequential"),
            Strategy::Threaded { concurrency } => write!(f, "threaded({concurrency})"),
            Strategy::Cooperative { concurrency } => write!(f, "cooperative({concurrency})"),
        }
    }
}

/// `min(available cores, 8)`.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(8)
}

/// Runs one field to completion on a blocking connection.
pub(crate) fn run_field_blocking<T: Transport + ?Sized>(
    request: &AggregationRequest,
    field: &FieldSpec,
    conn: &mut T,
) -> FieldReport {
    if let AggregationMode::TopN(n) = request.mode() {
        return match conn.send(&request::top_n(request, field, n)) {
            Ok(reply) => FieldReport::top_n(request, field, reply),
            Err(e) => FieldReport::failed(field, e.into()),
        };
    }

    let mut session = CursorSession::new(request, field);
    match conn.send(&session.initial_command()) {
        Ok(reply) => session.on_initial(reply),
        Err(e) => session.fail(e.into()),
    }
    while let Some(read) = session.next_read() {
        match conn.send(&read) {
            Ok(reply) => session.on_page(reply),
            Err(e) => session.fail(e.into()),
        }
    }
    if let Some(del) = session.close_command() {
        release(field, &del, conn.send(&del));
    }
    if session.needs_fallback() {
        let cmd = session.fallback_command();
        match conn.send(&cmd) {
            Ok(reply) => session.on_fallback(reply),
            Err(e) => session.fail(e.into()),
        }
    }
    session.into_report()
}

/// DEL outcomes are logged and dropped: the cursor may already be gone server-side.
pub(crate) fn release<E: fmt::Display>(
    field: &FieldSpec,
    del: &Command,
    outcome: Result<RespValue, E>,
) {
    match outcome {
        Ok(RespValue::Error(msg)) => {
            debug!(target: "rqe::session", field = %field, cmd = %del, "Cursor release rejected: {msg}");
        }
        Err(e) => {
            debug!(target: "rqe::session", field = %field, cmd = %del, "Cursor release failed: {e}");
        }
        Ok(_) => {
            debug!(target: "rqe::session", field = %field, cmd = %del, "Cursor released");
        }
    }
}
