pub mod errors;
pub mod normalize;
pub mod orchestrator;
pub mod pool;
pub mod readiness;
pub mod request;
pub mod session;
pub mod strategy;
pub mod types;

pub use errors::AggError;
pub use orchestrator::{
    Aggregator, aggregate_on, aggregate_with, aggregate_with_async_pool, aggregate_with_pool,
};
pub use pool::{AsyncConnectionPool, ConnectionPool};
pub use readiness::IndexReadinessWaiter;
pub use session::{CursorSession, FieldReport, SessionState};
pub use strategy::{Scheduler, Strategy, StrategyKind};
pub use types::{
    AggregationMode, AggregationOutcome, AggregationRequest, CursorHandle, FieldResult,
    FieldSpec, Row, ValueCount,
};
