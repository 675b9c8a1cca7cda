use std::time::Instant;

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::engine::errors::AggError;
use crate::engine::pool::{AsyncConnectionPool, ConnectionPool};
use crate::engine::session::FieldReport;
use crate::engine::strategy::{
    CooperativeScheduler, Scheduler, SequentialScheduler, Strategy, ThreadedScheduler,
    single_thread_runtime,
};
use crate::engine::types::{AggregationOutcome, AggregationRequest};
use crate::wire::{AsyncConnectionFactory, ConnectionFactory, Transport};

/// Entry point for histogram aggregation.
///
/// Owns a connection factory; every call opens the connections its strategy
/// needs and closes them before returning, whatever the outcome.
#[derive(Debug, Clone)]
pub struct Aggregator<F> {
    factory: F,
}

impl<F> Aggregator<F>
where
    F: ConnectionFactory + AsyncConnectionFactory + Clone,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    pub fn aggregate(
        &self,
        request: &AggregationRequest,
        strategy: Strategy,
    ) -> Result<AggregationOutcome, AggError> {
        let started = Instant::now();
        if request.fields().is_empty() {
            return Ok(merge(request, Vec::new(), started));
        }
        info!(
            target: "rqe::orchestrator",
            index = request.index(),
            fields = request.fields().len(),
            %strategy,
            "Starting aggregation"
        );

        let pool_size = |concurrency: usize| concurrency.max(1).min(request.fields().len());
        let outcome = match strategy {
            Strategy::Sequential => {
                let mut conn = ConnectionFactory::connect(&self.factory)?;
                let result = SequentialScheduler::new(&mut conn).run(request);
                if let Err(e) = conn.close() {
                    warn!(target: "rqe::pool", "Ignoring close failure: {e}");
                }
                result
            }
            Strategy::Threaded { concurrency } => {
                let mut pool = ConnectionPool::new(self.factory.clone(), pool_size(concurrency))?;
                let result = ThreadedScheduler::new(&pool).run(request);
                pool.close_all();
                result
            }
            Strategy::Cooperative { concurrency } => {
                let runtime = single_thread_runtime()?;
                let mut pool =
                    AsyncConnectionPool::new(self.factory.clone(), pool_size(concurrency))?;
                let result = CooperativeScheduler::new(&pool)
                    .on_runtime(&runtime)
                    .run(request);
                runtime.block_on(pool.close_all());
                result
            }
        };

        Ok(merge(request, outcome?, started))
    }
}

/// Runs `request` with a caller-owned scheduler. Nothing it holds is closed.
pub fn aggregate_with<S: Scheduler + ?Sized>(
    request: &AggregationRequest,
    scheduler: &mut S,
) -> Result<AggregationOutcome, AggError> {
    let started = Instant::now();
    let reports = scheduler.run(request)?;
    Ok(merge(request, reports, started))
}

/// Threaded run on a caller-supplied pool; the pool stays open.
pub fn aggregate_with_pool<F: ConnectionFactory>(
    request: &AggregationRequest,
    pool: &ConnectionPool<F>,
) -> Result<AggregationOutcome, AggError> {
    aggregate_with(request, &mut ThreadedScheduler::new(pool))
}

/// Cooperative run from inside an existing runtime on a caller-supplied pool.
pub async fn aggregate_with_async_pool<F: AsyncConnectionFactory>(
    request: &AggregationRequest,
    pool: &AsyncConnectionPool<F>,
) -> Result<AggregationOutcome, AggError> {
    let started = Instant::now();
    let reports = CooperativeScheduler::new(pool).run_async(request).await?;
    Ok(merge(request, reports, started))
}

/// Every requested field gets an entry, failed ones included.
fn merge(
    request: &AggregationRequest,
    reports: Vec<FieldReport>,
    started: Instant,
) -> AggregationOutcome {
    let mut results: IndexMap<String, _> = request
        .fields()
        .iter()
        .map(|field| (field.plain.clone(), Vec::new()))
        .collect();
    let mut failures = IndexMap::new();
    let mut pages = IndexMap::new();

    for report in reports {
        pages.insert(report.field.clone(), report.pages);
        match report.outcome {
            Ok(values) => {
                results.insert(report.field, values);
            }
            Err(err) => {
                err.log_error(&report.field);
                failures.insert(report.field, err);
            }
        }
    }

    let elapsed = started.elapsed();
    info!(
        target: "rqe::orchestrator",
        fields = results.len(),
        failed = failures.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Aggregation finished"
    );
    AggregationOutcome {
        results,
        failures,
        pages,
        elapsed,
    }
}

/// Blocking aggregation over an already open connection, sequential strategy.
pub fn aggregate_on<T: Transport + ?Sized>(
    request: &AggregationRequest,
    conn: &mut T,
) -> Result<AggregationOutcome, AggError> {
    aggregate_with(request, &mut SequentialScheduler::new(conn))
}
