use std::thread;

use tracing::debug;

use crate::engine::errors::AggError;
use crate::engine::pool::ConnectionPool;
use crate::engine::session::FieldReport;
use crate::engine::strategy::{Scheduler, run_field_blocking};
use crate::engine::types::AggregationRequest;
use crate::wire::ConnectionFactory;

/// One OS thread per pooled connection. Field `i` belongs to worker
/// `i % workers`, and a worker runs its fields back to back on its own
/// connection with blocking calls.
pub struct ThreadedScheduler<'p, F: ConnectionFactory> {
    pool: &'p ConnectionPool<F>,
}

impl<'p, F: ConnectionFactory> ThreadedScheduler<'p, F> {
    pub fn new(pool: &'p ConnectionPool<F>) -> Self {
        Self { pool }
    }
}

impl<F: ConnectionFactory> Scheduler for ThreadedScheduler<'_, F> {
    fn run(&mut self, request: &AggregationRequest) -> Result<Vec<FieldReport>, AggError> {
        let fields = request.fields();
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.pool.size().min(fields.len());
        let pool = self.pool;

        let joined: Vec<thread::Result<Result<Vec<(usize, FieldReport)>, AggError>>> =
            thread::scope(|scope| {
                let handles: Vec<_> = (0..workers)
                    .map(|worker_id| {
                        scope.spawn(move || {
                            let mut conn = pool.get(worker_id)?;
                            debug!(target: "rqe::orchestrator", worker_id, "Worker started");
                            let reports: Vec<(usize, FieldReport)> = fields
                                .iter()
                                .enumerate()
                                .skip(worker_id)
                                .step_by(workers)
                                .map(|(idx, field)| {
                                    (idx, run_field_blocking(request, field, &mut *conn))
                                })
                                .collect();
                            Ok::<_, AggError>(reports)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join()).collect()
            });

        let mut reports: Vec<(usize, FieldReport)> = Vec::with_capacity(fields.len());
        for outcome in joined {
            match outcome {
                Ok(Ok(worker_reports)) => reports.extend(worker_reports),
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(AggError::Runtime("aggregation worker panicked".into())),
            }
        }
        reports.sort_by_key(|(idx, _)| *idx);
        Ok(reports.into_iter().map(|(_, report)| report).collect())
    }
}
