use futures::future::join_all;
use tokio::runtime::Runtime;

use crate::engine::errors::AggError;
use crate::engine::pool::AsyncConnectionPool;
use crate::engine::request;
use crate::engine::session::{CursorSession, FieldReport};
use crate::engine::strategy::{Scheduler, release};
use crate::engine::types::{AggregationMode, AggregationRequest, FieldSpec};
use crate::wire::{AsyncConnectionFactory, AsyncTransport, Command, RespValue};

/// One future per field, all polled on a single thread. Futures share the
/// pool's connections round-robin by field index and yield at every call.
pub struct CooperativeScheduler<'p, F: AsyncConnectionFactory> {
    pool: &'p AsyncConnectionPool<F>,
    runtime: Option<&'p Runtime>,
}

impl<'p, F: AsyncConnectionFactory> CooperativeScheduler<'p, F> {
    pub fn new(pool: &'p AsyncConnectionPool<F>) -> Self {
        Self {
            pool,
            runtime: None,
        }
    }

    /// Blocking `run` drives the futures on this runtime.
    pub fn on_runtime(mut self, runtime: &'p Runtime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub async fn run_async(
        &self,
        request: &AggregationRequest,
    ) -> Result<Vec<FieldReport>, AggError> {
        if request.fields().is_empty() {
            return Ok(Vec::new());
        }
        self.pool.initialize().await?;

        let tasks = request
            .fields()
            .iter()
            .enumerate()
            .map(|(task_id, field)| run_field(self.pool, task_id, request, field));
        Ok(join_all(tasks).await)
    }
}

impl<F: AsyncConnectionFactory> Scheduler for CooperativeScheduler<'_, F> {
    fn run(&mut self, request: &AggregationRequest) -> Result<Vec<FieldReport>, AggError> {
        match self.runtime {
            Some(runtime) => runtime.block_on(self.run_async(request)),
            None => {
                let runtime = single_thread_runtime()?;
                runtime.block_on(self.run_async(request))
            }
        }
    }
}

pub(crate) fn single_thread_runtime() -> Result<Runtime, AggError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AggError::Runtime(format!("failed to build runtime: {e}")))
}

/// Sends one command, holding the task's pooled connection only for this exchange.
async fn call<F: AsyncConnectionFactory>(
    pool: &AsyncConnectionPool<F>,
    task_id: usize,
    cmd: &Command,
) -> Result<RespValue, AggError> {
    let mut conn = pool.get(task_id).await?;
    Ok(conn.send(cmd).await?)
}

async fn run_field<F: AsyncConnectionFactory>(
    pool: &AsyncConnectionPool<F>,
    task_id: usize,
    request: &AggregationRequest,
    field: &FieldSpec,
) -> FieldReport {
    if let AggregationMode::TopN(n) = request.mode() {
        return match call(pool, task_id, &request::top_n(request, field, n)).await {
            Ok(reply) => FieldReport::top_n(request, field, reply),
            Err(e) => FieldReport::failed(field, e),
        };
    }

    let mut session = CursorSession::new(request, field);
    match call(pool, task_id, &session.initial_command()).await {
        Ok(reply) => session.on_initial(reply),
        Err(e) => session.fail(e),
    }
    while let Some(read) = session.next_read() {
        match call(pool, task_id, &read).await {
            Ok(reply) => session.on_page(reply),
            Err(e) => session.fail(e),
        }
    }
    if let Some(del) = session.close_command() {
        release(field, &del, call(pool, task_id, &del).await);
    }
    if session.needs_fallback() {
        let cmd = session.fallback_command();
        match call(pool, task_id, &cmd).await {
            Ok(reply) => session.on_fallback(reply),
            Err(e) => session.fail(e),
        }
    }
    session.into_report()
}
