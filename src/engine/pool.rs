use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::engine::errors::AggError;
use crate::wire::{AsyncConnectionFactory, AsyncTransport, ConnectionFactory, Transport};

/// Fixed-size set of blocking connections, assigned round-robin by worker id.
///
/// Connections are opened on the first `get`, exactly once even when several
/// workers race for it. A worker keeps its slot locked for its whole run; since
/// slot assignment is static the lock is never contended.
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    size: usize,
    slots: OnceCell<Vec<Mutex<F::Conn>>>,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    pub fn new(factory: F, size: usize) -> Result<Self, AggError> {
        if size == 0 {
            return Err(AggError::InvalidConfig(
                "connection pool size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            factory,
            size,
            slots: OnceCell::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_initialized(&self) -> bool {
        self.slots.get().is_some()
    }

    /// Opens every connection now instead of on first use.
    pub fn initialize(&self) -> Result<(), AggError> {
        self.slots().map(|_| ())
    }

    pub fn get(&self, worker_id: usize) -> Result<MutexGuard<'_, F::Conn>, AggError> {
        let slots = self.slots()?;
        Ok(slots[worker_id % self.size].lock())
    }

    /// Closes every connection and returns the pool to its uninitialized state.
    pub fn close_all(&mut self) {
        let Some(slots) = self.slots.take() else {
            return;
        };
        for (idx, slot) in slots.into_iter().enumerate() {
            if let Err(e) = slot.into_inner().close() {
                debug!(target: "rqe::pool", slot = idx, "Ignoring close failure: {e}");
            }
        }
        debug!(target: "rqe::pool", size = self.size, "Pool closed");
    }

    fn slots(&self) -> Result<&Vec<Mutex<F::Conn>>, AggError> {
        self.slots.get_or_try_init(|| {
            info!(target: "rqe::pool", size = self.size, "Opening pooled connections");
            (0..self.size)
                .map(|_| self.factory.connect().map(Mutex::new))
                .collect::<Result<Vec<_>, _>>()
                .map_err(AggError::from)
        })
    }
}

/// Async counterpart used by the cooperative strategy.
///
/// Tasks sharing a slot lock it for a single request/reply exchange, so they
/// interleave at every network call.
pub struct AsyncConnectionPool<F: AsyncConnectionFactory> {
    factory: F,
    size: usize,
    slots: tokio::sync::OnceCell<Vec<tokio::sync::Mutex<F::Conn>>>,
}

impl<F: AsyncConnectionFactory> AsyncConnectionPool<F> {
    pub fn new(factory: F, size: usize) -> Result<Self, AggError> {
        if size == 0 {
            return Err(AggError::InvalidConfig(
                "connection pool size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            factory,
            size,
            slots: tokio::sync::OnceCell::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_initialized(&self) -> bool {
        self.slots.initialized()
    }

    pub async fn initialize(&self) -> Result<(), AggError> {
        self.slots().await.map(|_| ())
    }

    pub async fn get(
        &self,
        worker_id: usize,
    ) -> Result<tokio::sync::MutexGuard<'_, F::Conn>, AggError> {
        let slots = self.slots().await?;
        Ok(slots[worker_id % self.size].lock().await)
    }

    pub async fn close_all(&mut self) {
        let Some(slots) = self.slots.take() else {
            return;
        };
        for (idx, slot) in slots.into_iter().enumerate() {
            if let Err(e) = slot.into_inner().close().await {
                debug!(target: "rqe::pool", slot = idx, "Ignoring close failure: {e}");
            }
        }
        debug!(target: "rqe::pool", size = self.size, "Async pool closed");
    }

    async fn slots(&self) -> Result<&Vec<tokio::sync::Mutex<F::Conn>>, AggError> {
        self.slots
            .get_or_try_init(|| async {
                info!(target: "rqe::pool", size = self.size, "Opening async connections");
                let mut slots = Vec::with_capacity(self.size);
                for _ in 0..self.size {
                    slots.push(tokio::sync::Mutex::new(self.factory.connect().await?));
                }
                Ok::<_, AggError>(slots)
            })
            .await
    }
}
