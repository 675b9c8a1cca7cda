use std::fmt;

use async_trait::async_trait;
use redis::Value;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use crate::wire::command::Command;
use crate::wire::connection::{ConnectionSettings, TcpConnectionFactory};
use crate::wire::error::TransportError;
use crate::wire::resp::{RespValue, into_reply};
use crate::wire::transport::{AsyncConnectionFactory, AsyncTransport};

/// Tokio connection to the server.
pub struct AsyncConnection {
    inner: Option<MultiplexedConnection>,
    addr: String,
}

impl AsyncConnection {
    pub async fn open(settings: &ConnectionSettings) -> Result<Self, TransportError> {
        let inner = settings
            .client()?
            .get_multiplexed_async_connection()
            .await?;
        let addr = settings.addr();
        debug!(target: "rqe::wire", %addr, protocol = settings.protocol, "Async connection established");
        Ok(Self {
            inner: Some(inner),
            addr,
        })
    }
}

impl fmt::Debug for AsyncConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncConnection")
            .field("addr", &self.addr)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

#[async_trait]
impl AsyncTransport for AsyncConnection {
    async fn send(&mut self, cmd: &Command) -> Result<RespValue, TransportError> {
        let conn = self.inner.as_mut().ok_or(TransportError::Closed)?;
        let reply: redis::RedisResult<Value> = cmd.to_redis().query_async(conn).await;
        into_reply(reply)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner = None;
        Ok(())
    }
}

#[async_trait]
impl AsyncConnectionFactory for TcpConnectionFactory {
    type Conn = AsyncConnection;

    async fn connect(&self) -> Result<AsyncConnection, TransportError> {
        AsyncConnection::open(self.settings()).await
    }
}
