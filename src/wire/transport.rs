use async_trait::async_trait;

use crate::wire::command::Command;
use crate::wire::error::TransportError;
use crate::wire::resp::RespValue;

/// Blocking request/reply channel to the search server.
///
/// Server-side error replies come back as `Ok(RespValue::Error(..))`; only
/// transport failures surface as `Err`.
pub trait Transport: Send {
    fn send(&mut self, cmd: &Command) -> Result<RespValue, TransportError>;

    /// Sends every command before reading any reply. Replies keep command order.
    fn send_batch(&mut self, cmds: &[Command]) -> Result<Vec<RespValue>, TransportError> {
        cmds.iter().map(|cmd| self.send(cmd)).collect()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, cmd: &Command) -> Result<RespValue, TransportError> {
        (**self).send(cmd)
    }

    fn send_batch(&mut self, cmds: &[Command]) -> Result<Vec<RespValue>, TransportError> {
        (**self).send_batch(cmds)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

#[async_trait]
pub trait AsyncTransport: Send {
    async fn send(&mut self, cmd: &Command) -> Result<RespValue, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Opens blocking connections.
pub trait ConnectionFactory: Send + Sync {
    type Conn: Transport;

    fn connect(&self) -> Result<Self::Conn, TransportError>;
}

/// Opens async connections.
#[async_trait]
pub trait AsyncConnectionFactory: Send + Sync {
    type Conn: AsyncTransport;

    async fn connect(&self) -> Result<Self::Conn, TransportError>;
}
