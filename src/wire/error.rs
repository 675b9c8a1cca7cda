use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Failures below the command level, from the socket or the client library.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    #[error("Redis client error: {0}")]
    Client(#[source] Arc<redis::RedisError>),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed by peer")]
    Closed,
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

impl From<redis::RedisError> for TransportError {
    fn from(err: redis::RedisError) -> Self {
        TransportError::Client(Arc::new(err))
    }
}
