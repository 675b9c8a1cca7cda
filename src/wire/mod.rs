pub mod async_connection;
pub mod command;
pub mod connection;
pub mod error;
pub mod resp;
pub mod transport;

pub use async_connection::AsyncConnection;
pub use command::Command;
pub use connection::{Connection, ConnectionSettings, TcpConnectionFactory};
pub use error::TransportError;
pub use resp::RespValue;
pub use transport::{AsyncConnectionFactory, AsyncTransport, ConnectionFactory, Transport};
