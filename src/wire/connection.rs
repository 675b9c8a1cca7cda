use std::fmt;

use redis::{
    ConnectionAddr, ConnectionInfo, IntoConnectionInfo, ProtocolVersion, RedisConnectionInfo,
    Value,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::wire::command::Command;
use crate::wire::error::TransportError;
use crate::wire::resp::{RespValue, into_reply};
use crate::wire::transport::{ConnectionFactory, Transport};

/// Where and how to reach the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub db: u32,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// RESP protocol version: 3 yields map-encoded replies, 2 flat ones.
    #[serde(default = "default_protocol")]
    pub protocol: u8,
}

fn default_protocol() -> u8 {
    3
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
            protocol: default_protocol(),
        }
    }
}

impl ConnectionSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Client parameters; the client performs `HELLO`, `AUTH` and `SELECT` from these.
    pub fn connection_info(&self) -> ConnectionInfo {
        let mut redis = RedisConnectionInfo::default()
            .set_db(i64::from(self.db))
            .set_protocol(if self.protocol >= 3 {
                ProtocolVersion::RESP3
            } else {
                ProtocolVersion::RESP2
            });
        if let Some(username) = &self.username {
            redis = redis.set_username(username);
        }
        if let Some(password) = &self.password {
            redis = redis.set_password(password);
        }
        ConnectionAddr::Tcp(self.host.clone(), self.port)
            .into_connection_info()
            .expect("a TCP address always converts to connection info")
            .set_redis_settings(redis)
    }

    pub(crate) fn client(&self) -> Result<redis::Client, TransportError> {
        Ok(redis::Client::open(self.connection_info())?)
    }
}

/// Blocking connection to the server.
pub struct Connection {
    inner: Option<redis::Connection>,
    addr: String,
}

impl Connection {
    pub fn open(settings: &ConnectionSettings) -> Result<Self, TransportError> {
        let inner = settings.client()?.get_connection()?;
        let addr = settings.addr();
        debug!(target: "rqe::wire", %addr, protocol = settings.protocol, "Connection established");
        Ok(Self {
            inner: Some(inner),
            addr,
        })
    }

    fn inner(&mut self) -> Result<&mut redis::Connection, TransportError> {
        self.inner.as_mut().ok_or(TransportError::Closed)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl Transport for Connection {
    fn send(&mut self, cmd: &Command) -> Result<RespValue, TransportError> {
        let conn = self.inner()?;
        into_reply(cmd.to_redis().query::<Value>(conn))
    }

    /// One pipeline; a server error on one command does not hide the other replies.
    fn send_batch(&mut self, cmds: &[Command]) -> Result<Vec<RespValue>, TransportError> {
        if cmds.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        pipe.ignore_errors();
        for cmd in cmds {
            pipe.add_command(cmd.to_redis());
        }
        let replies: Vec<Value> = pipe.query(self.inner()?)?;
        if replies.len() != cmds.len() {
            return Err(TransportError::Protocol(format!(
                "pipeline of {} commands returned {} replies",
                cmds.len(),
                replies.len()
            )));
        }
        Ok(replies.into_iter().map(RespValue::from).collect())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.inner = None;
        Ok(())
    }
}

/// Opens connections, blocking or async, from one set of settings.
#[derive(Debug, Clone)]
pub struct TcpConnectionFactory {
    settings: ConnectionSettings,
}

impl TcpConnectionFactory {
    pub fn new(settings: ConnectionSettings) -> Self {
        info!(target: "rqe::wire", addr = %settings.addr(), "Using server");
        Self { settings }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }
}

impl ConnectionFactory for TcpConnectionFactory {
    type Conn = Connection;

    fn connect(&self) -> Result<Connection, TransportError> {
        Connection::open(&self.settings)
    }
}
