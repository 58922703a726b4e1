//! Node transport: one connection per store node.
//!
//! The router talks to nodes through the [`NodeConnection`] and
//! [`Connector`] traits so it can run against real TCP nodes or the
//! in-process [`crate::memory`] backend. [`Connection`] is the TCP
//! implementation: requests go out as RESP arrays of bulk strings and
//! replies are parsed incrementally from a read buffer.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use shardis_protocol::{parse_frame, Frame};
use shardis_ring::NodeAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Errors that can occur during connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server disconnected")]
    Disconnected,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

/// An open connection to one store node.
///
/// Each method sends one or more commands and waits for every reply; a
/// node error reply is a successful `Frame::Error`, not an `Err`.
#[allow(async_fn_in_trait)]
pub trait NodeConnection {
    /// Sends one command and returns its reply.
    async fn call(&mut self, args: &[Bytes]) -> Result<Frame, ConnectionError>;

    /// Sends several commands and returns their replies in order.
    async fn pipeline(&mut self, commands: &[Vec<Bytes>]) -> Result<Vec<Frame>, ConnectionError> {
        let mut replies = Vec::with_capacity(commands.len());
        for args in commands {
            replies.push(self.call(args).await?);
        }
        Ok(replies)
    }

    /// Runs the commands inside MULTI/EXEC.
    ///
    /// Returns `None` when the node aborted the transaction because a
    /// watched key changed. If the node refused to run it (EXECABORT),
    /// every position holds that error.
    async fn transaction(
        &mut self,
        commands: &[Vec<Bytes>],
    ) -> Result<Option<Vec<Frame>>, ConnectionError> {
        let mut batch = Vec::with_capacity(commands.len() + 2);
        batch.push(vec![Bytes::from_static(b"MULTI")]);
        batch.extend(commands.iter().cloned());
        batch.push(vec![Bytes::from_static(b"EXEC")]);

        let mut replies = self.pipeline(&batch).await?;
        match replies.pop() {
            Some(Frame::Array(results)) => Ok(Some(results)),
            Some(Frame::Null) => Ok(None),
            Some(Frame::Error(msg)) => Ok(Some(vec![Frame::Error(msg); commands.len()])),
            other => Err(ConnectionError::Protocol(format!(
                "unexpected EXEC reply: {other:?}"
            ))),
        }
    }
}

/// Opens connections to nodes by address.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Conn: NodeConnection;

    async fn connect(&self, addr: &NodeAddr) -> Result<Self::Conn, ConnectionError>;
}

/// A TCP connection to a store node with read/write buffering.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Connection {
    /// Connects to a node at the given host and port.
    pub async fn connect(host: &str, port: u16) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
        })
    }

    /// Authenticates with the node using the AUTH command.
    pub async fn authenticate(&mut self, password: &str) -> Result<(), ConnectionError> {
        let args = [Bytes::from_static(b"AUTH"), Bytes::copy_from_slice(password.as_bytes())];
        let response = self.call(&args).await?;

        match &response {
            Frame::Simple(s) if s == "OK" => Ok(()),
            Frame::Error(e) => Err(ConnectionError::AuthFailed(e.clone())),
            _ => Err(ConnectionError::AuthFailed(
                "unexpected response to AUTH".into(),
            )),
        }
    }

    async fn flush_writes(&mut self) -> Result<(), ConnectionError> {
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        self.write_buf.clear();
        Ok(())
    }

    /// Reads one complete frame from the node.
    async fn read_response(&mut self) -> Result<Frame, ConnectionError> {
        loop {
            if !self.read_buf.is_empty() {
                match parse_frame(&self.read_buf) {
                    Ok(Some((frame, consumed))) => {
                        let _ = self.read_buf.split_to(consumed);
                        return Ok(frame);
                    }
                    Ok(None) => {}
                    Err(e) => return Err(ConnectionError::Protocol(e.to_string())),
                }
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(ConnectionError::Disconnected);
            }
        }
    }
}

impl NodeConnection for Connection {
    async fn call(&mut self, args: &[Bytes]) -> Result<Frame, ConnectionError> {
        self.write_buf.clear();
        Frame::serialize_command(args, &mut self.write_buf);
        self.flush_writes().await?;
        self.read_response().await
    }

    /// Writes every command in one flush, then reads the replies back.
    async fn pipeline(&mut self, commands: &[Vec<Bytes>]) -> Result<Vec<Frame>, ConnectionError> {
        self.write_buf.clear();
        for args in commands {
            Frame::serialize_command(args, &mut self.write_buf);
        }
        self.flush_writes().await?;

        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(self.read_response().await?);
        }
        Ok(replies)
    }
}

/// Opens TCP connections, optionally authenticating each one.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    password: Option<String>,
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends AUTH with this password on every new connection.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Fails a connect attempt that takes longer than `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

impl Connector for TcpConnector {
    type Conn = Connection;

    async fn connect(&self, addr: &NodeAddr) -> Result<Connection, ConnectionError> {
        let connecting = Connection::connect(&addr.host, addr.port);
        let mut conn = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .map_err(|_| ConnectionError::Timeout(limit))??,
            None => connecting.await?,
        };

        if let Some(password) = &self.password {
            conn.authenticate(password).await?;
        }
        debug!(node = %addr, "connected");
        Ok(conn)
    }
}
