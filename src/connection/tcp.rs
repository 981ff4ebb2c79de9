//! Async TCP connection to a Redis server.
//!
//! Wraps a `tokio::net::TcpStream` (or a TLS stream over it) with a write
//! buffer for pipelined sends and a read buffer feeding the streaming RESP
//! parser.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::command::Command;
use crate::config::Endpoint;
use crate::connection::{Connect, Connection};
use crate::error::{Result, RwPoolError};
use crate::resp::parser::parse;
use crate::resp::types::Value;
use crate::resp::writer::encode_command_into;

/// Default initial read buffer capacity (64 KB).
const DEFAULT_BUF_CAPACITY: usize = 64 * 1024;

/// Queued sends are written out once the buffer grows past this.
const WRITE_FLUSH_THRESHOLD: usize = 64 * 1024;

/// Anything we can speak RESP over.
trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Dials plain or TLS TCP connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connect for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<TcpConnection> {
        TcpConnection::open(endpoint).await
    }
}

/// A single async connection to a Redis server.
pub struct TcpConnection {
    stream: Box<dyn AsyncStream>,
    /// Data read from the socket but not yet consumed by the parser.
    rbuf: BytesMut,
    /// Encoded commands not yet written.
    wbuf: Vec<u8>,
    /// Commands sent whose reply has not been read.
    pending: usize,
    max_buf_size: usize,
    read_timeout: Option<Duration>,
}

impl TcpConnection {
    /// Dial `endpoint`, optionally wrap in TLS, then AUTH / SELECT.
    pub async fn open(endpoint: &Endpoint) -> Result<Self> {
        let addr = endpoint.addr();
        let timeout = endpoint.connect_timeout();
        let tcp = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RwPoolError::Timeout(format!(
                    "connection to {addr} timed out after {timeout:?}"
                )))
            }
        };
        tcp.set_nodelay(true).ok();

        let stream: Box<dyn AsyncStream> = if endpoint.tls {
            tls::wrap(tcp, &endpoint.host).await?
        } else {
            Box::new(tcp)
        };

        let mut conn = Self::with_stream(stream, endpoint.max_buffer_size, endpoint.read_timeout());
        conn.init(
            endpoint.username.as_deref(),
            endpoint.password.as_deref(),
            endpoint.db,
        )
        .await?;
        debug!(%addr, db = endpoint.db, tls = endpoint.tls, "connection established");
        Ok(conn)
    }

    fn with_stream(
        stream: Box<dyn AsyncStream>,
        max_buf_size: usize,
        read_timeout: Option<Duration>,
    ) -> Self {
        Self {
            stream,
            rbuf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            wbuf: Vec::new(),
            pending: 0,
            max_buf_size,
            read_timeout,
        }
    }

    /// Perform the AUTH handshake.
    async fn auth(&mut self, username: Option<&str>, password: &str) -> Result<()> {
        let mut cmd = Command::new("AUTH");
        if let Some(user) = username {
            cmd = cmd.arg(user);
        }
        let reply = self.execute(&cmd.arg(password)).await?;
        expect_ok("AUTH", reply)
    }

    /// Select a database index.
    async fn select_db(&mut self, db: u16) -> Result<()> {
        if db == 0 {
            return Ok(()); // Default, no need to send
        }
        let reply = self.execute(&Command::new("SELECT").arg(u32::from(db))).await?;
        expect_ok("SELECT", reply)
    }

    async fn init(&mut self, username: Option<&str>, password: Option<&str>, db: u16) -> Result<()> {
        if let Some(pass) = password {
            self.auth(username, pass).await?;
        }
        self.select_db(db).await
    }

    async fn write_out(&mut self) -> Result<()> {
        if !self.wbuf.is_empty() {
            self.stream.write_all(&self.wbuf).await?;
            self.wbuf.clear();
        }
        Ok(())
    }

    /// Read and parse one complete RESP value from the socket.
    ///
    /// The read buffer is frozen before parsing so bulk strings are sliced
    /// out without copying; unconsumed bytes are put back.
    async fn read_value(&mut self) -> Result<Value> {
        loop {
            if !self.rbuf.is_empty() {
                let snapshot = self.rbuf.split().freeze();
                match parse(&snapshot) {
                    Ok((value, consumed)) => {
                        if consumed < snapshot.len() {
                            self.rbuf.extend_from_slice(&snapshot[consumed..]);
                        }
                        return Ok(value);
                    }
                    Err(RwPoolError::Incomplete) => {
                        self.rbuf.extend_from_slice(&snapshot);
                    }
                    Err(e) => return Err(e),
                }
            }

            if self.rbuf.capacity() - self.rbuf.len() < 4096 {
                let new_cap = (self.rbuf.capacity() * 2).max(DEFAULT_BUF_CAPACITY);
                if new_cap > self.max_buf_size {
                    if self.rbuf.capacity() >= self.max_buf_size {
                        return Err(RwPoolError::Protocol(format!(
                            "RESP message too large: buffer would exceed {} bytes",
                            self.max_buf_size
                        )));
                    }
                    self.rbuf.reserve(self.max_buf_size - self.rbuf.capacity());
                } else {
                    self.rbuf.reserve(new_cap - self.rbuf.capacity());
                }
            }
            let n = self.stream.read_buf(&mut self.rbuf).await?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server").into());
            }
        }
    }
}

impl Connection for TcpConnection {
    async fn send(&mut self, cmd: &Command) -> Result<()> {
        encode_command_into(&mut self.wbuf, cmd);
        self.pending += 1;
        if self.wbuf.len() >= WRITE_FLUSH_THRESHOLD {
            self.write_out().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.write_out().await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Value> {
        if !self.wbuf.is_empty() {
            self.flush().await?;
        }
        let value = match self.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.read_value()).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(RwPoolError::Timeout(format!(
                        "no reply within {limit:?}"
                    )))
                }
            },
            None => self.read_value().await?,
        };
        self.pending = self.pending.saturating_sub(1);
        match value {
            Value::Error(msg) => Err(RwPoolError::redis(msg)),
            other => Ok(other),
        }
    }

    fn pending(&self) -> usize {
        self.pending
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

fn expect_ok(verb: &str, reply: Value) -> Result<()> {
    if reply.is_ok_status() {
        return Ok(());
    }
    Err(RwPoolError::Protocol(format!(
        "unexpected {verb} response: {}",
        reply.type_name()
    )))
}

#[cfg(feature = "tls")]
mod tls {
    use std::sync::Arc;

    use tokio::net::TcpStream;
    use tokio_rustls::rustls::pki_types::ServerName;
    use tokio_rustls::rustls::{ClientConfig, RootCertStore};
    use tokio_rustls::TlsConnector;

    use super::AsyncStream;
    use crate::error::{Result, RwPoolError};

    pub(super) async fn wrap(tcp: TcpStream, host: &str) -> Result<Box<dyn AsyncStream>> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| RwPoolError::Config(format!("invalid TLS server name {host}: {e}")))?;
        let stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await?;
        Ok(Box::new(stream))
    }
}

#[cfg(not(feature = "tls"))]
mod tls {
    use tokio::net::TcpStream;

    use super::AsyncStream;
    use crate::error::{Result, RwPoolError};

    pub(super) async fn wrap(_tcp: TcpStream, _host: &str) -> Result<Box<dyn AsyncStream>> {
        Err(RwPoolError::Config(
            "TLS connections (rediss://) need the `tls` feature".into(),
        ))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
