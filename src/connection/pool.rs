//! Async connection pool for one endpoint.
//!
//! A semaphore bounds how many connections are lent out at once
//! (`max_active`, 0 = unbounded) and a deque keeps idle connections for
//! reuse (`max_idle`). The idle queue uses `parking_lot::Mutex` (sync, held
//! very briefly) so connections can be returned in `Drop` without async.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::command::Command;
use crate::config::Endpoint;
use crate::connection::tcp::TcpConnector;
use crate::connection::{Connect, Connection};
use crate::error::{Result, RwPoolError};
use crate::resp::types::Value;

/// An async connection pool. Cloning is cheap and shares the pool.
pub struct ConnectionPool<K: Connect = TcpConnector> {
    inner: Arc<PoolInner<K>>,
}

struct PoolInner<K: Connect> {
    endpoint: Endpoint,
    addr: String,
    connector: K,
    /// Idle connections with the instant they were returned.
    idle: SyncMutex<VecDeque<(K::Conn, Instant)>>,
    /// One permit per connection that may be lent out.
    semaphore: Arc<Semaphore>,
    /// Connections currently lent out.
    active: AtomicUsize,
}

impl<K: Connect> Clone for ConnectionPool<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConnectionPool<TcpConnector> {
    /// Pool of TCP connections to `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_connector(endpoint, TcpConnector)
    }
}

impl<K: Connect> ConnectionPool<K> {
    pub fn with_connector(endpoint: Endpoint, connector: K) -> Self {
        let permits = match endpoint.max_active {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        };
        let addr = endpoint.addr();
        Self {
            inner: Arc::new(PoolInner {
                idle: SyncMutex::new(VecDeque::with_capacity(endpoint.max_idle)),
                semaphore: Arc::new(Semaphore::new(permits)),
                active: AtomicUsize::new(0),
                endpoint,
                addr,
                connector,
            }),
        }
    }

    /// Borrow a connection.
    ///
    /// Reuses the most recently returned idle connection that has not timed
    /// out, otherwise dials a new one. The returned guard gives the
    /// connection back when dropped.
    pub async fn get(&self) -> Result<PooledConnection<K>> {
        let permit = self.acquire_permit().await?;

        let reused = {
            let mut idle = self.inner.idle.lock();
            self.inner.take_fresh(&mut idle)
        };
        let conn = match reused {
            Some(conn) => conn,
            // The permit drops with the error, so the slot is released.
            None => self.dial().await?,
        };

        self.inner.active.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            broken: false,
            _permit: permit,
        })
    }

    /// Borrow a connection, `PING` it and give it back.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.get().await?;
        match conn.execute(&Command::new("PING")).await? {
            Value::Status(ref s) if s == "PONG" => Ok(()),
            other => Err(RwPoolError::Protocol(format!(
                "unexpected PING response: {}",
                other.type_name()
            ))),
        }
    }

    /// Connections currently lent out.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Connections waiting in the idle queue.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// `host:port` this pool connects to.
    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    /// True when both handles share the same underlying pool.
    pub fn same_pool(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        let semaphore = Arc::clone(&self.inner.semaphore);
        let exhausted = || RwPoolError::PoolExhausted {
            addr: self.inner.addr.clone(),
        };

        if !self.inner.endpoint.wait {
            return semaphore.try_acquire_owned().map_err(|_| exhausted());
        }
        let limit = self.inner.endpoint.idle_timeout();
        if limit.is_zero() {
            return semaphore.acquire_owned().await.map_err(|_| exhausted());
        }
        match tokio::time::timeout(limit, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) | Err(_) => Err(exhausted()),
        }
    }

    async fn dial(&self) -> Result<K::Conn> {
        debug!(addr = %self.inner.addr, "dialing new connection");
        self.inner
            .connector
            .connect(&self.inner.endpoint)
            .await
            .map_err(|e| RwPoolError::Dial {
                addr: self.inner.addr.clone(),
                source: Box::new(e),
            })
    }
}

impl<K: Connect> PoolInner<K> {
    fn expired(&self, since: Instant) -> bool {
        let limit = self.endpoint.idle_timeout();
        !limit.is_zero() && since.elapsed() > limit
    }

    /// Pop idle connections (LIFO for cache warmth) until a fresh one turns up.
    fn take_fresh(&self, idle: &mut VecDeque<(K::Conn, Instant)>) -> Option<K::Conn> {
        while let Some((conn, since)) = idle.pop_back() {
            if self.expired(since) {
                debug!(addr = %self.addr, "dropping stale idle connection");
                continue;
            }
            return Some(conn);
        }
        None
    }

    /// Return a connection to the idle queue (sync, safe for Drop).
    fn put_back(&self, conn: K::Conn) {
        if conn.pending() > 0 {
            debug!(addr = %self.addr, pending = conn.pending(), "discarding connection with unread replies");
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() >= self.endpoint.max_idle {
            debug!(addr = %self.addr, "idle queue full, closing connection");
            return;
        }
        idle.push_back((conn, Instant::now()));
    }
}

/// RAII guard that returns the connection to the pool on drop.
///
/// Connections that hit a fatal transport error are closed instead.
pub struct PooledConnection<K: Connect = TcpConnector> {
    conn: Option<K::Conn>,
    pool: Arc<PoolInner<K>>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl<K: Connect> PooledConnection<K> {
    fn conn_mut(&mut self) -> &mut K::Conn {
        self.conn.as_mut().expect("connection already taken")
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                self.broken = true;
            }
        }
        result
    }

    /// True once the connection saw a fatal error or was closed; it won't be
    /// pooled again.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Give the connection back now.
    pub fn release(self) {}
}

impl<K: Connect> Connection for PooledConnection<K> {
    async fn send(&mut self, cmd: &Command) -> Result<()> {
        let result = self.conn_mut().send(cmd).await;
        self.track(result)
    }

    async fn flush(&mut self) -> Result<()> {
        let result = self.conn_mut().flush().await;
        self.track(result)
    }

    async fn receive(&mut self) -> Result<Value> {
        let result = self.conn_mut().receive().await;
        self.track(result)
    }

    fn pending(&self) -> usize {
        self.conn.as_ref().map_or(0, |c| c.pending())
    }

    async fn close(&mut self) -> Result<()> {
        self.broken = true;
        self.conn_mut().close().await
    }
}

impl<K: Connect> Drop for PooledConnection<K> {
    fn drop(&mut self) {
        self.pool.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(conn) = self.conn.take() {
            if self.broken {
                debug!(addr = %self.pool.addr, "discarding broken connection");
                return;
            }
            self.pool.put_back(conn);
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
