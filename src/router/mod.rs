//! Read/write router.
//!
//! [`RwPool`] owns one master pool and, in read/write mode, a fixed set of
//! replica pools. Writes always go to the master. Reads go to a uniformly
//! random replica from the healthy snapshot maintained by the
//! [`health`] checker, or to the master when that snapshot is empty.

pub mod health;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::watch;
use tracing::info;

use crate::config::{Endpoint, RouterConfig};
use crate::connection::{Connect, ConnectionPool, PooledConnection, TcpConnector};
use crate::error::Result;

/// Read/write splitting pool. Cloning is cheap and shares all state.
///
/// The background health checker of a read/write router stops once the last
/// clone is dropped, or earlier on [`shutdown`](RwPool::shutdown).
pub struct RwPool<K: Connect = TcpConnector> {
    backend: Backend<K>,
}

enum Backend<K: Connect> {
    /// No replicas: reads and writes share one pool.
    Single(ConnectionPool<K>),
    ReadWrite(Arc<ReadWrite<K>>),
}

/// State shared between a read/write router and its health checker.
pub(crate) struct ReadWrite<K: Connect> {
    pub(crate) master: ConnectionPool<K>,
    /// Every configured replica, in configuration order. Never resized.
    pub(crate) replicas: Vec<ConnectionPool<K>>,
    /// Replicas that passed the last probe, replaced whole each cycle.
    pub(crate) healthy: RwLock<Arc<[ConnectionPool<K>]>>,
    /// Held for a whole probe-and-swap so cycles never overlap.
    pub(crate) cycle: tokio::sync::Mutex<()>,
    pub(crate) probe_timeout: Duration,
    stop: watch::Sender<bool>,
}

impl<K: Connect> ReadWrite<K> {
    pub(crate) fn snapshot(&self) -> Arc<[ConnectionPool<K>]> {
        Arc::clone(&self.healthy.read())
    }
}

impl<K: Connect> Clone for RwPool<K> {
    fn clone(&self) -> Self {
        let backend = match &self.backend {
            Backend::Single(pool) => Backend::Single(pool.clone()),
            Backend::ReadWrite(rw) => Backend::ReadWrite(Arc::clone(rw)),
        };
        Self { backend }
    }
}

impl RwPool<TcpConnector> {
    /// TCP router for `config`. With no read endpoints this is a single pool.
    ///
    /// The health checker runs on the current tokio runtime, or on the
    /// crate's fallback runtime when called outside one.
    pub fn new(config: RouterConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }

    /// Router from one master URL and any number of replica URLs.
    pub fn from_urls(write: &str, reads: &[&str]) -> Result<Self> {
        Ok(Self::new(RouterConfig::from_urls(write, reads)?))
    }

    /// Single-pool router: reads and writes go to `endpoint`.
    pub fn single(endpoint: Endpoint) -> Self {
        Self::new(RouterConfig::new(endpoint, Vec::new()))
    }
}

impl<K: Connect + Clone> RwPool<K> {
    /// Router dialing through `connector`.
    pub fn with_connector(config: RouterConfig, connector: K) -> Self {
        let master = ConnectionPool::with_connector(config.write, connector.clone());
        if config.reads.is_empty() {
            return Self {
                backend: Backend::Single(master),
            };
        }

        let replicas: Vec<_> = config
            .reads
            .into_iter()
            .map(|endpoint| ConnectionPool::with_connector(endpoint, connector.clone()))
            .collect();
        let (stop, stop_rx) = watch::channel(false);
        let rw = Arc::new(ReadWrite {
            master,
            healthy: RwLock::new(replicas.iter().cloned().collect()),
            replicas,
            cycle: tokio::sync::Mutex::new(()),
            probe_timeout: config.probe_timeout,
            stop,
        });

        info!(
            master = %rw.master.addr(),
            replicas = rw.replicas.len(),
            "read/write router created"
        );
        crate::runtime::spawn(health::run(
            Arc::downgrade(&rw),
            config.check_interval,
            stop_rx,
        ));

        Self {
            backend: Backend::ReadWrite(rw),
        }
    }
}

impl<K: Connect> RwPool<K> {
    /// Borrow a master connection.
    pub async fn get_write(&self) -> Result<PooledConnection<K>> {
        self.master().get().await
    }

    /// Borrow a connection for reading.
    ///
    /// Picks a uniformly random healthy replica; falls back to the master
    /// when no replica is healthy (or none is configured).
    pub async fn get_read(&self) -> Result<PooledConnection<K>> {
        match self.pick_read() {
            Some(pool) => pool.get().await,
            None => self.get_write().await,
        }
    }

    fn pick_read(&self) -> Option<ConnectionPool<K>> {
        let Backend::ReadWrite(rw) = &self.backend else {
            return None;
        };
        let healthy = rw.snapshot();
        if healthy.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..healthy.len());
        Some(healthy[idx].clone())
    }

    pub fn master(&self) -> &ConnectionPool<K> {
        match &self.backend {
            Backend::Single(pool) => pool,
            Backend::ReadWrite(rw) => &rw.master,
        }
    }

    /// Every configured replica pool, healthy or not.
    pub fn replicas(&self) -> &[ConnectionPool<K>] {
        match &self.backend {
            Backend::Single(_) => &[],
            Backend::ReadWrite(rw) => &rw.replicas,
        }
    }

    /// The replicas reads are currently spread over.
    pub fn healthy_replicas(&self) -> Arc<[ConnectionPool<K>]> {
        match &self.backend {
            Backend::Single(_) => Arc::from(Vec::new()),
            Backend::ReadWrite(rw) => rw.snapshot(),
        }
    }

    pub fn is_read_write(&self) -> bool {
        matches!(self.backend, Backend::ReadWrite(_))
    }

    /// Active connection counts: `master` plus `replica_<i>` for every
    /// configured replica, indexed in configuration order.
    pub fn stat(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        stats.insert("master".to_string(), self.master().active_count());
        for (i, pool) in self.replicas().iter().enumerate() {
            stats.insert(format!("replica_{i}"), pool.active_count());
        }
        stats
    }

    /// Run one health check cycle now. Returns the number of healthy replicas.
    ///
    /// Waits for a cycle already in progress (background or manual) to
    /// finish first.
    pub async fn check_replicas(&self) -> usize {
        match &self.backend {
            Backend::Single(_) => 0,
            Backend::ReadWrite(rw) => health::check_cycle(rw).await,
        }
    }

    /// Stop the background health checker. The healthy snapshot is frozen
    /// as it is; routing keeps working.
    pub fn shutdown(&self) {
        if let Backend::ReadWrite(rw) = &self.backend {
            rw.stop.send_replace(true);
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
