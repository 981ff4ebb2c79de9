//! Endpoint and router configuration, plus URL parsing.
//!
//! Supported URL form:
//! `redis[s]://[user:pass@]host[:port][/db][?max_idle=N&max_active=N&idle_timeout_ms=N&connect_timeout_ms=N&read_timeout_ms=N&wait=true|false]`

use std::time::Duration;

use crate::error::{Result, RwPoolError};

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Default interval between two replica health check cycles.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound for a single replica probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default maximum read buffer size per connection (512 MB).
pub const DEFAULT_MAX_BUF_SIZE: usize = 512 * 1024 * 1024;

/// One store endpoint and the sizing of the pool in front of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Optional username (Redis 6+ ACL).
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database index selected on every new connection.
    pub db: u16,
    /// Whether to use TLS (needs the `tls` feature).
    pub tls: bool,
    /// Maximum number of idle connections kept for reuse.
    pub max_idle: usize,
    /// Maximum number of connections lent out at once (0 = unbounded).
    pub max_active: usize,
    /// Idle connections older than this are discarded. Also bounds how long
    /// a caller waits for a free slot when `wait` is set.
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Per-reply read timeout (0 = none).
    pub read_timeout_ms: u64,
    /// Block when the pool is exhausted instead of failing fast.
    pub wait: bool,
    /// Maximum read buffer size per connection in bytes.
    pub max_buffer_size: usize,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            db: 0,
            tls: false,
            max_idle: 8,
            max_active: 0,
            idle_timeout_ms: 120_000,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 30_000,
            wait: true,
            max_buffer_size: DEFAULT_MAX_BUF_SIZE,
        }
    }
}

impl Endpoint {
    /// Endpoint for `host:port` with default sizing.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Parse a Redis URL into an Endpoint.
    pub fn from_url(url: &str) -> Result<Self> {
        let mut endpoint = Self::default();

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| RwPoolError::Config(format!("invalid URL, missing ://: {url}")))?;

        match scheme {
            "redis" => {}
            "rediss" => endpoint.tls = true,
            _ => {
                return Err(RwPoolError::Config(format!("unknown URL scheme: {scheme}")));
            }
        }

        let (rest, query) = match rest.split_once('?') {
            Some((before, q)) => (before, Some(q)),
            None => (rest, None),
        };

        let (host_part, db_part) = split_path(rest);
        if let Some(db_str) = db_part {
            endpoint.db = db_str
                .parse()
                .map_err(|_| RwPoolError::Config(format!("invalid db number: {db_str}")))?;
        }

        let host_port = match host_part.rsplit_once('@') {
            Some((userinfo, hp)) => {
                parse_userinfo(&mut endpoint, userinfo);
                hp
            }
            None => host_part,
        };
        parse_host_port(host_port, &mut endpoint)?;

        if let Some(query) = query {
            parse_query(&mut endpoint, query)?;
        }
        Ok(endpoint)
    }

    /// Return the address as "host:port".
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `None` when reads are unbounded.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

/// A master endpoint, zero or more replicas, and health check timing.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub write: Endpoint,
    pub reads: Vec<Endpoint>,
    pub check_interval: Duration,
    pub probe_timeout: Duration,
}

impl RouterConfig {
    pub fn new(write: Endpoint, reads: Vec<Endpoint>) -> Self {
        Self {
            write,
            reads,
            check_interval: DEFAULT_CHECK_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Build from one master URL and any number of replica URLs.
    pub fn from_urls(write: &str, reads: &[&str]) -> Result<Self> {
        let write = Endpoint::from_url(write)?;
        let reads = reads
            .iter()
            .map(|url| Endpoint::from_url(url))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(write, reads))
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

// ── URL parsing helpers ────────────────────────────────────────────

/// Split `rest` into (before_path, Some(path)) or (rest, None).
fn split_path(rest: &str) -> (&str, Option<&str>) {
    match rest.split_once('/') {
        Some((before, after)) if !after.is_empty() => (before, Some(after)),
        Some((before, _)) => (before, None),
        None => (rest, None),
    }
}

/// Parse `user:pass`, `:pass` or a bare password.
fn parse_userinfo(endpoint: &mut Endpoint, userinfo: &str) {
    match userinfo.split_once(':') {
        Some((user, pass)) => {
            if !user.is_empty() {
                endpoint.username = Some(user.to_string());
            }
            if !pass.is_empty() {
                endpoint.password = Some(pass.to_string());
            }
        }
        None if !userinfo.is_empty() => endpoint.password = Some(userinfo.to_string()),
        None => {}
    }
}

/// Parse `host[:port]` or `[ipv6]:port`.
fn parse_host_port(s: &str, endpoint: &mut Endpoint) -> Result<()> {
    let invalid_port = |p: &str| RwPoolError::Config(format!("invalid port: {p}"));

    if let Some(bracketed) = s.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| RwPoolError::Config(format!("unclosed IPv6 bracket: {s}")))?;
        endpoint.host = host.to_string();
        if let Some(port) = after.strip_prefix(':') {
            endpoint.port = port.parse().map_err(|_| invalid_port(port))?;
        }
    } else if let Some((host, port)) = s.rsplit_once(':') {
        endpoint.host = host.to_string();
        endpoint.port = port.parse().map_err(|_| invalid_port(port))?;
    } else {
        endpoint.host = s.to_string();
    }

    if endpoint.host.is_empty() {
        endpoint.host = "127.0.0.1".to_string();
    }
    Ok(())
}

/// Parse `key=value&key=value` pool sizing parameters.
fn parse_query(endpoint: &mut Endpoint, query: &str) -> Result<()> {
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| RwPoolError::Config(format!("invalid query parameter: {pair}")))?;
        let bad = || RwPoolError::Config(format!("invalid value for {key}: {value}"));
        match key {
            "max_idle" => endpoint.max_idle = value.parse().map_err(|_| bad())?,
            "max_active" => endpoint.max_active = value.parse().map_err(|_| bad())?,
            "idle_timeout_ms" => endpoint.idle_timeout_ms = value.parse().map_err(|_| bad())?,
            "connect_timeout_ms" => {
                endpoint.connect_timeout_ms = value.parse().map_err(|_| bad())?
            }
            "read_timeout_ms" => endpoint.read_timeout_ms = value.parse().map_err(|_| bad())?,
            "wait" => endpoint.wait = value.parse().map_err(|_| bad())?,
            _ => {
                return Err(RwPoolError::Config(format!("unknown query parameter: {key}")));
            }
        }
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────
