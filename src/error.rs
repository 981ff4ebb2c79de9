use std::io;
use std::sync::Arc;

use thiserror::Error;

// ── Error taxonomy ─────────────────────────────────────────────────
//
//  RwPoolError
//  ├── PoolExhausted / Dial      (acquisition: pool stays usable)
//  ├── Connection / Timeout      (transport, connection is discarded)
//  ├── Protocol / Incomplete     (RESP framing)
//  ├── Redis                     (server error reply, kind parsed)
//  ├── Nil                       (key absent, not a failure)
//  ├── Coercion                  (reply shape mismatch)
//  ├── InvalidArgumentCount      (batch arity check)
//  ├── TransactionAborted        (EXEC returned nil)
//  └── Config

/// Structured Redis error kinds for programmatic matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisErrorKind {
    /// Generic ERR
    Err,
    /// WRONGTYPE Operation against a key holding the wrong kind of value
    WrongType,
    /// EXECABORT Transaction discarded because of previous errors
    ExecAbort,
    /// LOADING Redis is loading the dataset in memory
    Loading,
    /// READONLY You can't write against a read only replica
    ReadOnly,
    /// NOAUTH / WRONGPASS
    Auth,
    /// BUSY Redis is busy running a script
    Busy,
    /// Any other Redis error prefix
    Other(String),
}

impl RedisErrorKind {
    /// Parse from a Redis error message string (e.g. "WRONGTYPE Operation against…").
    pub fn from_error_msg(msg: &str) -> Self {
        let prefix = msg.split_whitespace().next().unwrap_or("UNKNOWN");
        match prefix {
            "ERR" => Self::Err,
            "WRONGTYPE" => Self::WrongType,
            "EXECABORT" => Self::ExecAbort,
            "LOADING" => Self::Loading,
            "READONLY" => Self::ReadOnly,
            "NOAUTH" | "WRONGPASS" => Self::Auth,
            "BUSY" => Self::Busy,
            other => Self::Other(other.to_string()),
        }
    }
}

/// All error variants for rwpool.
///
/// `Clone` so that a [`Reply`](crate::reply::Reply) can hand out the same
/// error to every accessor; I/O errors are shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum RwPoolError {
    /// TCP / IO level errors
    #[error("connection error: {0}")]
    Connection(Arc<io::Error>),

    /// The pool has no free slot and the wait policy forbids (or gave up) waiting.
    #[error("connection pool exhausted for {addr}")]
    PoolExhausted { addr: String },

    /// Dialing or initializing a new connection failed.
    #[error("cannot connect to {addr}: {source}")]
    Dial {
        addr: String,
        source: Box<RwPoolError>,
    },

    /// RESP protocol parse errors
    #[error("protocol error: {0}")]
    Protocol(String),

    /// RESP parser needs more data. Control flow only, never surfaced.
    #[error("incomplete RESP message")]
    Incomplete,

    /// Redis returned an error reply.
    #[error("redis error: {message}")]
    Redis {
        kind: RedisErrorKind,
        message: String,
    },

    /// The reply was nil: the key (or field, or member) does not exist.
    #[error("nil reply")]
    Nil,

    /// The reply does not have the shape the caller asked for.
    #[error("type error: {0}")]
    Coercion(String),

    /// Operation timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// A flat argument list does not split into whole tuples.
    #[error("invalid argument count for {command}: expected a non-zero multiple of {arity}, got {got}")]
    InvalidArgumentCount {
        command: String,
        arity: usize,
        got: usize,
    },

    /// EXEC returned nil, the server discarded the transaction.
    #[error("transaction aborted by server")]
    TransactionAborted,

    /// Invalid endpoint or router configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl RwPoolError {
    /// Create a Redis error from a raw error message, auto-parsing the kind.
    pub fn redis(msg: impl Into<String>) -> Self {
        let message = msg.into();
        let kind = RedisErrorKind::from_error_msg(&message);
        Self::Redis { kind, message }
    }

    /// True for the "key absent" sentinel.
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// True when no connection could be obtained from a pool.
    pub fn is_acquisition(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::Dial { .. })
    }

    /// True when the connection that produced this error can't be reused.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Protocol(_) | Self::Incomplete | Self::Timeout(_)
        )
    }

    /// The parsed kind if this is a server error reply.
    pub fn redis_kind(&self) -> Option<&RedisErrorKind> {
        match self {
            Self::Redis { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

impl From<io::Error> for RwPoolError {
    fn from(e: io::Error) -> Self {
        Self::Connection(Arc::new(e))
    }
}

pub type Result<T> = std::result::Result<T, RwPoolError>;

// ── Tests ──────────────────────────────────────────────────────────
