//! Read/write splitting Redis client.
//!
//! An [`RwPool`] keeps one [`ConnectionPool`] for the master and one per
//! replica. Writes always go to the master; reads are spread uniformly over
//! the replicas that passed the last background health check, falling back
//! to the master when none did.
//!
//! ```no_run
//! # async fn demo() -> rwpool::Result<()> {
//! let pool = rwpool::RwPool::from_urls(
//!     "redis://10.0.0.1:6379",
//!     &["redis://10.0.0.2:6379", "redis://10.0.0.3:6379"],
//! )?;
//! pool.set("greeting", "hello").await?;
//! let greeting = pool.get("greeting").await.as_string()?;
//! # let _ = greeting;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod ops;
pub mod pipeline;
pub mod reply;
pub mod resp;
pub mod router;
pub mod runtime;
pub mod transaction;

pub use command::{Arg, Batch, Command};
pub use config::{Endpoint, RouterConfig};
pub use connection::{Connect, Connection, ConnectionPool, PooledConnection, TcpConnector};
pub use error::{Result, RwPoolError};
pub use reply::Reply;
pub use resp::Value;
pub use router::RwPool;
