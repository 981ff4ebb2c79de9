//! Transport connections and the pool that lends them out.
//!
//! [`Connection`] is the request/response surface every higher layer is
//! written against; [`Connect`] dials new connections for an [`Endpoint`].
//! The TCP implementation lives in [`tcp`], the pool in [`pool`].

use std::future::Future;

use crate::command::Command;
use crate::config::Endpoint;
use crate::error::Result;
use crate::resp::types::Value;

#[cfg(test)]
pub(crate) mod mock;
pub mod pool;
pub mod tcp;

pub use pool::{ConnectionPool, PooledConnection};
pub use tcp::{TcpConnection, TcpConnector};

/// One logical connection to one endpoint.
///
/// Commands are queued with [`send`](Connection::send), written out with
/// [`flush`](Connection::flush) and answered, in order, by
/// [`receive`](Connection::receive). A top-level error reply comes back from
/// `receive` as `Err(RwPoolError::Redis)` and leaves the connection usable.
pub trait Connection: Send {
    /// Queue one command. May write to the socket when the send buffer fills.
    fn send(&mut self, cmd: &Command) -> impl Future<Output = Result<()>> + Send;

    /// Write every queued command to the socket.
    fn flush(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Read the reply to the oldest command not yet answered.
    fn receive(&mut self) -> impl Future<Output = Result<Value>> + Send;

    /// Number of commands sent whose reply has not been received.
    fn pending(&self) -> usize;

    /// Flush and shut down the write half. The connection is unusable afterwards.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send `cmd`, flush, and drain every pending reply.
    ///
    /// Returns the reply to `cmd`, or the first error reply among the
    /// drained ones (e.g. a queued `MULTI` body that the server rejected).
    /// A transport error stops the drain immediately.
    fn execute(&mut self, cmd: &Command) -> impl Future<Output = Result<Value>> + Send {
        async move {
            self.send(cmd).await?;
            self.flush().await?;

            let mut first_err = None;
            let mut last = Value::Nil;
            while self.pending() > 0 {
                match self.receive().await {
                    Ok(value) => last = value,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(last),
            }
        }
    }
}

/// Dials connections for an endpoint.
pub trait Connect: Send + Sync + 'static {
    type Conn: Connection + 'static;

    /// Open and initialize (auth, database select) a new connection.
    fn connect(&self, endpoint: &Endpoint) -> impl Future<Output = Result<Self::Conn>> + Send;
}
