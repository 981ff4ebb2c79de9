//! `MULTI` / `EXEC` transactions on one reserved connection.

use tracing::debug;

use crate::command::{Batch, Command};
use crate::connection::{Connect, Connection};
use crate::error::{Result, RwPoolError};
use crate::reply::Reply;
use crate::resp::types::Value;
use crate::router::RwPool;

/// Stage `batch` under `MULTI` and commit it with `EXEC`.
///
/// Returns one [`Reply`] per command, in order. When staging a command
/// fails, `DISCARD` is issued and the staging error is returned unchanged;
/// nothing after the failing command is sent. A nil `EXEC` reply (a watched
/// key changed) is [`RwPoolError::TransactionAborted`]. A failed `EXEC` is
/// followed by `DISCARD` unless the connection itself is gone.
pub async fn run<C: Connection>(conn: &mut C, batch: &Batch) -> Result<Vec<Reply>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    conn.send(&Command::new("MULTI")).await?;
    for cmd in batch.commands() {
        if let Err(e) = conn.send(cmd).await {
            debug!(verb = cmd.verb(), error = %e, "staging failed, discarding transaction");
            discard(conn).await;
            return Err(e);
        }
    }

    let committed = match conn.execute(&Command::new("EXEC")).await {
        Ok(value) => value,
        Err(e) => {
            // A dead connection is dropped by its owner; the server forgets
            // the MULTI state with it.
            if !e.is_fatal() {
                discard(conn).await;
            }
            return Err(e);
        }
    };

    match committed {
        Value::Array(items) if items.len() == batch.len() => {
            Ok(items.into_iter().map(Reply::from).collect())
        }
        Value::Nil => Err(RwPoolError::TransactionAborted),
        Value::Array(items) => Err(RwPoolError::Protocol(format!(
            "EXEC returned {} replies for {} commands",
            items.len(),
            batch.len()
        ))),
        other => Err(RwPoolError::Protocol(format!(
            "unexpected EXEC response: {}",
            other.type_name()
        ))),
    }
}

/// Best effort: the caller returns the original error either way.
async fn discard<C: Connection>(conn: &mut C) {
    if let Err(e) = conn.execute(&Command::new("DISCARD")).await {
        debug!(error = %e, "DISCARD failed");
    }
}

impl<K: Connect> RwPool<K> {
    /// Run `batch` atomically on one master connection.
    pub async fn transaction(&self, batch: &Batch) -> Result<Vec<Reply>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.get_write().await?;
        run(&mut conn, batch).await
    }
}

// ── Tests ──────────────────────────────────────────────────────────
