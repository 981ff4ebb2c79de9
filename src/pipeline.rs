//! Pipelined batches: send everything, flush once, read back in order.

use std::collections::HashMap;
use std::hash::Hash;

use crate::command::{Batch, Command};
use crate::connection::{Connect, Connection};
use crate::error::Result;
use crate::reply::Reply;
use crate::resp::types::Value;
use crate::router::RwPool;

/// Pipeline `batch` and return one [`Reply`] per command.
///
/// Error replies stay in their own `Reply`; only a transport failure fails
/// the whole call.
pub async fn run<C: Connection>(conn: &mut C, batch: &Batch) -> Result<Vec<Reply>> {
    for cmd in batch.commands() {
        conn.send(cmd).await?;
    }
    conn.flush().await?;

    let mut replies = Vec::with_capacity(batch.len());
    for _ in 0..batch.len() {
        match conn.receive().await {
            Err(e) if e.is_fatal() => return Err(e),
            result => replies.push(Reply::new(result)),
        }
    }
    Ok(replies)
}

/// Fetch one value per key with a single round trip.
///
/// `build` turns each key into its read command. Keys whose reply is nil are
/// left out of the map; any other error aborts the call and drops the
/// partial results.
pub async fn multi_get_with<C, T, F>(conn: &mut C, keys: &[T], build: F) -> Result<HashMap<T, Value>>
where
    C: Connection,
    T: Eq + Hash + Clone,
    F: Fn(&T) -> Command,
{
    for key in keys {
        conn.send(&build(key)).await?;
    }
    conn.flush().await?;

    let mut found = HashMap::with_capacity(keys.len());
    for key in keys {
        match conn.receive().await {
            Ok(Value::Nil) => {}
            Ok(value) => {
                found.insert(key.clone(), value);
            }
            Err(e) if e.is_nil() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(found)
}

/// `GET` every key in one round trip. Missing keys are left out.
pub async fn multi_get<C, T>(conn: &mut C, keys: &[T]) -> Result<HashMap<T, Value>>
where
    C: Connection,
    T: Eq + Hash + Clone + AsRef<[u8]>,
{
    multi_get_with(conn, keys, |key| Command::new("GET").arg(AsRef::<[u8]>::as_ref(key))).await
}

impl<K: Connect> RwPool<K> {
    /// Pipelined `GET` on a read connection.
    pub async fn multi_get<T>(&self, keys: &[T]) -> Result<HashMap<T, Value>>
    where
        T: Eq + Hash + Clone + AsRef<[u8]>,
    {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.get_read().await?;
        multi_get(&mut conn, keys).await
    }

    /// Pipeline `batch` on a read connection.
    pub async fn pipeline_read(&self, batch: &Batch) -> Result<Vec<Reply>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.get_read().await?;
        run(&mut conn, batch).await
    }

    /// Pipeline `batch` on a master connection.
    pub async fn pipeline_write(&self, batch: &Batch) -> Result<Vec<Reply>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.get_write().await?;
        run(&mut conn, batch).await
    }
}

// ── Tests ──────────────────────────────────────────────────────────
