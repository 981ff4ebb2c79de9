//! Everyday commands on top of the router.
//!
//! Reads borrow from [`RwPool::get_read`], writes from
//! [`RwPool::get_write`]. Flat tuple arguments are validated before any
//! connection is borrowed.

use std::collections::HashMap;
use std::hash::Hash;

use bytes::Bytes;

use crate::command::{Arg, Batch, Command};
use crate::connection::{Connect, Connection};
use crate::error::Result;
use crate::pipeline;
use crate::reply::Reply;
use crate::resp::types::Value;
use crate::router::RwPool;

fn collect_args<I>(items: I) -> Vec<Arg>
where
    I: IntoIterator,
    I::Item: Into<Arg>,
{
    items.into_iter().map(Into::into).collect()
}

impl<K: Connect> RwPool<K> {
    /// Run one command on a read connection.
    pub async fn read(&self, cmd: &Command) -> Reply {
        let result = match self.get_read().await {
            Ok(mut conn) => conn.execute(cmd).await,
            Err(e) => Err(e),
        };
        Reply::new(result)
    }

    /// Run one command on the master.
    pub async fn write(&self, cmd: &Command) -> Reply {
        let result = match self.get_write().await {
            Ok(mut conn) => conn.execute(cmd).await,
            Err(e) => Err(e),
        };
        Reply::new(result)
    }

    /// `GET key`. A missing key is a nil reply.
    pub async fn get(&self, key: impl Into<Arg>) -> Reply {
        self.read(&Command::new("GET").arg(key)).await
    }

    pub async fn set(&self, key: impl Into<Arg>, value: impl Into<Arg>) -> Result<()> {
        self.write(&Command::new("SET").arg(key).arg(value))
            .await
            .into_result()
            .map(drop)
    }

    /// `DEL key`; returns how many keys were removed.
    pub async fn del(&self, key: impl Into<Arg>) -> Result<i64> {
        self.write(&Command::new("DEL").arg(key)).await.as_i64()
    }

    pub async fn exists(&self, key: impl Into<Arg>) -> Result<bool> {
        self.read(&Command::new("EXISTS").arg(key)).await.as_bool()
    }

    /// `EXPIRE key seconds`; false when the key does not exist.
    pub async fn expire(&self, key: impl Into<Arg>, seconds: i64) -> Result<bool> {
        self.write(&Command::new("EXPIRE").arg(key).arg(seconds))
            .await
            .as_bool()
    }

    /// `MGET`: one value per key in key order, `None` for missing keys.
    pub async fn mget<I>(&self, keys: I) -> Result<Vec<Option<Bytes>>>
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        let keys = collect_args(keys);
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.read(&Command::new("MGET").args(keys))
            .await
            .as_values()?
            .into_iter()
            .map(|v| match v {
                Value::Nil => Ok(None),
                other => Reply::from(other).as_bytes().map(Some),
            })
            .collect()
    }

    /// `MSET k1 v1 k2 v2 …`. Fails on an odd argument count.
    pub async fn mset<I>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        let cmd = Command::with_tuples("MSET", 2, collect_args(pairs))?;
        self.write(&cmd).await.into_result().map(drop)
    }

    /// `EXPIRE` every key in one transaction.
    pub async fn multi_expire<I>(&self, keys: I, seconds: i64) -> Result<Vec<Reply>>
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        let batch: Batch = collect_args(keys)
            .into_iter()
            .map(|key| Command::new("EXPIRE").arg(key).arg(seconds))
            .collect();
        self.transaction(&batch).await
    }

    /// `HSET key field value` for each triple, in one transaction.
    pub async fn hmulti_set<I>(&self, triples: I) -> Result<Vec<Reply>>
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        let batch = Batch::from(Command::tuples("HSET", 3, collect_args(triples))?);
        self.transaction(&batch).await
    }

    /// `HGET key field` for each pair, pipelined.
    ///
    /// Returns `key -> field -> value`; missing fields are left out.
    pub async fn hmulti_get<I>(&self, pairs: I) -> Result<HashMap<String, HashMap<String, Value>>>
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        let pairs: Vec<(Arg, Arg)> = Command::tuples("HGET", 2, collect_args(pairs))?
            .into_iter()
            .map(|cmd| {
                let args = cmd.args_slice();
                (args[0].clone(), args[1].clone())
            })
            .collect();

        let mut conn = self.get_read().await?;
        let found = pipeline::multi_get_with(&mut conn, &pairs, |(key, field)| {
            Command::new("HGET").arg(key.clone()).arg(field.clone())
        })
        .await?;

        let mut nested: HashMap<String, HashMap<String, Value>> = HashMap::new();
        for ((key, field), value) in found {
            nested
                .entry(key.to_string_lossy())
                .or_default()
                .insert(field.to_string_lossy(), value);
        }
        Ok(nested)
    }

    /// `ZSCORE key member` for each member, pipelined. Non-members are left out.
    pub async fn zmulti_score<T>(&self, key: impl Into<Arg>, members: &[T]) -> Result<HashMap<T, f64>>
    where
        T: Eq + Hash + Clone + AsRef<[u8]>,
    {
        if members.is_empty() {
            return Ok(HashMap::new());
        }
        let key = key.into();
        let mut conn = self.get_read().await?;
        let found = pipeline::multi_get_with(&mut conn, members, |member| {
            Command::new("ZSCORE").arg(key.clone()).arg(AsRef::<[u8]>::as_ref(member))
        })
        .await?;

        found
            .into_iter()
            .map(|(member, value)| Ok((member, Reply::from(value).as_f64()?)))
            .collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
