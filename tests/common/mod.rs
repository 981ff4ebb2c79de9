//! Shared helpers for integration tests.
//!
//! [`FakeRedis`] is a small in-process RESP server bound to an ephemeral
//! port. It understands the handful of commands the router issues, keeps a
//! log of every verb it served, and can be switched "down": while down it
//! drops new and existing connections without answering.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use rwpool::resp::{parse, Value};
use rwpool::{Endpoint, RouterConfig, RwPoolError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
enum Entry {
    Str(Bytes),
    Hash(HashMap<Bytes, Bytes>),
    ZSet(HashMap<Bytes, f64>),
}

#[derive(Default)]
struct Shared {
    store: Mutex<HashMap<Bytes, Entry>>,
    ttls: Mutex<HashMap<Bytes, i64>>,
    log: Mutex<Vec<String>>,
    down: AtomicBool,
    accepted: AtomicUsize,
}

pub struct FakeRedis {
    port: u16,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl FakeRedis {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Arc::new(Shared::default());
        let state = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                if state.down.load(Ordering::SeqCst) {
                    drop(socket);
                    continue;
                }
                state.accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, Arc::clone(&state)));
            }
        });
        Self { port, shared, task }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("redis://127.0.0.1:{}", self.port)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.port)
    }

    pub fn set_down(&self, down: bool) {
        self.shared.down.store(down, Ordering::SeqCst);
    }

    /// Verbs served so far, in arrival order.
    pub fn log(&self) -> Vec<String> {
        self.shared.log.lock().clone()
    }

    pub fn served(&self, verb: &str) -> usize {
        self.shared.log.lock().iter().filter(|v| *v == verb).count()
    }

    pub fn clear_log(&self) {
        self.shared.log.lock().clear();
    }

    /// Connections accepted while up.
    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Seed a string key directly, bypassing the protocol.
    pub fn insert(&self, key: &str, value: &str) {
        self.shared.store.lock().insert(
            Bytes::copy_from_slice(key.as_bytes()),
            Entry::Str(Bytes::copy_from_slice(value.as_bytes())),
        );
    }

    pub fn ttl(&self, key: &str) -> Option<i64> {
        self.shared.ttls.lock().get(key.as_bytes()).copied()
    }
}

impl Drop for FakeRedis {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Master plus replicas, with a router config whose background checker
/// stays out of the way unless the test asks for it.
pub async fn cluster(replicas: usize) -> (FakeRedis, Vec<FakeRedis>, RouterConfig) {
    let master = FakeRedis::start().await;
    let mut reads = Vec::with_capacity(replicas);
    for _ in 0..replicas {
        reads.push(FakeRedis::start().await);
    }
    let config = RouterConfig::new(
        master.endpoint(),
        reads.iter().map(FakeRedis::endpoint).collect(),
    )
    .with_check_interval(Duration::from_secs(3600))
    .with_probe_timeout(Duration::from_millis(500));
    (master, reads, config)
}

// ── Server side ────────────────────────────────────────────────────

async fn serve(mut socket: TcpStream, state: Arc<Shared>) {
    let mut buf = BytesMut::with_capacity(4096);
    let mut queued: Option<Vec<Vec<Bytes>>> = None;
    loop {
        let frame = Bytes::copy_from_slice(&buf);
        let (value, consumed) = match parse(&frame) {
            Ok(parsed) => parsed,
            Err(RwPoolError::Incomplete) => {
                match socket.read_buf(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => continue,
                }
            }
            Err(_) => return,
        };
        buf.advance(consumed);

        if state.down.load(Ordering::SeqCst) {
            return;
        }

        let Value::Array(items) = value else {
            return;
        };
        let args: Vec<Bytes> = items
            .into_iter()
            .filter_map(|v| match v {
                Value::Data(b) => Some(b),
                _ => None,
            })
            .collect();
        let Some(verb) = args.first().map(|v| String::from_utf8_lossy(v).to_uppercase()) else {
            return;
        };
        state.log.lock().push(verb.clone());

        let reply = match verb.as_str() {
            "MULTI" => {
                queued = Some(Vec::new());
                Value::status("OK")
            }
            "DISCARD" => {
                queued = None;
                Value::status("OK")
            }
            "EXEC" => match queued.take() {
                Some(commands) => {
                    Value::Array(commands.iter().map(|cmd| execute(&state, cmd)).collect())
                }
                None => Value::Error("ERR EXEC without MULTI".into()),
            },
            _ => match queued.as_mut() {
                Some(commands) => {
                    commands.push(args);
                    Value::status("QUEUED")
                }
                None => execute(&state, &args),
            },
        };

        let mut out = Vec::new();
        encode(&reply, &mut out);
        if socket.write_all(&out).await.is_err() {
            return;
        }
    }
}

fn execute(state: &Shared, args: &[Bytes]) -> Value {
    let verb = String::from_utf8_lossy(&args[0]).to_uppercase();
    let args = &args[1..];
    let mut store = state.store.lock();
    match (verb.as_str(), args.len()) {
        ("PING", _) => Value::status("PONG"),
        ("SELECT", 1) | ("AUTH", _) => Value::status("OK"),
        ("GET", 1) => match store.get(&args[0]) {
            Some(Entry::Str(v)) => Value::Data(v.clone()),
            Some(_) => wrong_type(),
            None => Value::Nil,
        },
        ("SET", 2) => {
            store.insert(args[0].clone(), Entry::Str(args[1].clone()));
            Value::status("OK")
        }
        ("DEL", n) if n > 0 => {
            let removed = args.iter().filter(|k| store.remove(*k).is_some()).count();
            Value::Int(removed as i64)
        }
        ("EXISTS", n) if n > 0 => {
            Value::Int(args.iter().filter(|k| store.contains_key(*k)).count() as i64)
        }
        ("EXPIRE", 2) => {
            if !store.contains_key(&args[0]) {
                return Value::Int(0);
            }
            let Some(seconds) = parse_num::<i64>(&args[1]) else {
                return Value::Error("ERR value is not an integer or out of range".into());
            };
            state.ttls.lock().insert(args[0].clone(), seconds);
            Value::Int(1)
        }
        ("INCR", 1) => {
            let current = match store.get(&args[0]) {
                Some(Entry::Str(v)) => match parse_num::<i64>(v) {
                    Some(n) => n,
                    None => return Value::Error("ERR value is not an integer or out of range".into()),
                },
                Some(_) => return wrong_type(),
                None => 0,
            };
            let next = current + 1;
            store.insert(args[0].clone(), Entry::Str(Bytes::from(next.to_string())));
            Value::Int(next)
        }
        ("MSET", n) if n > 0 && n % 2 == 0 => {
            for pair in args.chunks(2) {
                store.insert(pair[0].clone(), Entry::Str(pair[1].clone()));
            }
            Value::status("OK")
        }
        ("MGET", n) if n > 0 => Value::Array(
            args.iter()
                .map(|k| match store.get(k) {
                    Some(Entry::Str(v)) => Value::Data(v.clone()),
                    _ => Value::Nil,
                })
                .collect(),
        ),
        ("HSET", n) if n >= 3 && n % 2 == 1 => {
            let entry = store
                .entry(args[0].clone())
                .or_insert_with(|| Entry::Hash(HashMap::new()));
            let Entry::Hash(fields) = entry else {
                return wrong_type();
            };
            let added = args[1..]
                .chunks(2)
                .filter(|fv| fields.insert(fv[0].clone(), fv[1].clone()).is_none())
                .count();
            Value::Int(added as i64)
        }
        ("HGET", 2) => match store.get(&args[0]) {
            Some(Entry::Hash(fields)) => fields.get(&args[1]).cloned().map_or(Value::Nil, Value::Data),
            Some(_) => wrong_type(),
            None => Value::Nil,
        },
        ("ZADD", n) if n >= 3 && n % 2 == 1 => {
            let entry = store
                .entry(args[0].clone())
                .or_insert_with(|| Entry::ZSet(HashMap::new()));
            let Entry::ZSet(members) = entry else {
                return wrong_type();
            };
            let mut added = 0;
            for sm in args[1..].chunks(2) {
                let Some(score) = parse_num::<f64>(&sm[0]) else {
                    return Value::Error("ERR value is not a valid float".into());
                };
                if members.insert(sm[1].clone(), score).is_none() {
                    added += 1;
                }
            }
            Value::Int(added)
        }
        ("ZSCORE", 2) => match store.get(&args[0]) {
            Some(Entry::ZSet(members)) => members
                .get(&args[1])
                .map_or(Value::Nil, |s| Value::data(s.to_string())),
            Some(_) => wrong_type(),
            None => Value::Nil,
        },
        _ => Value::Error(format!(
            "ERR unknown command or wrong number of arguments for '{}'",
            verb.to_lowercase()
        )),
    }
}

fn wrong_type() -> Value {
    Value::Error("WRONGTYPE Operation against a key holding the wrong kind of value".into())
}

fn parse_num<T: std::str::FromStr>(raw: &[u8]) -> Option<T> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Nil => out.extend_from_slice(b"$-1\r\n"),
        Value::Int(n) => out.extend_from_slice(format!(":{n}\r\n").as_bytes()),
        Value::Status(s) => out.extend_from_slice(format!("+{s}\r\n").as_bytes()),
        Value::Error(e) => out.extend_from_slice(format!("-{e}\r\n").as_bytes()),
        Value::Data(b) => {
            out.extend_from_slice(format!("${}\r\n", b.len()).as_bytes());
            out.extend_from_slice(b);
            out.extend_from_slice(b"\r\n");
        }
        Value::Array(items) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode(item, out);
            }
        }
    }
}
