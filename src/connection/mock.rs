//! Scripted in-memory transport for unit tests.
//!
//! Every connection dialed by a [`MockConnector`] answers commands through a
//! shared handler closure and records what it was asked to do. `MULTI` /
//! `EXEC` / `DISCARD` are emulated: commands between `MULTI` and `EXEC` are
//! answered with `QUEUED` and run through the handler on `EXEC`.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::command::Command;
use crate::config::Endpoint;
use crate::connection::{Connect, Connection};
use crate::error::{Result, RwPoolError};
use crate::resp::types::Value;

type Handler = dyn Fn(&Command) -> Result<Value> + Send + Sync;
type SendFilter = dyn Fn(&Command) -> bool + Send + Sync;
type DialFilter = dyn Fn(&Endpoint) -> bool + Send + Sync;

/// One recorded interaction, in call order across all connections.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Send(Command),
    Flush,
    Receive,
    Close,
}

struct Shared {
    handler: Box<Handler>,
    fail_send: Mutex<Option<Box<SendFilter>>>,
    refuse_dial: Mutex<Option<Box<DialFilter>>>,
    slow_dial: Mutex<Option<(Box<DialFilter>, Duration)>>,
    log: Mutex<Vec<Call>>,
    dials: AtomicUsize,
    dropped: AtomicUsize,
}

#[derive(Clone)]
pub(crate) struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    pub(crate) fn new(handler: impl Fn(&Command) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler: Box::new(handler),
                fail_send: Mutex::new(None),
                refuse_dial: Mutex::new(None),
                slow_dial: Mutex::new(None),
                log: Mutex::new(Vec::new()),
                dials: AtomicUsize::new(0),
                dropped: AtomicUsize::new(0),
            }),
        }
    }

    /// Every command answered with `+OK`.
    pub(crate) fn ok() -> Self {
        Self::new(|_| Ok(Value::status("OK")))
    }

    /// `send` fails with a broken pipe for every command matching `filter`.
    pub(crate) fn fail_send_when(&self, filter: impl Fn(&Command) -> bool + Send + Sync + 'static) {
        *self.shared.fail_send.lock() = Some(Box::new(filter));
    }

    pub(crate) fn refuse_dial(&self, refuse: bool) {
        *self.shared.refuse_dial.lock() = refuse.then(|| Box::new(|_: &Endpoint| true) as Box<DialFilter>);
    }

    /// Dialing fails for every endpoint matching `filter`.
    pub(crate) fn refuse_dial_when(&self, filter: impl Fn(&Endpoint) -> bool + Send + Sync + 'static) {
        *self.shared.refuse_dial.lock() = Some(Box::new(filter));
    }

    /// Dialing an endpoint matching `filter` takes `delay` first.
    pub(crate) fn slow_dial_when(
        &self,
        delay: Duration,
        filter: impl Fn(&Endpoint) -> bool + Send + Sync + 'static,
    ) {
        *self.shared.slow_dial.lock() = Some((Box::new(filter), delay));
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.shared.log.lock().clone()
    }

    /// Verbs of the recorded sends, in order.
    pub(crate) fn sent_verbs(&self) -> Vec<String> {
        self.shared
            .log
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Send(cmd) => Some(cmd.verb().to_string()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn dials(&self) -> usize {
        self.shared.dials.load(Ordering::SeqCst)
    }

    pub(crate) fn dropped(&self) -> usize {
        self.shared.dropped.load(Ordering::SeqCst)
    }
}

impl Connect for MockConnector {
    type Conn = MockConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<MockConnection> {
        let delay = self
            .shared
            .slow_dial
            .lock()
            .as_ref()
            .and_then(|(filter, delay)| filter(endpoint).then_some(*delay));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let refused = self
            .shared
            .refuse_dial
            .lock()
            .as_ref()
            .is_some_and(|filter| filter(endpoint));
        if refused {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused", endpoint.addr()),
            )
            .into());
        }
        self.shared.dials.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            shared: Arc::clone(&self.shared),
            replies: VecDeque::new(),
            queued: None,
        })
    }
}

pub(crate) struct MockConnection {
    shared: Arc<Shared>,
    replies: VecDeque<Result<Value>>,
    /// Commands staged since `MULTI`, if a transaction is open.
    queued: Option<Vec<Command>>,
}

impl MockConnection {
    fn answer(&mut self, cmd: &Command) -> Result<Value> {
        match cmd.verb() {
            "MULTI" => {
                self.queued = Some(Vec::new());
                Ok(Value::status("OK"))
            }
            "DISCARD" => match self.queued.take() {
                Some(_) => Ok(Value::status("OK")),
                None => Err(RwPoolError::redis("ERR DISCARD without MULTI")),
            },
            "EXEC" => match self.queued.take() {
                Some(staged) => Ok(Value::Array(
                    staged.iter().map(|c| self.run_queued(c)).collect(),
                )),
                None => Err(RwPoolError::redis("ERR EXEC without MULTI")),
            },
            _ => match self.queued.as_mut() {
                Some(staged) => {
                    staged.push(cmd.clone());
                    Ok(Value::status("QUEUED"))
                }
                None => (self.shared.handler)(cmd),
            },
        }
    }

    /// Inside `EXEC`, error replies become nested error elements.
    fn run_queued(&self, cmd: &Command) -> Value {
        match (self.shared.handler)(cmd) {
            Ok(v) => v,
            Err(RwPoolError::Redis { message, .. }) => Value::Error(message),
            Err(other) => Value::Error(other.to_string()),
        }
    }
}

impl Connection for MockConnection {
    async fn send(&mut self, cmd: &Command) -> Result<()> {
        self.shared.log.lock().push(Call::Send(cmd.clone()));
        let fails = self
            .shared
            .fail_send
            .lock()
            .as_ref()
            .is_some_and(|filter| filter(cmd));
        if fails {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted send failure").into());
        }
        let reply = self.answer(cmd);
        self.replies.push_back(reply);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.shared.log.lock().push(Call::Flush);
        Ok(())
    }

    async fn receive(&mut self) -> Result<Value> {
        self.shared.log.lock().push(Call::Receive);
        self.replies
            .pop_front()
            .unwrap_or_else(|| Err(RwPoolError::Protocol("receive with nothing pending".into())))
    }

    fn pending(&self) -> usize {
        self.replies.len()
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.log.lock().push(Call::Close);
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.shared.dropped.fetch_add(1, Ordering::SeqCst);
    }
}
