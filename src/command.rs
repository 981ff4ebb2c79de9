//! Typed commands and batches.
//!
//! A [`Command`] is a verb plus an ordered list of [`Arg`]s, each already
//! rendered to the bytes that go on the wire. Flat tuple lists (e.g.
//! `key field value key field value …`) are validated once, at the entry
//! point, by [`Command::tuples`].

use bytes::Bytes;

use crate::error::{Result, RwPoolError};

/// One positional command argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arg(Bytes);

impl Arg {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy text form, handy for map keys and logs.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl std::ops::Deref for Arg {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg(Bytes::from(s))
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::from(s.as_str())
    }
}

impl From<&[u8]> for Arg {
    fn from(b: &[u8]) -> Self {
        Arg(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Arg {
    fn from(b: Vec<u8>) -> Self {
        Arg(Bytes::from(b))
    }
}

impl From<Bytes> for Arg {
    fn from(b: Bytes) -> Self {
        Arg(b)
    }
}

macro_rules! int_arg {
    ($($t:ty),+) => {
        $(impl From<$t> for Arg {
            fn from(n: $t) -> Self {
                let mut buf = itoa::Buffer::new();
                Arg(Bytes::copy_from_slice(buf.format(n).as_bytes()))
            }
        })+
    };
}

int_arg!(i32, i64, u32, u64, usize);

impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        let text = if f.is_infinite() {
            if f > 0.0 { "+inf".to_string() } else { "-inf".to_string() }
        } else {
            f.to_string()
        };
        Arg(Bytes::from(text))
    }
}

/// A verb and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    args: Vec<Arg>,
}

impl Command {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument (builder style).
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments (builder style).
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn args_slice(&self) -> &[Arg] {
        &self.args
    }

    /// Split a flat argument list into one command per `arity`-sized tuple.
    ///
    /// Fails with `InvalidArgumentCount` when `args` is empty or its length
    /// is not a multiple of `arity`.
    pub fn tuples(verb: &str, arity: usize, args: Vec<Arg>) -> Result<Vec<Command>> {
        check_tuples(verb, arity, args.len())?;
        let mut commands = Vec::with_capacity(args.len() / arity);
        let mut iter = args.into_iter();
        loop {
            let tuple: Vec<Arg> = iter.by_ref().take(arity).collect();
            if tuple.is_empty() {
                break;
            }
            commands.push(Command::new(verb).args(tuple));
        }
        Ok(commands)
    }

    /// One command carrying a flat tuple list, e.g. `MSET k1 v1 k2 v2`.
    pub fn with_tuples(verb: &str, arity: usize, args: Vec<Arg>) -> Result<Command> {
        check_tuples(verb, arity, args.len())?;
        Ok(Command::new(verb).args(args))
    }
}

fn check_tuples(verb: &str, arity: usize, got: usize) -> Result<()> {
    if arity == 0 || got == 0 || got % arity != 0 {
        return Err(RwPoolError::InvalidArgumentCount {
            command: verb.to_string(),
            arity,
            got,
        });
    }
    Ok(())
}

/// An ordered list of commands sent together, either as a pipeline or as
/// the body of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one command (builder style).
    pub fn add(mut self, cmd: Command) -> Self {
        self.commands.push(cmd);
        self
    }

    pub fn push(&mut self, cmd: Command) {
        self.commands.push(cmd);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

impl From<Vec<Command>> for Batch {
    fn from(commands: Vec<Command>) -> Self {
        Self { commands }
    }
}

impl FromIterator<Command> for Batch {
    fn from_iter<T: IntoIterator<Item = Command>>(iter: T) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
