//! Typed decoding of store replies.
//!
//! A [`Reply`] holds the outcome of one store call. Every accessor first
//! hands back the stored error unchanged, then tries to coerce the raw value
//! to the requested shape. A nil raw value decodes to [`RwPoolError::Nil`],
//! which callers branch on with [`Reply::is_nil`] / [`RwPoolError::is_nil`]
//! rather than treating it as a failure.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{Result, RwPoolError};
use crate::resp::types::Value;

/// `SETNX` reply when the key was set.
pub const SET_NX_SUCCESS: i64 = 1;

/// The (raw value, error) pair produced by one store call.
#[derive(Debug, Clone)]
pub struct Reply {
    inner: Result<Value>,
}

impl Reply {
    pub fn new(inner: Result<Value>) -> Self {
        Self { inner }
    }

    /// True when the raw value is the nil marker (or the error is `Nil`).
    pub fn is_nil(&self) -> bool {
        match &self.inner {
            Ok(value) => value.is_nil(),
            Err(e) => e.is_nil(),
        }
    }

    /// True when the call itself did not fail. A nil reply is still OK.
    pub fn is_ok(&self) -> bool {
        self.inner.is_ok()
    }

    pub fn err(&self) -> Option<&RwPoolError> {
        self.inner.as_ref().err()
    }

    /// The raw value, if the call succeeded.
    pub fn raw(&self) -> Option<&Value> {
        self.inner.as_ref().ok()
    }

    pub fn into_result(self) -> Result<Value> {
        self.inner
    }

    /// Run `f` on the raw value unless the call failed.
    pub fn map_raw<T>(&self, f: impl FnOnce(&Value) -> Result<T>) -> Result<T> {
        match &self.inner {
            Ok(value) => f(value),
            Err(e) => Err(e.clone()),
        }
    }

    /// `SETNX` returned 1.
    pub fn is_set_nx_ok(&self) -> bool {
        matches!(self.as_i64(), Ok(SET_NX_SUCCESS))
    }

    /// `HSET` created a new field rather than overwriting one.
    pub fn is_hset_new(&self) -> bool {
        matches!(self.as_i64(), Ok(1))
    }

    // ── Scalars ────────────────────────────────────────────────────

    pub fn as_i64(&self) -> Result<i64> {
        value_to_i64(self.present()?)
    }

    pub fn as_i32(&self) -> Result<i32> {
        value_to_i32(self.present()?)
    }

    pub fn as_u64(&self) -> Result<u64> {
        match self.present()? {
            Value::Int(n) => u64::try_from(*n)
                .map_err(|_| RwPoolError::Coercion(format!("{n} is negative"))),
            Value::Data(b) => parse_text(b, "u64"),
            other => Err(unexpected("u64", other)),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self.present()? {
            Value::Int(n) => Ok(*n as f64),
            Value::Data(b) => parse_text(b, "f64"),
            other => Err(unexpected("f64", other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self.present()? {
            Value::Int(n) => Ok(*n != 0),
            Value::Data(b) => match &b[..] {
                b"1" | b"true" | b"TRUE" => Ok(true),
                b"0" | b"false" | b"FALSE" => Ok(false),
                _ => Err(RwPoolError::Coercion(format!(
                    "cannot parse {:?} as bool",
                    String::from_utf8_lossy(b)
                ))),
            },
            other => Err(unexpected("bool", other)),
        }
    }

    pub fn as_string(&self) -> Result<String> {
        value_to_string(self.present()?)
    }

    pub fn as_bytes(&self) -> Result<Bytes> {
        match self.present()? {
            Value::Data(b) => Ok(b.clone()),
            Value::Status(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            other => Err(unexpected("bytes", other)),
        }
    }

    // ── Sequences ──────────────────────────────────────────────────

    pub fn as_values(&self) -> Result<Vec<Value>> {
        Ok(self.array()?.to_vec())
    }

    /// Nil elements become empty strings.
    pub fn as_strings(&self) -> Result<Vec<String>> {
        self.array()?
            .iter()
            .map(|v| match v {
                Value::Nil => Ok(String::new()),
                other => value_to_string(other),
            })
            .collect()
    }

    /// Nil elements become empty byte strings.
    pub fn as_byte_slices(&self) -> Result<Vec<Bytes>> {
        self.array()?
            .iter()
            .map(|v| match v {
                Value::Nil => Ok(Bytes::new()),
                Value::Data(b) => Ok(b.clone()),
                other => Err(unexpected("bytes", other)),
            })
            .collect()
    }

    /// Nil elements become zero.
    pub fn as_i64s(&self) -> Result<Vec<i64>> {
        self.array()?
            .iter()
            .map(|v| match v {
                Value::Nil => Ok(0),
                other => value_to_i64(other),
            })
            .collect()
    }

    /// Nil elements become zero; values outside `i32` are a coercion error.
    pub fn as_i32s(&self) -> Result<Vec<i32>> {
        self.array()?
            .iter()
            .map(|v| match v {
                Value::Nil => Ok(0),
                other => value_to_i32(other),
            })
            .collect()
    }

    // ── Maps (flat key/value arrays such as HGETALL) ───────────────

    pub fn as_string_map(&self) -> Result<HashMap<String, String>> {
        self.pairs("string map", value_to_string)
    }

    pub fn as_bytes_map(&self) -> Result<HashMap<String, Bytes>> {
        self.pairs("bytes map", |v| match v {
            Value::Data(b) => Ok(b.clone()),
            other => Err(unexpected("bytes", other)),
        })
    }

    pub fn as_i64_map(&self) -> Result<HashMap<String, i64>> {
        self.pairs("i64 map", value_to_i64)
    }

    pub fn as_i32_map(&self) -> Result<HashMap<String, i32>> {
        self.pairs("i32 map", value_to_i32)
    }

    // ── Internals ──────────────────────────────────────────────────

    /// The raw value, with the stored error and nil folded into `Err`.
    fn present(&self) -> Result<&Value> {
        match &self.inner {
            Err(e) => Err(e.clone()),
            Ok(Value::Nil) => Err(RwPoolError::Nil),
            Ok(Value::Error(msg)) => Err(RwPoolError::redis(msg.clone())),
            Ok(value) => Ok(value),
        }
    }

    fn array(&self) -> Result<&[Value]> {
        match self.present()? {
            Value::Array(items) => Ok(items),
            other => Err(unexpected("array", other)),
        }
    }

    fn pairs<T>(
        &self,
        what: &str,
        convert: impl Fn(&Value) -> Result<T>,
    ) -> Result<HashMap<String, T>> {
        let items = self.array()?;
        if items.len() % 2 != 0 {
            return Err(RwPoolError::Coercion(format!(
                "{what} expects an even number of values, got {}",
                items.len()
            )));
        }
        let mut map = HashMap::with_capacity(items.len() / 2);
        for pair in items.chunks_exact(2) {
            let key = match &pair[0] {
                Value::Data(b) => String::from_utf8_lossy(b).into_owned(),
                other => {
                    return Err(RwPoolError::Coercion(format!(
                        "{what} key is a {}, not a bulk string",
                        other.type_name()
                    )))
                }
            };
            map.insert(key, convert(&pair[1])?);
        }
        Ok(map)
    }
}

impl From<Result<Value>> for Reply {
    fn from(inner: Result<Value>) -> Self {
        Self::new(inner)
    }
}

/// A nested error element (e.g. inside an `EXEC` result) becomes an error reply.
impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        match value {
            Value::Error(msg) => Self::new(Err(RwPoolError::redis(msg))),
            other => Self::new(Ok(other)),
        }
    }
}

fn value_to_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Data(b) => parse_text(b, "i64"),
        Value::Nil => Err(RwPoolError::Nil),
        other => Err(unexpected("i64", other)),
    }
}

fn value_to_i32(value: &Value) -> Result<i32> {
    let n = value_to_i64(value)?;
    i32::try_from(n).map_err(|_| RwPoolError::Coercion(format!("{n} does not fit in i32")))
}

fn value_to_string(value: &Value) -> Result<String> {
    match value {
        Value::Data(b) => String::from_utf8(b.to_vec())
            .map_err(|_| RwPoolError::Coercion("bulk string is not valid UTF-8".into())),
        Value::Status(s) => Ok(s.clone()),
        Value::Nil => Err(RwPoolError::Nil),
        other => Err(unexpected("string", other)),
    }
}

fn parse_text<T: std::str::FromStr>(b: &[u8], what: &str) -> Result<T> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            RwPoolError::Coercion(format!(
                "cannot parse {:?} as {what}",
                String::from_utf8_lossy(b)
            ))
        })
}

fn unexpected(wanted: &str, got: &Value) -> RwPoolError {
    RwPoolError::Coercion(format!("expected {wanted}, got {}", got.type_name()))
}

// ── Tests ──────────────────────────────────────────────────────────
