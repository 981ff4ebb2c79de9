use bytes::Bytes;

/// A decoded RESP2 reply.
///
/// Top-level error replies are turned into `Err(RwPoolError::Redis)` by the
/// connection; `Error` only shows up nested inside arrays (e.g. one failed
/// command in an `EXEC` result).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// $-1\r\n  or  *-1\r\n  (or RESP3 _\r\n)
    Nil,
    /// :1000\r\n
    Int(i64),
    /// $6\r\nfoobar\r\n
    Data(Bytes),
    /// +OK\r\n
    Status(String),
    /// -ERR message\r\n
    Error(String),
    /// *2\r\n…
    Array(Vec<Value>),
}

impl Value {
    /// Bulk data from anything byte-like.
    pub fn data(b: impl Into<Bytes>) -> Self {
        Self::Data(b.into())
    }

    pub fn status(s: impl Into<String>) -> Self {
        Self::Status(s.into())
    }

    /// Returns true when this value represents null / nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// True for the `+OK` status reply.
    pub fn is_ok_status(&self) -> bool {
        matches!(self, Self::Status(s) if s == "OK")
    }

    /// Returns the type name as a static string (useful for error messages).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Int(_) => "integer",
            Self::Data(_) => "bulk_string",
            Self::Status(_) => "simple_string",
            Self::Error(_) => "error",
            Self::Array(_) => "array",
        }
    }
}
