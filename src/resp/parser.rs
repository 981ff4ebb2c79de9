//! Streaming RESP2 parser.
//!
//! [`parse`] takes a byte buffer and returns `Ok((Value, bytes_consumed))`,
//! `Err(Incomplete)` when more data is needed, or `Err(Protocol(…))` on
//! malformed input. Bulk strings are sliced out of the `Bytes` buffer
//! without copying.

use bytes::Bytes;
use memchr::memchr;

use crate::error::{Result, RwPoolError};
use crate::resp::types::Value;

/// Upper bound on the element count of one array header.
///
/// Stops a hostile `*2147483647\r\n` from reserving gigabytes up front.
const MAX_ELEMENTS: usize = 16_777_216;

/// Maximum nesting depth for arrays.
const MAX_DEPTH: usize = 512;

/// Parse one RESP value from the front of `buf`.
pub fn parse(buf: &Bytes) -> Result<(Value, usize)> {
    parse_at(buf, 0, 0)
}

/// Convenience wrapper: parse from a byte slice (copies into `Bytes` first).
pub fn parse_slice(buf: &[u8]) -> Result<(Value, usize)> {
    parse(&Bytes::copy_from_slice(buf))
}

fn parse_at(buf: &Bytes, pos: usize, depth: usize) -> Result<(Value, usize)> {
    if depth > MAX_DEPTH {
        return Err(RwPoolError::Protocol(format!(
            "RESP nesting deeper than {MAX_DEPTH}"
        )));
    }
    let Some(&tag) = buf.get(pos) else {
        return Err(RwPoolError::Incomplete);
    };

    match tag {
        b'+' => {
            let (line, next) = read_line(buf, pos + 1)?;
            Ok((Value::Status(utf8(line)?.to_string()), next))
        }
        b'-' => {
            let (line, next) = read_line(buf, pos + 1)?;
            Ok((Value::Error(utf8(line)?.to_string()), next))
        }
        b':' => {
            let (line, next) = read_line(buf, pos + 1)?;
            Ok((Value::Int(parse_int(line)?), next))
        }
        b'$' => parse_bulk(buf, pos),
        b'*' => parse_array(buf, pos, depth),
        b'_' => {
            let (line, next) = read_line(buf, pos + 1)?;
            if !line.is_empty() {
                return Err(RwPoolError::Protocol("malformed null".into()));
            }
            Ok((Value::Nil, next))
        }
        other => Err(RwPoolError::Protocol(format!(
            "unknown RESP type byte: 0x{other:02x}"
        ))),
    }
}

fn parse_bulk(buf: &Bytes, pos: usize) -> Result<(Value, usize)> {
    let (line, next) = read_line(buf, pos + 1)?;
    let len = parse_int(line)?;
    if len < 0 {
        return Ok((Value::Nil, next));
    }
    let len = len as usize;
    let end = next + len;
    if buf.len() < end + 2 {
        return Err(RwPoolError::Incomplete);
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Err(RwPoolError::Protocol("bulk string missing CRLF".into()));
    }
    Ok((Value::Data(buf.slice(next..end)), end + 2))
}

fn parse_array(buf: &Bytes, pos: usize, depth: usize) -> Result<(Value, usize)> {
    let (line, mut next) = read_line(buf, pos + 1)?;
    let count = parse_int(line)?;
    if count < 0 {
        return Ok((Value::Nil, next));
    }
    let count = count as usize;
    if count > MAX_ELEMENTS {
        return Err(RwPoolError::Protocol(format!(
            "array of {count} elements exceeds limit"
        )));
    }
    // Reserve conservatively: every element takes at least 3 bytes.
    let mut items = Vec::with_capacity(count.min((buf.len() - next) / 3 + 1));
    for _ in 0..count {
        let (item, end) = parse_at(buf, next, depth + 1)?;
        items.push(item);
        next = end;
    }
    Ok((Value::Array(items), next))
}

// ── Helpers ────────────────────────────────────────────────────────

/// Return the line starting at `offset` (without CRLF) and the index after it.
fn read_line(buf: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    let rest = buf.get(offset..).ok_or(RwPoolError::Incomplete)?;
    let cr = memchr(b'\r', rest).ok_or(RwPoolError::Incomplete)?;
    match rest.get(cr + 1) {
        None => Err(RwPoolError::Incomplete),
        Some(b'\n') => Ok((&rest[..cr], offset + cr + 2)),
        Some(_) => Err(RwPoolError::Protocol("expected LF after CR".into())),
    }
}

fn parse_int(line: &[u8]) -> Result<i64> {
    utf8(line)?
        .parse::<i64>()
        .map_err(|_| RwPoolError::Protocol(format!("invalid integer: {:?}", String::from_utf8_lossy(line))))
}

fn utf8(line: &[u8]) -> Result<&str> {
    std::str::from_utf8(line).map_err(|_| RwPoolError::Protocol("invalid UTF-8 in line".into()))
}

// ── Tests ──────────────────────────────────────────────────────────
