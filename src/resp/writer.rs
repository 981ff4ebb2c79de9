//! RESP command serializer.
//!
//! Encodes commands into the RESP bulk string array wire format:
//! `*<N>\r\n$<len>\r\narg1\r\n$<len>\r\narg2\r\n…`

use itoa::Buffer;

use crate::command::Command;

/// Append one command (verb + arguments) to `buf`.
pub fn encode_command_into(buf: &mut Vec<u8>, cmd: &Command) {
    let mut itoa_buf = Buffer::new();
    let args = cmd.args_slice();

    let mut cap = 1 + 10 + 2 + 1 + 10 + 2 + cmd.verb().len() + 2;
    for arg in args {
        cap += 1 + 10 + 2 + arg.len() + 2;
    }
    buf.reserve(cap);

    // *<N>\r\n
    buf.push(b'*');
    buf.extend_from_slice(itoa_buf.format(args.len() + 1).as_bytes());
    buf.extend_from_slice(b"\r\n");

    write_bulk(buf, &mut itoa_buf, cmd.verb().as_bytes());
    for arg in args {
        write_bulk(buf, &mut itoa_buf, arg);
    }
}

/// Encode one command into a fresh buffer.
pub fn encode_command(cmd: &Command) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_command_into(&mut buf, cmd);
    buf
}

/// $<len>\r\n<data>\r\n
#[inline]
fn write_bulk(buf: &mut Vec<u8>, itoa_buf: &mut Buffer, data: &[u8]) {
    buf.push(b'$');
    buf.extend_from_slice(itoa_buf.format(data.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

// ── Tests ──────────────────────────────────────────────────────────
