//! # RESP2 Framing
//!
//! Purpose: parse incoming command arrays off a buffered TCP stream and
//! encode RESP2 replies, without external dependencies.
//!
//! Reads a `*N\r\n$len\r\n bytes\r\n ...` command array off the wire and
//! encodes simple/error/integer/bulk/array replies back onto it.

use std::io::{BufRead, Write};

/// Framing or encoding failure. Any occurrence means the connection is no
/// longer usable and must be closed.
#[derive(Debug)]
pub struct ProtocolError;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Reads one command: a RESP2 array of bulk strings. Returns `Ok(None)` on
/// a clean EOF between commands (no bytes read for the next frame).
pub fn read_command<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
) -> ProtocolResult<Option<Vec<Vec<u8>>>> {
    if !read_line(reader, line_buf)? {
        return Ok(None);
    }
    if line_buf.is_empty() || line_buf[0] != b'*' {
        return Err(ProtocolError);
    }

    let count = parse_usize(&line_buf[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        args.push(read_bulk(reader, line_buf)?);
    }
    Ok(Some(args))
}

fn read_bulk<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ProtocolResult<Vec<u8>> {
    if !read_line(reader, line_buf)? {
        return Err(ProtocolError);
    }
    if line_buf.is_empty() || line_buf[0] != b'$' {
        return Err(ProtocolError);
    }
    let len = parse_usize(&line_buf[1..])?;

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).map_err(|_| ProtocolError)?;
    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf).map_err(|_| ProtocolError)?;
    if crlf != [b'\r', b'\n'] {
        return Err(ProtocolError);
    }
    Ok(data)
}

/// Reads one CRLF-terminated line into `buf`, stripping the CRLF. Returns
/// `false` if the stream hit EOF with no bytes read (a clean disconnect
/// between commands); any other short read is a protocol error.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ProtocolResult<bool> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf).map_err(|_| ProtocolError)?;
    if bytes == 0 {
        return Ok(false);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ProtocolError);
    }
    buf.truncate(buf.len() - 2);
    Ok(true)
}

fn parse_usize(data: &[u8]) -> ProtocolResult<usize> {
    if data.is_empty() {
        return Err(ProtocolError);
    }
    let mut value: usize = 0;
    for &b in data {
        if !b.is_ascii_digit() {
            return Err(ProtocolError);
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as usize))
            .ok_or(ProtocolError)?;
    }
    Ok(value)
}

/// Writes a `+OK`-style simple string reply.
pub fn write_simple<W: Write>(writer: &mut W, message: &str) -> std::io::Result<()> {
    writer.write_all(b"+")?;
    writer.write_all(message.as_bytes())?;
    writer.write_all(b"\r\n")
}

/// Writes a `-ERR ...` error reply.
pub fn write_error<W: Write>(writer: &mut W, message: &str) -> std::io::Result<()> {
    writer.write_all(b"-ERR ")?;
    writer.write_all(message.as_bytes())?;
    writer.write_all(b"\r\n")
}

/// Writes a `:N` integer reply.
pub fn write_integer<W: Write>(writer: &mut W, value: i64) -> std::io::Result<()> {
    writer.write_all(b":")?;
    writer.write_all(value.to_string().as_bytes())?;
    writer.write_all(b"\r\n")
}

/// Writes a `$len\r\ndata\r\n` bulk reply.
pub fn write_bulk<W: Write>(writer: &mut W, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(b"$")?;
    writer.write_all(data.len().to_string().as_bytes())?;
    writer.write_all(b"\r\n")?;
    writer.write_all(data)?;
    writer.write_all(b"\r\n")
}

/// Writes a `$-1\r\n` null bulk reply.
pub fn write_null<W: Write>(writer: &mut W) -> std::io::Result<()> {
    writer.write_all(b"$-1\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_a_two_arg_command() {
        let mut reader = Cursor::new(b"*2\r\n$4\r\nREAD\r\n$3\r\nfoo\r\n".to_vec());
        let mut line = Vec::new();
        let args = read_command(&mut reader, &mut line).unwrap().unwrap();
        assert_eq!(args, vec![b"READ".to_vec(), b"foo".to_vec()]);
    }

    #[test]
    fn clean_eof_between_commands_returns_none() {
        let mut reader = Cursor::new(Vec::new());
        let mut line = Vec::new();
        assert!(read_command(&mut reader, &mut line).unwrap().is_none());
    }

    #[test]
    fn malformed_array_header_is_protocol_error() {
        let mut reader = Cursor::new(b"not-an-array\r\n".to_vec());
        let mut line = Vec::new();
        assert!(read_command(&mut reader, &mut line).is_err());
    }

    #[test]
    fn encodes_bulk_and_null() {
        let mut buf = Vec::new();
        write_bulk(&mut buf, b"hi").unwrap();
        assert_eq!(buf, b"$2\r\nhi\r\n");

        let mut buf = Vec::new();
        write_null(&mut buf).unwrap();
        assert_eq!(buf, b"$-1\r\n");
    }
}
