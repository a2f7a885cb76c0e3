//! Wire encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers and
//! NUL-terminated UTF-8 for strings.

use crate::error::{Error, Result};

/// Read a 2-byte big-endian signed integer.
#[inline]
pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    let (head, rest) = split(data, 2, "i16")?;
    Ok((i16::from_be_bytes([head[0], head[1]]), rest))
}

/// Read a 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    let (head, rest) = split(data, 2, "u16")?;
    Ok((u16::from_be_bytes([head[0], head[1]]), rest))
}

/// Read a 4-byte big-endian signed integer.
#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    let (head, rest) = split(data, 4, "i32")?;
    Ok((i32::from_be_bytes([head[0], head[1], head[2], head[3]]), rest))
}

/// Read a 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    let (head, rest) = split(data, 4, "u32")?;
    Ok((u32::from_be_bytes([head[0], head[1], head[2], head[3]]), rest))
}

#[inline]
fn split<'a>(data: &'a [u8], len: usize, what: &str) -> Result<(&'a [u8], &'a [u8])> {
    if data.len() < len {
        return Err(Error::Protocol(format!(
            "truncated {}: {} < {}",
            what,
            data.len(),
            len
        )));
    }
    Ok(data.split_at(len))
}

/// Read a NUL-terminated string as raw bytes (without the terminator).
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(Error::Protocol("unterminated string".into())),
    }
}

/// Read a NUL-terminated string as `&str`, validating UTF-8.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::compat::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("invalid UTF-8 in string: {}", e)))?;
    Ok((s, rest))
}

/// Message builder that backpatches the length field.
///
/// PostgreSQL message format:
/// - type byte (1 byte), not included in the length
/// - length (4 bytes), includes itself
/// - payload (length - 4 bytes)
///
/// The startup, SSL-request and cancel-request messages omit the type byte.
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        Self::new_untagged(buf)
    }

    /// Start a message without a type byte (startup family).
    pub fn new_untagged(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_cstr(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Fill in the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as i32;
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_integers() {
        let data = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(read_i16(&data).unwrap().0, 0x0102);
        assert_eq!(read_u16(&data).unwrap().0, 0x0102);
        assert_eq!(read_i32(&data).unwrap().0, 0x0102_0304);
        assert_eq!(read_u32(&data).unwrap().0, 0x0102_0304);
        assert!(read_i32(&data[..3]).is_err());
    }

    #[test]
    fn read_strings() {
        let data = b"hello\0rest";
        let (s, rest) = read_cstr(data).unwrap();
        assert_eq!(s, "hello");
        assert_eq!(rest, b"rest");
        assert!(read_cstr(b"no terminator").is_err());
        assert!(read_cstr(b"\xff\xfe\0").is_err());
    }

    #[test]
    fn builder_backpatches_length() {
        let mut buf = Vec::new();
        let mut msg = MessageBuilder::new(&mut buf, b'T');
        msg.write_cstr("col");
        msg.write_i32(-1);
        msg.finish();

        assert_eq!(buf[0], b'T');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);
    }

    #[test]
    fn untagged_builder() {
        let mut buf = Vec::new();
        let mut msg = MessageBuilder::new_untagged(&mut buf);
        msg.write_i32(196608);
        msg.finish();

        let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(len as usize, buf.len());
    }
}
