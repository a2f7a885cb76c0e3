//! Byte string (bytea) conversions.
//!
//! Only the hex form (`\x` followed by hex digits) is supported; the session
//! always runs against servers with `bytea_output = 'hex'` (the default since
//! PostgreSQL 9.0).

use crate::error::{Error, Result};

use super::{FromPgText, ToPgText};

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

impl FromPgText for Vec<u8> {
    fn from_pg_text(s: &str) -> Result<Self> {
        let hex = s
            .strip_prefix("\\x")
            .ok_or_else(|| Error::conversion("Vec<u8>", s, "bytea value is not in hex form"))?;
        let hex = hex.as_bytes();
        if hex.len() % 2 != 0 {
            return Err(Error::conversion("Vec<u8>", s, "odd number of hex digits"));
        }

        let mut bytes = Vec::with_capacity(hex.len() / 2);
        for pair in hex.chunks_exact(2) {
            let hi = hex_value(pair[0]);
            let lo = hex_value(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => bytes.push(hi << 4 | lo),
                _ => return Err(Error::conversion("Vec<u8>", s, "invalid hex digit")),
            }
        }
        Ok(bytes)
    }
}

impl ToPgText for Vec<u8> {
    fn to_pg_text(&self) -> Option<String> {
        self.as_slice().to_pg_text()
    }
}

impl ToPgText for [u8] {
    fn to_pg_text(&self) -> Option<String> {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut out = String::with_capacity(2 + self.len() * 2);
        out.push_str("\\x");
        for byte in self {
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 0xf) as usize] as char);
        }
        Some(out)
    }
}
