//! Startup and authentication backend messages.

use zerocopy::byteorder::big_endian::U32 as U32BE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{read_cstr, read_i32};
use crate::protocol::types::TransactionStatus;

/// Authentication request codes.
pub mod auth_code {
    pub const OK: i32 = 0;
    pub const KERBEROS_V5: i32 = 2;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const GSS: i32 = 7;
    pub const SSPI: i32 = 9;
    pub const SASL: i32 = 10;
    pub const SASL_CONTINUE: i32 = 11;
    pub const SASL_FINAL: i32 = 12;
}

/// Authentication message from the server.
#[derive(Debug)]
pub enum AuthenticationMessage<'a> {
    /// Authentication successful
    Ok,
    /// Cleartext password requested
    CleartextPassword,
    /// MD5 password requested (with 4-byte salt)
    Md5Password { salt: [u8; 4] },
    /// SASL authentication requested (with advertised mechanisms)
    Sasl { mechanisms: Vec<&'a str> },
    /// SASL continue (server-first-message)
    SaslContinue { data: &'a [u8] },
    /// SASL final (server-final-message)
    SaslFinal { data: &'a [u8] },
    /// A method this client does not implement (Kerberos, GSS, SSPI)
    Unsupported { name: &'static str },
}

impl<'a> AuthenticationMessage<'a> {
    /// Parse an Authentication message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (code, rest) = read_i32(payload)?;

        match code {
            auth_code::OK => Ok(AuthenticationMessage::Ok),
            auth_code::CLEARTEXT_PASSWORD => Ok(AuthenticationMessage::CleartextPassword),
            auth_code::MD5_PASSWORD => {
                let salt: [u8; 4] = rest
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| Error::Protocol("MD5 authentication: missing salt".into()))?;
                Ok(AuthenticationMessage::Md5Password { salt })
            }
            auth_code::SASL => {
                let mut mechanisms = Vec::new();
                let mut data = rest;
                while !data.is_empty() && data[0] != 0 {
                    let (mechanism, remaining) = read_cstr(data)?;
                    mechanisms.push(mechanism);
                    data = remaining;
                }
                Ok(AuthenticationMessage::Sasl { mechanisms })
            }
            auth_code::SASL_CONTINUE => Ok(AuthenticationMessage::SaslContinue { data: rest }),
            auth_code::SASL_FINAL => Ok(AuthenticationMessage::SaslFinal { data: rest }),
            auth_code::KERBEROS_V5 => Ok(AuthenticationMessage::Unsupported {
                name: "Kerberos V5",
            }),
            auth_code::GSS => Ok(AuthenticationMessage::Unsupported { name: "GSSAPI" }),
            auth_code::SSPI => Ok(AuthenticationMessage::Unsupported { name: "SSPI" }),
            _ => Err(Error::Protocol(format!(
                "unknown authentication request code: {}",
                code
            ))),
        }
    }
}

/// BackendKeyData message: process id and secret key for CancelRequest.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct BackendKeyData {
    pid: U32BE,
    secret_key: U32BE,
}

impl BackendKeyData {
    /// Parse a BackendKeyData message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(payload)
            .map_err(|e| Error::Protocol(format!("BackendKeyData: {e:?}")))
    }

    pub fn process_id(&self) -> u32 {
        self.pid.get()
    }

    pub fn secret(&self) -> u32 {
        self.secret_key.get()
    }
}

/// ParameterStatus message: a server parameter name/value pair.
#[derive(Debug, Clone)]
pub struct ParameterStatus<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> ParameterStatus<'a> {
    /// Parse a ParameterStatus message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (name, rest) = read_cstr(payload)?;
        let (value, _) = read_cstr(rest)?;
        Ok(Self { name, value })
    }
}

/// ReadyForQuery message: the synchronization barrier.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct ReadyForQuery {
    status: u8,
}

impl ReadyForQuery {
    /// Parse a ReadyForQuery message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(payload)
            .map_err(|e| Error::Protocol(format!("ReadyForQuery: {e:?}")))
    }

    pub fn transaction_status(&self) -> Result<TransactionStatus> {
        TransactionStatus::from_byte(self.status).ok_or_else(|| {
            Error::Protocol(format!(
                "unknown transaction status: '{}'",
                self.status as char
            ))
        })
    }
}
