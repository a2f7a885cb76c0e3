//! Error and notice response messages.

use crate::error::{Result, ServerError};
use crate::protocol::codec::read_cstr;

/// Parse the field list shared by ErrorResponse and NoticeResponse.
///
/// The payload is a sequence of `field_code(1) | value cstring` entries
/// terminated by a zero byte. Unrecognized field codes are skipped.
pub fn parse_error_fields(payload: &[u8]) -> Result<ServerError> {
    let mut fields = ServerError::default();
    let mut data = payload;

    while !data.is_empty() && data[0] != 0 {
        let code = data[0];
        let (value, rest) = read_cstr(&data[1..])?;
        data = rest;

        match code {
            b'S' => fields.severity = Some(value.to_string()),
            b'V' => fields.severity_non_localized = Some(value.to_string()),
            b'C' => fields.code = Some(value.to_string()),
            b'M' => fields.message = Some(value.to_string()),
            b'D' => fields.detail = Some(value.to_string()),
            b'H' => fields.hint = Some(value.to_string()),
            b'P' => fields.position = value.parse().ok(),
            b'p' => fields.internal_position = value.parse().ok(),
            b'q' => fields.internal_query = Some(value.to_string()),
            b'W' => fields.where_ = Some(value.to_string()),
            b's' => fields.schema = Some(value.to_string()),
            b't' => fields.table = Some(value.to_string()),
            b'c' => fields.column = Some(value.to_string()),
            b'd' => fields.data_type = Some(value.to_string()),
            b'n' => fields.constraint = Some(value.to_string()),
            b'F' => fields.file = Some(value.to_string()),
            b'L' => fields.line = value.parse().ok(),
            b'R' => fields.routine = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(fields)
}

/// ErrorResponse message.
#[derive(Debug, Clone)]
pub struct ErrorResponse(pub ServerError);

impl ErrorResponse {
    /// Parse an ErrorResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self(parse_error_fields(payload)?))
    }

    pub fn into_error(self) -> crate::error::Error {
        crate::error::Error::Server(self.0)
    }
}

/// NoticeResponse message (non-fatal warning/info from the server).
#[derive(Debug, Clone)]
pub struct NoticeResponse(pub ServerError);

impl NoticeResponse {
    /// Parse a NoticeResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self(parse_error_fields(payload)?))
    }
}
