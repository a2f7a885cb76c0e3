//! Result-set backend messages.

use zerocopy::byteorder::big_endian::U16 as U16BE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{read_cstr, read_i16, read_i32, read_u16, read_u32};
use crate::protocol::types::{FormatCode, Oid};

#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct RowDescriptionHead {
    num_fields: U16BE,
}

/// One column description within a RowDescription.
#[derive(Debug, Clone)]
pub struct FieldDescription<'a> {
    /// Column name
    pub name: &'a str,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
    /// Column attribute number (0 if not a table column)
    pub column_id: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 variable, -2 null-terminated)
    pub type_size: i16,
    /// Type modifier
    pub type_modifier: i32,
    /// Format code (0=text, 1=binary)
    pub format: FormatCode,
}

/// RowDescription message: the shape of a result set.
#[derive(Debug)]
pub struct RowDescription<'a> {
    fields: Vec<FieldDescription<'a>>,
}

impl<'a> RowDescription<'a> {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(Error::Protocol("RowDescription: truncated".into()));
        }
        let head = RowDescriptionHead::ref_from_bytes(&payload[..2])
            .map_err(|e| Error::Protocol(format!("RowDescription header: {e:?}")))?;

        let num_fields = head.num_fields.get() as usize;
        let mut fields = Vec::with_capacity(num_fields);
        let mut data = &payload[2..];

        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            let (table_oid, rest) = read_u32(rest)?;
            let (column_id, rest) = read_i16(rest)?;
            let (type_oid, rest) = read_u32(rest)?;
            let (type_size, rest) = read_i16(rest)?;
            let (type_modifier, rest) = read_i32(rest)?;
            let (format_code, rest) = read_u16(rest)?;

            fields.push(FieldDescription {
                name,
                table_oid,
                column_id,
                type_oid,
                type_size,
                type_modifier,
                format: FormatCode::from_u16(format_code),
            });

            data = rest;
        }

        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldDescription<'a>] {
        &self.fields
    }
}

#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct DataRowHead {
    num_columns: U16BE,
}

/// DataRow message: one row of a result set.
///
/// Column values are exposed as `Option<&[u8]>`; `None` is SQL NULL. In this
/// client all values are text format (UTF-8).
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    num_columns: u16,
    columns_data: &'a [u8],
}

impl<'a> DataRow<'a> {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(Error::Protocol("DataRow: truncated".into()));
        }
        let head = DataRowHead::ref_from_bytes(&payload[..2])
            .map_err(|e| Error::Protocol(format!("DataRow header: {e:?}")))?;

        Ok(Self {
            num_columns: head.num_columns.get(),
            columns_data: &payload[2..],
        })
    }

    pub fn len(&self) -> usize {
        self.num_columns as usize
    }

    pub fn is_empty(&self) -> bool {
        self.num_columns == 0
    }

    /// Iterate column values; each item is `Option<&[u8]>` (`None` = NULL).
    pub fn iter(&self) -> DataRowIter<'a> {
        DataRowIter {
            remaining: self.columns_data,
            columns_left: self.num_columns,
        }
    }
}

/// Iterator over column values in a DataRow.
#[derive(Debug, Clone)]
pub struct DataRowIter<'a> {
    remaining: &'a [u8],
    columns_left: u16,
}

impl<'a> Iterator for DataRowIter<'a> {
    type Item = Result<Option<&'a [u8]>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.columns_left == 0 {
            return None;
        }
        self.columns_left -= 1;

        let (len, rest) = match read_i32(self.remaining) {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };
        self.remaining = rest;

        if len == -1 {
            return Some(Ok(None));
        }

        let len = len as usize;
        if self.remaining.len() < len {
            return Some(Err(Error::Protocol("DataRow: truncated column".into())));
        }
        let value = &self.remaining[..len];
        self.remaining = &self.remaining[len..];
        Some(Ok(Some(value)))
    }
}

/// CommandComplete message with its command tag.
#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    /// Command tag, e.g. "SELECT 5", "INSERT 0 1", "UPDATE 10"
    pub tag: &'a str,
}

impl<'a> CommandComplete<'a> {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (tag, _) = read_cstr(payload)?;
        Ok(Self { tag })
    }

    /// Number of rows affected, parsed from the tag.
    ///
    /// `Some` for SELECT/INSERT/UPDATE/DELETE/FETCH/MOVE/COPY tags, `None`
    /// otherwise (e.g. "CREATE TABLE", "BEGIN").
    pub fn rows_affected(&self) -> Option<u64> {
        let mut parts = self.tag.split_whitespace();
        let command = parts.next()?;
        let rest: Vec<&str> = parts.collect();

        match (command, rest.as_slice()) {
            ("SELECT", [count])
            | ("UPDATE", [count])
            | ("DELETE", [count])
            | ("FETCH", [count])
            | ("MOVE", [count])
            | ("COPY", [count]) => count.parse().ok(),
            // INSERT tag is "INSERT <oid> <rows>"
            ("INSERT", [_oid, count]) => count.parse().ok(),
            _ => None,
        }
    }
}
