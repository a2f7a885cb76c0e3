//! Prepared statements and lazy cursors.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::backend::msg_type;
use crate::protocol::types::{FormatCode, Oid};
use crate::row::Row;

/// Metadata for one result column, from RowDescription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub table_oid: Oid,
    pub column_id: i16,
    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: FormatCode,
}

/// A server-side prepared statement.
///
/// The handle does not own its connection; every operation goes through
/// `Connection` methods, which verify at run time that the statement is open
/// and belongs to that connection. The server-side name is unique within the
/// session.
#[derive(Debug)]
pub struct Statement {
    name: String,
    sql: String,
    connection_id: u64,
    param_oids: Vec<Oid>,
    columns: Option<Vec<ColumnMetadata>>,
    closed: bool,
}

impl Statement {
    pub(crate) fn new(
        name: String,
        sql: String,
        connection_id: u64,
        param_oids: Vec<Oid>,
        columns: Option<Vec<ColumnMetadata>>,
    ) -> Self {
        Self {
            name,
            sql,
            connection_id,
            param_oids,
            columns,
            closed: false,
        }
    }

    /// The server-side statement name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter type OIDs from Describe.
    pub fn parameter_oids(&self) -> &[Oid] {
        &self.param_oids
    }

    /// Result column metadata from Describe; `None` for statements that
    /// return no rows.
    pub fn columns(&self) -> Option<&[ColumnMetadata]> {
        self.columns.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    /// Rows are still arriving from the wire.
    Streaming,
    /// CommandComplete or EmptyQueryResponse was consumed.
    Drained,
    /// Released by the caller or torn down after a failure.
    Closed,
}

/// Lazy iterator over the rows of one executed portal.
///
/// The cursor borrows the connection mutably while open, so only one portal
/// can be active at a time. Rows are read from the wire one at a time, on
/// demand. Dropping an unfinished cursor discards the remaining rows and
/// closes the portal.
pub struct Cursor<'conn> {
    conn: &'conn mut Connection,
    state: CursorState,
    columns: Option<Vec<ColumnMetadata>>,
    row_count: Option<u64>,
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("state", &self.state)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl<'conn> Cursor<'conn> {
    pub(crate) fn new(conn: &'conn mut Connection, columns: Option<Vec<ColumnMetadata>>) -> Self {
        Self {
            conn,
            state: CursorState::Streaming,
            columns,
            row_count: None,
        }
    }

    /// Column metadata, present only when requested at execute time.
    pub fn columns(&self) -> Option<&[ColumnMetadata]> {
        self.columns.as_deref()
    }

    /// Rows affected or returned; known only after the result set has been
    /// fully consumed (from the CommandComplete tag).
    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    pub fn is_drained(&self) -> bool {
        self.state != CursorState::Streaming
    }

    /// Fetch the next row; `None` once the result set is exhausted.
    ///
    /// A server error mid-stream is returned exactly once; the session is
    /// resynchronized and subsequent calls return `None`.
    pub fn next_row(&mut self) -> Option<Result<Row>> {
        if self.state != CursorState::Streaming {
            return None;
        }

        let tag = match self.conn.next_message() {
            Ok(tag) => tag,
            Err(e) => {
                self.state = CursorState::Closed;
                return Some(Err(e));
            }
        };

        match tag {
            msg_type::DATA_ROW => match self.conn.current_data_row() {
                Ok(row) => Some(Ok(row)),
                Err(e) => {
                    self.conn.mark_broken();
                    self.state = CursorState::Closed;
                    Some(Err(e))
                }
            },
            msg_type::COMMAND_COMPLETE => {
                match self.conn.current_command_rows() {
                    Ok(rows) => self.row_count = rows,
                    Err(e) => {
                        self.conn.mark_broken();
                        self.state = CursorState::Closed;
                        return Some(Err(e));
                    }
                }
                self.finish_stream()
            }
            msg_type::EMPTY_QUERY_RESPONSE | msg_type::PORTAL_SUSPENDED => self.finish_stream(),
            msg_type::ERROR_RESPONSE => {
                let err = match self.conn.take_server_error() {
                    Ok(err) => err,
                    Err(e) => {
                        self.state = CursorState::Closed;
                        return Some(Err(e));
                    }
                };
                self.conn.recover_after_error(&err);
                self.state = CursorState::Drained;
                Some(Err(err))
            }
            other => {
                self.conn.mark_broken();
                self.state = CursorState::Closed;
                Some(Err(Error::Protocol(format!(
                    "unexpected message in result stream: '{}'",
                    other as char
                ))))
            }
        }
    }

    /// Consume ReadyForQuery after the terminal result message.
    fn finish_stream(&mut self) -> Option<Result<Row>> {
        match self.conn.expect_ready() {
            Ok(()) => {
                self.state = CursorState::Drained;
                None
            }
            Err(e) => {
                self.state = CursorState::Closed;
                Some(Err(e))
            }
        }
    }

    /// Release the cursor; remaining rows are discarded and the portal is
    /// closed. Closing a drained cursor is a no-op.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.state != CursorState::Streaming {
            self.state = CursorState::Closed;
            return Ok(());
        }
        self.state = CursorState::Closed;
        self.conn.drain_to_ready()?;
        self.conn.close_portal_now("")
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row()
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if self.state == CursorState::Streaming {
            let _ = self.finish();
        }
    }
}
