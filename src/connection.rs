//! The blocking PostgreSQL session.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logger::{default_logger, LogLevel, LogRecord, Logger};
use crate::protocol::backend::{
    msg_type, CommandComplete, DataRow, ErrorResponse, NoticeResponse, ParameterDescription,
    ParameterStatus, ReadyForQuery, RowDescription,
};
use crate::protocol::frontend::{
    write_bind, write_close_portal, write_close_statement, write_describe_portal,
    write_describe_statement, write_execute, write_parse, write_query, write_sync, write_terminate,
};
use crate::protocol::types::TransactionStatus;
use crate::row::Row;
use crate::state::{StartupFlow, Step};
use crate::statement::{ColumnMetadata, Cursor, Statement};
use crate::transport::{TlsTransport, Transport};
use crate::types::Params;

/// The Bind message carries parameter counts as 16-bit integers.
const MAX_BIND_PARAMETERS: usize = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Ready,
    /// A transport or protocol failure left the session out of sync.
    Broken,
    Closed,
}

/// A single long-lived session with a PostgreSQL backend.
///
/// The connection is strictly synchronous: every operation blocks until its
/// response has been received. It is not shareable across threads; statements
/// and cursors derived from it must be used on the owning thread.
///
/// Between any two statement operations exactly one ReadyForQuery has been
/// consumed per Sync sent, so the session is always at a well-defined
/// synchronization point when control returns to the caller.
pub struct Connection {
    transport: Box<dyn Transport>,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    backend_pid: Option<u32>,
    backend_secret: Option<u32>,
    parameters: HashMap<String, String>,
    transaction_status: TransactionStatus,
    statement_counter: u64,
    connection_id: u64,
    logger: Arc<dyn Logger>,
    state: SessionState,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("backend_pid", &self.backend_pid)
            .field("transaction_status", &self.transaction_status)
            .field("connection_id", &self.connection_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a TLS session and authenticate.
    pub fn connect(config: &Config) -> Result<Self> {
        Self::connect_with_logger(config, default_logger())
    }

    /// Open a TLS session with an explicit logging sink.
    pub fn connect_with_logger(config: &Config, logger: Arc<dyn Logger>) -> Result<Self> {
        let transport = TlsTransport::connect(config)?;
        Self::with_transport(Box::new(transport), config, logger)
    }

    /// Run startup and authentication over an already-connected transport.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        config: &Config,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        let mut conn = Self {
            transport,
            read_buf: Vec::with_capacity(8192),
            write_buf: Vec::with_capacity(8192),
            backend_pid: None,
            backend_secret: None,
            parameters: HashMap::new(),
            transaction_status: TransactionStatus::Idle,
            statement_counter: 0,
            connection_id: rand::random(),
            logger,
            state: SessionState::Ready,
        };

        if let Err(e) = conn.startup(config) {
            conn.state = SessionState::Broken;
            return Err(e);
        }
        conn.configure_session()?;

        conn.logger.log(&LogRecord::new(
            LogLevel::Debug,
            format!(
                "session established for {}@{} (backend pid {})",
                config.user,
                config.database,
                conn.backend_pid.unwrap_or(0)
            ),
        ));
        Ok(conn)
    }

    fn startup(&mut self, config: &Config) -> Result<()> {
        let fingerprint = self.transport.channel_binding_fingerprint();
        let mut flow = StartupFlow::new(config.clone(), fingerprint, self.logger.clone());

        flow.start();
        self.send_raw(flow.reply())?;

        loop {
            let tag = self.next_message()?;
            match flow.step(tag, &self.read_buf)? {
                Step::Reply => self.send_raw(flow.reply())?,
                Step::Continue => {}
                Step::Done => break,
            }
        }

        if let Some((pid, secret)) = flow.backend_key() {
            self.backend_pid = Some(pid);
            self.backend_secret = Some(secret);
        }
        self.transaction_status = flow.transaction_status();
        Ok(())
    }

    /// Pin the session to the text formats the type codec expects.
    fn configure_session(&mut self) -> Result<()> {
        self.batch_execute("SET DateStyle = 'ISO, MDY'; SET TimeZone = 'UTC'")?;
        Ok(())
    }

    // === accessors ===

    /// Backend process id from BackendKeyData (for CancelRequest).
    pub fn backend_pid(&self) -> Option<u32> {
        self.backend_pid
    }

    /// Backend secret key from BackendKeyData (for CancelRequest).
    pub fn backend_secret_key(&self) -> Option<u32> {
        self.backend_secret
    }

    /// The latest value of one server parameter.
    pub fn parameter_status(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// All ParameterStatus values received so far.
    pub fn parameter_statuses(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_status.in_transaction()
    }

    /// True once a transport or protocol failure has poisoned the session.
    pub fn is_broken(&self) -> bool {
        self.state == SessionState::Broken
    }

    // === statements ===

    /// Prepare a statement: Parse + Describe(statement) + Sync.
    ///
    /// Captures the parameter OIDs and, for row-returning statements, the
    /// column metadata. On a server error the session is resynchronized and
    /// remains usable.
    pub fn prepare(&mut self, sql: &str) -> Result<Statement> {
        self.ensure_ready()?;

        let name = format!("stmt_{}", self.statement_counter);
        self.statement_counter += 1;

        self.write_buf.clear();
        write_parse(&mut self.write_buf, &name, sql, &[]);
        write_describe_statement(&mut self.write_buf, &name);
        write_sync(&mut self.write_buf);
        self.flush_write()?;

        self.expect(msg_type::PARSE_COMPLETE, "ParseComplete")?;

        self.expect(msg_type::PARAMETER_DESCRIPTION, "ParameterDescription")?;
        let param_oids = match ParameterDescription::parse(&self.read_buf) {
            Ok(desc) => desc.oids().to_vec(),
            Err(e) => return Err(self.broken(e)),
        };

        let tag = self.read_response()?;
        let columns = match tag {
            msg_type::ROW_DESCRIPTION => match self.current_row_description() {
                Ok(cols) => Some(cols),
                Err(e) => return Err(self.broken(e)),
            },
            msg_type::NO_DATA => None,
            other => return Err(self.protocol_unexpected("RowDescription or NoData", other)),
        };

        self.expect_ready()?;

        Ok(Statement::new(
            name,
            sql.to_string(),
            self.connection_id,
            param_oids,
            columns,
        ))
    }

    /// Execute a prepared statement: Bind + Execute(0) + Sync.
    ///
    /// Returns a lazy [`Cursor`]; rows are read from the wire only as the
    /// caller requests them. The cursor borrows the connection, so it must be
    /// drained or closed before the next operation.
    pub fn execute<'c, P: Params>(
        &'c mut self,
        statement: &Statement,
        params: &P,
    ) -> Result<Cursor<'c>> {
        self.execute_inner(statement, params, false)
    }

    /// Like [`Connection::execute`], with Describe(portal) so the cursor
    /// carries column metadata.
    pub fn execute_with_metadata<'c, P: Params>(
        &'c mut self,
        statement: &Statement,
        params: &P,
    ) -> Result<Cursor<'c>> {
        self.execute_inner(statement, params, true)
    }

    fn execute_inner<'c, P: Params>(
        &'c mut self,
        statement: &Statement,
        params: &P,
        with_metadata: bool,
    ) -> Result<Cursor<'c>> {
        self.ensure_ready()?;
        self.check_statement(statement)?;

        let count = params.count();
        if count > MAX_BIND_PARAMETERS {
            return Err(Error::TooManyParameters(count));
        }

        self.write_buf.clear();
        write_bind(&mut self.write_buf, "", statement.name(), params);
        if with_metadata {
            write_describe_portal(&mut self.write_buf, "");
        }
        write_execute(&mut self.write_buf, "", 0);
        write_sync(&mut self.write_buf);
        self.flush_write()?;

        self.expect(msg_type::BIND_COMPLETE, "BindComplete")?;

        let columns = if with_metadata {
            let tag = self.read_response()?;
            match tag {
                msg_type::ROW_DESCRIPTION => match self.current_row_description() {
                    Ok(cols) => Some(cols),
                    Err(e) => return Err(self.broken(e)),
                },
                msg_type::NO_DATA => None,
                other => return Err(self.protocol_unexpected("RowDescription or NoData", other)),
            }
        } else {
            None
        };

        Ok(Cursor::new(self, columns))
    }

    /// Close a prepared statement: Close(statement) + Sync.
    ///
    /// Closing an already-closed statement is a no-op.
    pub fn close_statement(&mut self, statement: &mut Statement) -> Result<()> {
        if statement.is_closed() {
            return Ok(());
        }
        if statement.connection_id() != self.connection_id {
            return Err(Error::StatementClosed);
        }
        statement.mark_closed();

        // the server frees everything when the session ends
        if self.state != SessionState::Ready {
            return Ok(());
        }

        self.write_buf.clear();
        write_close_statement(&mut self.write_buf, statement.name());
        write_sync(&mut self.write_buf);
        self.flush_write()?;

        self.expect(msg_type::CLOSE_COMPLETE, "CloseComplete")?;
        self.expect_ready()
    }

    /// Run SQL through the simple query protocol and discard any rows.
    ///
    /// Returns the rows-affected count from the last command tag, when the
    /// tag carries one.
    pub fn batch_execute(&mut self, sql: &str) -> Result<Option<u64>> {
        self.ensure_ready()?;

        self.write_buf.clear();
        write_query(&mut self.write_buf, sql);
        self.flush_write()?;

        let mut rows_affected = None;
        let mut failure: Option<Error> = None;
        loop {
            let tag = self.next_message()?;
            match tag {
                msg_type::COMMAND_COMPLETE => {
                    rows_affected = match CommandComplete::parse(&self.read_buf) {
                        Ok(complete) => complete.rows_affected(),
                        Err(e) => return Err(self.broken(e)),
                    };
                }
                msg_type::ROW_DESCRIPTION
                | msg_type::DATA_ROW
                | msg_type::EMPTY_QUERY_RESPONSE => {}
                msg_type::ERROR_RESPONSE => {
                    let err = self.take_server_error()?;
                    if err.is_connection_broken() {
                        self.state = SessionState::Broken;
                        return Err(err);
                    }
                    failure = Some(err);
                }
                msg_type::READY_FOR_QUERY => {
                    self.update_transaction_status()?;
                    break;
                }
                other => return Err(self.protocol_unexpected("simple query response", other)),
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(rows_affected),
        }
    }

    /// Close the session: Terminate, then close the transport.
    ///
    /// If the remote side already closed, the Terminate write failure is
    /// ignored. Closing twice is a no-op (the second handle cannot exist;
    /// drop performs the same teardown).
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.write_buf.clear();
        write_terminate(&mut self.write_buf);
        let result = self.transport.write_all(&self.write_buf);
        self.transport.cancel(false);
        self.state = SessionState::Closed;

        match result {
            Err(e) if !self.transport.remote_closed() => Err(e),
            _ => Ok(()),
        }
    }

    // === internals ===

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Broken | SessionState::Closed => Err(Error::ConnectionClosed),
        }
    }

    fn check_statement(&self, statement: &Statement) -> Result<()> {
        if statement.is_closed() || statement.connection_id() != self.connection_id {
            return Err(Error::StatementClosed);
        }
        Ok(())
    }

    /// Record a failure; transport and protocol errors poison the session.
    fn broken(&mut self, err: Error) -> Error {
        if err.is_connection_broken() {
            self.state = SessionState::Broken;
        }
        err
    }

    fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        match self.transport.write_all(data) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.broken(e)),
        }
    }

    fn flush_write(&mut self) -> Result<()> {
        match self.transport.write_all(&self.write_buf) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.broken(e)),
        }
    }

    fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = match self.transport.read(&mut buf[filled..]) {
                Ok(n) => n,
                Err(e) => return Err(self.broken(e)),
            };
            if n == 0 {
                self.state = SessionState::Broken;
                return Err(Error::Socket(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Read one complete frame; the payload lands in `read_buf`.
    ///
    /// Partial reads are accumulated; a half-message is never surfaced.
    fn read_frame(&mut self) -> Result<u8> {
        let mut head = [0u8; 5];
        self.read_full(&mut head)?;

        let tag = head[0];
        let frame_len = u32::from_be_bytes([head[1], head[2], head[3], head[4]]);
        if frame_len < 4 {
            self.state = SessionState::Broken;
            return Err(Error::Protocol(format!(
                "invalid frame length {} for message '{}'",
                frame_len, tag as char
            )));
        }

        let payload_len = (frame_len - 4) as usize;
        let mut payload = std::mem::take(&mut self.read_buf);
        payload.clear();
        payload.resize(payload_len, 0);
        let result = self.read_full(&mut payload);
        self.read_buf = payload;
        result?;

        Ok(tag)
    }

    /// Read the next synchronous message, transparently consuming notices,
    /// parameter status updates and (unsupported) notifications.
    pub(crate) fn next_message(&mut self) -> Result<u8> {
        loop {
            let tag = self.read_frame()?;
            match tag {
                msg_type::NOTICE_RESPONSE => match NoticeResponse::parse(&self.read_buf) {
                    Ok(notice) => self
                        .logger
                        .log(&LogRecord::new(LogLevel::Notice, notice.0.to_string())),
                    Err(e) => return Err(self.broken(e)),
                },
                msg_type::PARAMETER_STATUS => match ParameterStatus::parse(&self.read_buf) {
                    Ok(status) => {
                        let name = status.name.to_string();
                        let value = status.value.to_string();
                        self.parameters.insert(name, value);
                    }
                    Err(e) => return Err(self.broken(e)),
                },
                msg_type::NOTIFICATION_RESPONSE => self.logger.log(&LogRecord::new(
                    LogLevel::Debug,
                    "ignoring NotificationResponse (LISTEN is not supported)",
                )),
                _ => return Ok(tag),
            }
        }
    }

    /// Read the next message; a server error resynchronizes the session to
    /// ReadyForQuery and is returned as `Err`.
    fn read_response(&mut self) -> Result<u8> {
        let tag = self.next_message()?;
        if tag == msg_type::ERROR_RESPONSE {
            let err = self.take_server_error()?;
            self.recover_after_error(&err);
            return Err(err);
        }
        Ok(tag)
    }

    fn expect(&mut self, want: u8, what: &str) -> Result<()> {
        let tag = self.read_response()?;
        if tag != want {
            return Err(self.protocol_unexpected(what, tag));
        }
        Ok(())
    }

    pub(crate) fn expect_ready(&mut self) -> Result<()> {
        let tag = self.read_response()?;
        if tag != msg_type::READY_FOR_QUERY {
            return Err(self.protocol_unexpected("ReadyForQuery", tag));
        }
        self.update_transaction_status()
    }

    fn update_transaction_status(&mut self) -> Result<()> {
        let status = match ReadyForQuery::parse(&self.read_buf) {
            Ok(ready) => ready.transaction_status(),
            Err(e) => return Err(self.broken(e)),
        };
        match status {
            Ok(status) => {
                self.transaction_status = status;
                Ok(())
            }
            Err(e) => Err(self.broken(e)),
        }
    }

    /// Consume messages until ReadyForQuery, discarding everything.
    fn resync(&mut self) -> Result<()> {
        loop {
            let tag = self.next_message()?;
            if tag == msg_type::READY_FOR_QUERY {
                return self.update_transaction_status();
            }
        }
    }

    fn protocol_unexpected(&mut self, what: &str, tag: u8) -> Error {
        self.state = SessionState::Broken;
        Error::Protocol(format!("expected {}, got '{}'", what, tag as char))
    }

    // === cursor support ===

    pub(crate) fn current_data_row(&self) -> Result<Row> {
        Row::from_data_row(DataRow::parse(&self.read_buf)?)
    }

    pub(crate) fn current_command_rows(&self) -> Result<Option<u64>> {
        Ok(CommandComplete::parse(&self.read_buf)?.rows_affected())
    }

    pub(crate) fn current_row_description(&self) -> Result<Vec<ColumnMetadata>> {
        let desc = RowDescription::parse(&self.read_buf)?;
        Ok(desc
            .fields()
            .iter()
            .map(|field| ColumnMetadata {
                name: field.name.to_string(),
                table_oid: field.table_oid,
                column_id: field.column_id,
                type_oid: field.type_oid,
                type_size: field.type_size,
                type_modifier: field.type_modifier,
                format: field.format,
            })
            .collect())
    }

    /// Parse the ErrorResponse currently in `read_buf`.
    pub(crate) fn take_server_error(&mut self) -> Result<Error> {
        match ErrorResponse::parse(&self.read_buf) {
            Ok(response) => Ok(response.into_error()),
            Err(e) => Err(self.broken(e)),
        }
    }

    /// After a server error: poison on FATAL/PANIC, otherwise consume to
    /// ReadyForQuery so the session is usable again.
    pub(crate) fn recover_after_error(&mut self, err: &Error) {
        if err.is_connection_broken() {
            self.state = SessionState::Broken;
            return;
        }
        if self.resync().is_err() {
            self.state = SessionState::Broken;
        }
    }

    /// Consume the rest of the current response, if the session is usable.
    pub(crate) fn drain_to_ready(&mut self) -> Result<()> {
        if self.state != SessionState::Ready {
            return Ok(());
        }
        self.resync()
    }

    /// Close a portal: Close(portal) + Sync.
    pub(crate) fn close_portal_now(&mut self, portal: &str) -> Result<()> {
        if self.state != SessionState::Ready {
            return Ok(());
        }
        self.write_buf.clear();
        write_close_portal(&mut self.write_buf, portal);
        write_sync(&mut self.write_buf);
        self.flush_write()?;

        self.expect(msg_type::CLOSE_COMPLETE, "CloseComplete")?;
        self.expect_ready()
    }

    pub(crate) fn mark_broken(&mut self) {
        self.state = SessionState::Broken;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
