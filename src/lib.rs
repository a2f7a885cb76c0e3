//! A native PostgreSQL wire-protocol (v3) client.
//!
//! # Features
//!
//! - **TLS only**: sessions are negotiated with the SSLRequest preamble and
//!   refuse to continue in plaintext
//! - **SCRAM-SHA-256 and SCRAM-SHA-256-PLUS**: channel binding via
//!   tls-server-end-point, with a required/preferred policy
//! - **Extended query protocol**: prepared statements with text-format
//!   parameters and lazy, cursor-style row streaming
//! - **Lossless text codec**: explicit conversions between Postgres text
//!   representations and Rust values, including BC dates, NaN numerics and
//!   both interval syntaxes
//!
//! # Example
//!
//! ```no_run
//! use pgline::{Config, Connection, Credential};
//!
//! fn main() -> pgline::Result<()> {
//!     let config = Config {
//!         host: "db.example.com".into(),
//!         user: "alice".into(),
//!         credential: Credential::ScramSha256("secret".into()),
//!         ..Default::default()
//!     };
//!
//!     let mut conn = Connection::connect(&config)?;
//!     let stmt = conn.prepare("SELECT city, temp_hi FROM weather WHERE date = $1")?;
//!
//!     let mut cursor = conn.execute(&stmt, &("1994-11-29",))?;
//!     while let Some(row) = cursor.next_row() {
//!         let row = row?;
//!         println!("{}: {}", row[0].string()?, row[1].int()?);
//!     }
//!     drop(cursor);
//!
//!     conn.close()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod logger;
pub mod protocol;
pub mod row;
pub mod sasl;
pub mod state;
pub mod statement;
pub mod transport;
pub mod types;
pub mod value;

pub use config::{ChannelBindingPolicy, Config, Credential};
pub use connection::Connection;
pub use error::{Error, Result, ServerError};
pub use logger::{DefaultLogger, LogLevel, LogRecord, Logger};
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use row::Row;
pub use statement::{ColumnMetadata, Cursor, Statement};
pub use transport::{TlsTransport, Transport};
pub use types::{FromPgText, Params, PgInterval, PgNumeric, PgTimeTz, ToPgText};
pub use value::PgValue;
