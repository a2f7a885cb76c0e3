//! PostgreSQL wire protocol, version 3.
//!
//! - `backend`: server to client messages (parsing)
//! - `frontend`: client to server messages (encoding)
//! - `codec`: low-level encoding/decoding primitives
//! - `types`: common protocol types (Oid, TransactionStatus, FormatCode)

pub mod backend;
pub mod codec;
pub mod frontend;
pub mod types;

pub use types::{FormatCode, Oid, TransactionStatus};
