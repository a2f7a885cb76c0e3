//! Simple query protocol messages.

use crate::protocol::codec::MessageBuilder;

/// Write a Query message (simple query protocol).
///
/// May contain multiple statements separated by semicolons; the server sends
/// one CommandComplete per statement and a single ReadyForQuery at the end.
pub fn write_query(buf: &mut Vec<u8>, sql: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::QUERY);
    msg.write_cstr(sql);
    msg.finish();
}
