//! Extended query protocol messages.

use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::Oid;
use crate::types::Params;

/// Write a Parse message to create a prepared statement.
///
/// - `name`: statement name (empty for the unnamed statement)
/// - `query`: SQL with $1, $2, ... placeholders
/// - `param_oids`: parameter type OIDs (empty = let the server infer)
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &str, param_oids: &[Oid]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstr(query);
    msg.write_i16(param_oids.len() as i16);
    for &oid in param_oids {
        msg.write_i32(oid as i32);
    }
    msg.finish();
}

/// Write a Bind message to create a portal from a prepared statement.
///
/// All parameters and all result columns use text format: zero parameter
/// format codes and zero result format codes select the default (text) on
/// both sides. Parameter values are written length-prefixed, -1 for NULL.
pub fn write_bind<P: Params>(buf: &mut Vec<u8>, portal: &str, statement: &str, params: &P) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::BIND);

    msg.write_cstr(portal);
    msg.write_cstr(statement);

    // Parameter format codes: none, meaning all text
    msg.write_i16(0);

    let mut values = Vec::new();
    params.encode(&mut values);
    msg.write_i16(params.count() as i16);
    msg.write_bytes(&values);

    // Result format codes: none, meaning all text
    msg.write_i16(0);

    msg.finish();
}

/// Write an Execute message to run a portal.
///
/// `max_rows` of 0 requests all rows.
pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: u32) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_i32(max_rows as i32);
    msg.finish();
}

fn write_describe(buf: &mut Vec<u8>, describe_type: u8, name: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::DESCRIBE);
    msg.write_u8(describe_type);
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Describe message for a prepared statement.
pub fn write_describe_statement(buf: &mut Vec<u8>, name: &str) {
    write_describe(buf, b'S', name);
}

/// Write a Describe message for a portal.
pub fn write_describe_portal(buf: &mut Vec<u8>, name: &str) {
    write_describe(buf, b'P', name);
}

fn write_close(buf: &mut Vec<u8>, close_type: u8, name: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::CLOSE);
    msg.write_u8(close_type);
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Close message for a prepared statement.
pub fn write_close_statement(buf: &mut Vec<u8>, name: &str) {
    write_close(buf, b'S', name);
}

/// Write a Close message for a portal.
pub fn write_close_portal(buf: &mut Vec<u8>, name: &str) {
    write_close(buf, b'P', name);
}

/// Write a Sync message.
///
/// Ends an extended query sequence; the server replies with ReadyForQuery
/// after processing (or skipping, on error) everything up to this point.
pub fn write_sync(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::SYNC);
    msg.finish();
}
