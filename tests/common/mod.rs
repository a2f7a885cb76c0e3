//! Scripted transport for driving a Connection without a server.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use pgline::{ChannelBindingPolicy, Config, Connection, Credential, Result, Transport};

/// A transport that replays a pre-scripted byte stream from the "server" and
/// captures everything the client writes.
pub struct ScriptTransport {
    input: Vec<u8>,
    pos: Arc<Mutex<usize>>,
    written: Arc<Mutex<Vec<u8>>>,
    fingerprint: Option<[u8; 32]>,
}

/// Shared views into a [`ScriptTransport`] that outlive the connection.
#[derive(Debug, Clone)]
pub struct TransportProbe {
    pub written: Arc<Mutex<Vec<u8>>>,
    pub read_pos: Arc<Mutex<usize>>,
}

impl TransportProbe {
    pub fn written_len(&self) -> usize {
        self.written.lock().unwrap().len()
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn consumed(&self) -> usize {
        *self.read_pos.lock().unwrap()
    }

    pub fn written_contains(&self, needle: &[u8]) -> bool {
        let written = self.written.lock().unwrap();
        written.windows(needle.len()).any(|w| w == needle)
    }
}

impl ScriptTransport {
    pub fn new(input: Vec<u8>, fingerprint: Option<[u8; 32]>) -> (Self, TransportProbe) {
        let transport = Self {
            input,
            pos: Arc::new(Mutex::new(0)),
            written: Arc::new(Mutex::new(Vec::new())),
            fingerprint,
        };
        let probe = TransportProbe {
            written: transport.written.clone(),
            read_pos: transport.pos.clone(),
        };
        (transport, probe)
    }
}

impl Transport for ScriptTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut pos = self.pos.lock().unwrap();
        let remaining = &self.input[*pos..];
        if remaining.is_empty() {
            return Ok(0);
        }
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        *pos += n;
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(())
    }

    fn cancel(&mut self, _force: bool) {}

    fn channel_binding_fingerprint(&self) -> Option<[u8; 32]> {
        self.fingerprint
    }

    fn remote_closed(&self) -> bool {
        *self.pos.lock().unwrap() >= self.input.len()
    }
}

/// Builder for the server side of a scripted session.
#[derive(Default)]
pub struct ServerScript {
    buf: Vec<u8>,
}

impl ServerScript {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame(mut self, tag: u8, payload: &[u8]) -> Self {
        self.buf.push(tag);
        self.buf
            .extend_from_slice(&((payload.len() + 4) as u32).to_be_bytes());
        self.buf.extend_from_slice(payload);
        self
    }

    pub fn auth_ok(self) -> Self {
        self.frame(b'R', &0_i32.to_be_bytes())
    }

    pub fn auth_cleartext(self) -> Self {
        self.frame(b'R', &3_i32.to_be_bytes())
    }

    pub fn auth_md5(self, salt: [u8; 4]) -> Self {
        let mut payload = 5_i32.to_be_bytes().to_vec();
        payload.extend_from_slice(&salt);
        self.frame(b'R', &payload)
    }

    pub fn auth_sasl(self, mechanisms: &[&str]) -> Self {
        let mut payload = 10_i32.to_be_bytes().to_vec();
        for mechanism in mechanisms {
            payload.extend_from_slice(mechanism.as_bytes());
            payload.push(0);
        }
        payload.push(0);
        self.frame(b'R', &payload)
    }

    pub fn parameter_status(self, name: &str, value: &str) -> Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
        self.frame(b'S', &payload)
    }

    pub fn backend_key(self, pid: u32, secret: u32) -> Self {
        let mut payload = pid.to_be_bytes().to_vec();
        payload.extend_from_slice(&secret.to_be_bytes());
        self.frame(b'K', &payload)
    }

    pub fn ready(self, status: u8) -> Self {
        self.frame(b'Z', &[status])
    }

    pub fn parse_complete(self) -> Self {
        self.frame(b'1', &[])
    }

    pub fn bind_complete(self) -> Self {
        self.frame(b'2', &[])
    }

    pub fn close_complete(self) -> Self {
        self.frame(b'3', &[])
    }

    pub fn no_data(self) -> Self {
        self.frame(b'n', &[])
    }

    pub fn empty_query(self) -> Self {
        self.frame(b'I', &[])
    }

    pub fn parameter_description(self, oids: &[u32]) -> Self {
        let mut payload = (oids.len() as u16).to_be_bytes().to_vec();
        for oid in oids {
            payload.extend_from_slice(&oid.to_be_bytes());
        }
        self.frame(b't', &payload)
    }

    pub fn row_description(self, columns: &[(&str, u32)]) -> Self {
        let mut payload = (columns.len() as u16).to_be_bytes().to_vec();
        for (name, type_oid) in columns {
            payload.extend_from_slice(name.as_bytes());
            payload.push(0);
            payload.extend_from_slice(&0_u32.to_be_bytes()); // table oid
            payload.extend_from_slice(&0_i16.to_be_bytes()); // column id
            payload.extend_from_slice(&type_oid.to_be_bytes());
            payload.extend_from_slice(&(-1_i16).to_be_bytes()); // type size
            payload.extend_from_slice(&(-1_i32).to_be_bytes()); // type modifier
            payload.extend_from_slice(&0_u16.to_be_bytes()); // text format
        }
        self.frame(b'T', &payload)
    }

    pub fn data_row(self, values: &[Option<&str>]) -> Self {
        let mut payload = (values.len() as u16).to_be_bytes().to_vec();
        for value in values {
            match value {
                None => payload.extend_from_slice(&(-1_i32).to_be_bytes()),
                Some(text) => {
                    payload.extend_from_slice(&(text.len() as i32).to_be_bytes());
                    payload.extend_from_slice(text.as_bytes());
                }
            }
        }
        self.frame(b'D', &payload)
    }

    pub fn command_complete(self, tag: &str) -> Self {
        let mut payload = tag.as_bytes().to_vec();
        payload.push(0);
        self.frame(b'C', &payload)
    }

    pub fn notice(self, message: &str) -> Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"SNOTICE\0");
        payload.push(b'M');
        payload.extend_from_slice(message.as_bytes());
        payload.push(0);
        payload.push(0);
        self.frame(b'N', &payload)
    }

    pub fn error(self, severity: &str, code: &str, message: &str) -> Self {
        let mut payload = Vec::new();
        payload.push(b'S');
        payload.extend_from_slice(severity.as_bytes());
        payload.push(0);
        payload.push(b'C');
        payload.extend_from_slice(code.as_bytes());
        payload.push(0);
        payload.push(b'M');
        payload.extend_from_slice(message.as_bytes());
        payload.push(0);
        payload.push(0);
        self.frame(b'E', &payload)
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// The standard startup tail: parameters, key data, ready, and the
    /// responses to the session SET batch.
    pub fn startup_tail(self) -> Self {
        self.parameter_status("server_version", "16.3")
            .parameter_status("client_encoding", "UTF8")
            .backend_key(4242, 0x5eed)
            .ready(b'I')
            .command_complete("SET")
            .command_complete("SET")
            .ready(b'I')
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

pub fn trust_config() -> Config {
    Config {
        user: "alice".into(),
        ..Default::default()
    }
}

/// Connect over a trust-authenticated scripted session.
pub fn connect_scripted(extra: ServerScript) -> (Connection, TransportProbe) {
    let script = ServerScript::new()
        .auth_ok()
        .startup_tail()
        .raw(&extra.build())
        .build();
    let (transport, probe) = ScriptTransport::new(script, None);
    let conn = Connection::with_transport(
        Box::new(transport),
        &trust_config(),
        Arc::new(pgline::DefaultLogger),
    )
    .expect("scripted startup failed");
    (conn, probe)
}

pub fn scram_config(policy: ChannelBindingPolicy) -> Config {
    Config {
        user: "alice".into(),
        credential: Credential::ScramSha256("pencil".into()),
        channel_binding: policy,
        ..Default::default()
    }
}
