//! Byte transport collaborator.
//!
//! The connection core is transport-agnostic: anything implementing
//! [`Transport`] can carry a session. [`TlsTransport`] is the production
//! implementation: TCP, the SSLRequest preamble, then a native-tls handshake
//! advertising `postgresql` as the single ALPN protocol. Plaintext sessions
//! are refused; an `N` answer to SSLRequest aborts the connection.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use native_tls::{HandshakeError, TlsConnector, TlsStream};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::frontend::write_ssl_request;

/// Blocking, bidirectional byte stream carrying one session.
pub trait Transport {
    /// Read up to `buf.len()` bytes; 0 means the remote closed the stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Close the stream; `force` skips the TLS close-notify.
    fn cancel(&mut self, force: bool);

    /// SHA-256 of the server's leaf certificate DER (tls-server-end-point),
    /// captured during the TLS handshake.
    fn channel_binding_fingerprint(&self) -> Option<[u8; 32]>;

    /// True once a read has observed EOF or a reset from the peer.
    fn remote_closed(&self) -> bool;
}

/// TCP + TLS transport.
pub struct TlsTransport {
    stream: TlsStream<TcpStream>,
    fingerprint: Option<[u8; 32]>,
    remote_closed: AtomicBool,
}

impl TlsTransport {
    /// Connect, negotiate SSL and complete the TLS handshake.
    pub fn connect(config: &Config) -> Result<Self> {
        let timeout = match config.socket_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                Error::Socket(std::io::Error::new(
                    ErrorKind::AddrNotAvailable,
                    format!("no address for {}:{}", config.host, config.port),
                ))
            })?;

        let mut tcp = match timeout {
            Some(dur) => TcpStream::connect_timeout(&addr, dur)?,
            None => TcpStream::connect(addr)?,
        };
        tcp.set_nodelay(true)?;
        tcp.set_read_timeout(timeout)?;
        tcp.set_write_timeout(timeout)?;

        // SSLRequest preamble; the server answers with a single byte.
        let mut preamble = Vec::with_capacity(8);
        write_ssl_request(&mut preamble);
        tcp.write_all(&preamble)?;

        let mut answer = [0u8; 1];
        tcp.read_exact(&mut answer)?;
        match answer[0] {
            b'S' => {}
            b'N' => {
                return Err(Error::Ssl(
                    "server refused SSL; plaintext sessions are not supported".into(),
                ));
            }
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected SSLRequest response: 0x{:02x}",
                    other
                )));
            }
        }

        let connector = TlsConnector::builder()
            .request_alpns(&["postgresql"])
            .build()?;
        let stream = connector
            .connect(&config.host, tcp)
            .map_err(|e| match e {
                HandshakeError::Failure(err) => Error::Ssl(err.to_string()),
                HandshakeError::WouldBlock(_) => {
                    Error::Ssl("TLS handshake interrupted".into())
                }
            })?;

        let fingerprint = match stream.peer_certificate()? {
            Some(cert) => {
                let der = cert.to_der()?;
                Some(Sha256::digest(&der).into())
            }
            None => None,
        };

        Ok(Self {
            stream,
            fingerprint,
            remote_closed: AtomicBool::new(false),
        })
    }

    fn map_io_error(&self, err: std::io::Error) -> Error {
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout,
            ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => {
                self.remote_closed.store(true, Ordering::Relaxed);
                Error::Socket(err)
            }
            _ => Error::Socket(err),
        }
    }
}

impl Transport for TlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(0) => {
                self.remote_closed.store(true, Ordering::Relaxed);
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => Err(self.map_io_error(e)),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self.stream.write_all(buf).and_then(|_| self.stream.flush()) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.map_io_error(e)),
        }
    }

    fn cancel(&mut self, force: bool) {
        if force {
            let _ = self.stream.get_ref().shutdown(Shutdown::Both);
        } else {
            let _ = self.stream.shutdown();
        }
    }

    fn channel_binding_fingerprint(&self) -> Option<[u8; 32]> {
        self.fingerprint
    }

    fn remote_closed(&self) -> bool {
        self.remote_closed.load(Ordering::Relaxed)
    }
}
