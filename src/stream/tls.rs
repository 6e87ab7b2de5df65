//! TLS overlay, composed over an owned TCP stream rather than inheriting
//! from it.
//!
//! The source modeled this as a `tls_stream` subclass of `stream`; here a
//! [`TlsStream`] *owns* a [`TcpStream`] and a `rustls` session and
//! delegates the descriptor, endpoint and option application to it, while
//! replacing `read`/`write`/`stream_in` with record-layer operations.

use std::io::{Read, Write};
use std::os::unix::io::RawFd;
use std::sync::Arc;

use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerName};

use crate::config::StreamOptions;
use crate::error::{Error, Result};
use crate::stream::tcp::TcpStream;
use crate::stream::{interrupted, would_block, BlockingStream, NonblockingStream};
use crate::tls_init::TlsInitGuard;

/// A client-side TLS stream: an owned TCP stream plus a `rustls` client
/// session. Accepting a TLS connection is handled separately by
/// [`crate::acceptor::tls::TlsAcceptor`], which performs the server-side
/// handshake once per accepted TCP stream.
pub struct TlsStream {
    tcp: TcpStream,
    session: Option<ClientConnection>,
    _init: TlsInitGuard,
}

fn default_client_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add_server_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.0.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));
    Arc::new(
        ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

impl TlsStream {
    pub fn new() -> Self {
        Self {
            tcp: TcpStream::new(),
            session: None,
            _init: TlsInitGuard::acquire(),
        }
    }

    fn require_session_and_tcp(&mut self) -> Result<(&mut ClientConnection, &mut TcpStream)> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::Tls("handshake not yet performed".to_string()))?;
        Ok((session, &mut self.tcp))
    }
}

impl Default for TlsStream {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockingStream for TlsStream {
    fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.tcp.connect(host, port)?;

        let name = ServerName::try_from(host)
            .map_err(|_| Error::Tls(format!("'{host}' is not a valid TLS server name")))?;
        let config = default_client_config();
        let session = ClientConnection::new(config, name)
            .map_err(|e| Error::Tls(e.to_string()))?;
        self.session = Some(session);

        // Drive the handshake to completion using the blocking TCP stream
        // underneath: write any pending handshake bytes, read the server's
        // response, repeat until rustls reports the handshake complete.
        while self.session.as_ref().unwrap().is_handshaking() {
            let (session, tcp) = self.require_session_and_tcp()?;
            if session.wants_write() {
                let mut buf = Vec::new();
                session.write_tls(&mut buf).map_err(|e| Error::Tls(e.to_string()))?;
                tcp.write(&buf)?;
            }
            if session.wants_read() {
                let mut chunk = [0u8; 4096];
                tcp.stream_in_once(&mut chunk).map(|n| {
                    let mut cursor = &chunk[..n];
                    let _ = session.read_tls(&mut cursor);
                }).ok();
                session
                    .process_new_packets()
                    .map_err(|e| Error::Tls(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.send_close_notify();
        }
        self.session = None;
        self.tcp.disconnect();
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let (session, tcp) = self.require_session_and_tcp()?;
        session
            .writer()
            .write_all(buf)
            .map_err(|e| Error::Tls(e.to_string()))?;
        let mut out = Vec::new();
        session.write_tls(&mut out).map_err(|e| Error::Tls(e.to_string()))?;
        tcp.write(&out)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut read = 0;
        while read < buf.len() {
            let (session, tcp) = self.require_session_and_tcp()?;
            let mut chunk = [0u8; 8192];
            let n = tcp.read_once_blocking(&mut chunk)?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed before TLS read completed",
                )));
            }
            let mut cursor = &chunk[..n];
            session
                .read_tls(&mut cursor)
                .map_err(|e| Error::Tls(e.to_string()))?;
            session
                .process_new_packets()
                .map_err(|e| Error::Tls(e.to_string()))?;
            read += session
                .reader()
                .read(&mut buf[read..])
                .map_err(|e| Error::Io(e))?;
        }
        Ok(())
    }

    fn stream_in(&mut self, out: &mut Vec<u8>) -> Result<()> {
        loop {
            let (session, tcp) = self.require_session_and_tcp()?;
            let mut chunk = [0u8; 8192];
            let n = tcp.read_once_blocking(&mut chunk)?;
            if n == 0 {
                return Ok(());
            }
            let mut cursor = &chunk[..n];
            session
                .read_tls(&mut cursor)
                .map_err(|e| Error::Tls(e.to_string()))?;
            session
                .process_new_packets()
                .map_err(|e| Error::Tls(e.to_string()))?;
            let mut plain = Vec::new();
            session
                .reader()
                .read_to_end(&mut plain)
                .map_err(Error::Io)?;
            out.extend_from_slice(&plain);
        }
    }

    fn set_options(&mut self, opts: StreamOptions) -> Result<()> {
        self.tcp.set_options(opts)
    }

    fn endpoint(&self) -> Option<String> {
        self.tcp.endpoint()
    }
}

impl NonblockingStream for TlsStream {
    fn platform_socket(&self) -> RawFd {
        self.tcp.platform_socket()
    }

    fn read_once(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (session, tcp) = self.require_session_and_tcp()?;
        let mut chunk = [0u8; 8192];
        let n = tcp.read_once(&mut chunk)?;
        if n == 0 {
            return Ok(0);
        }
        let mut cursor = &chunk[..n];
        session
            .read_tls(&mut cursor)
            .map_err(|e| Error::Tls(e.to_string()))?;
        session
            .process_new_packets()
            .map_err(|e| Error::Tls(e.to_string()))?;
        session.reader().read(buf).map_err(Error::Io)
    }

    fn write_once(&mut self, buf: &[u8]) -> Result<usize> {
        let (session, tcp) = self.require_session_and_tcp()?;
        let n = session.writer().write(buf).map_err(|e| Error::Tls(e.to_string()))?;
        let mut out = Vec::new();
        session.write_tls(&mut out).map_err(|e| Error::Tls(e.to_string()))?;
        if !out.is_empty() {
            tcp.write_once(&out)?;
        }
        Ok(n)
    }

    fn endpoint(&self) -> Option<String> {
        self.tcp.endpoint()
    }
}

impl TcpStream {
    /// Read once while the underlying socket is still in blocking mode
    /// (used only during the handshake, before the reactor would ever
    /// toggle non-blocking mode). `Ok(0)` unambiguously means the peer
    /// closed: a blocking socket cannot report would-block.
    fn read_once_blocking(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_once(buf)
    }

    fn stream_in_once(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_once(buf)
    }
}
