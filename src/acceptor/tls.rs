//! TLS acceptor: composes a TCP acceptor, then performs the server-side
//! handshake on every accepted stream before handing it back.

use std::io::Write as _;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::Arc;

use rustls::{Connection, ServerConfig, ServerConnection};

use crate::acceptor::tcp::TcpAcceptor;
use crate::acceptor::Acceptor;
use crate::config::StreamOptions;
use crate::error::{Error, Result};
use crate::stream::tcp::TcpStream;
use crate::stream::{BlockingStream, NonblockingStream};
use crate::tls_init::TlsInitGuard;

pub struct TlsAcceptor {
    tcp: TcpAcceptor,
    config: Arc<ServerConfig>,
    _init: TlsInitGuard,
}

impl TlsAcceptor {
    /// Build a TLS acceptor from a PEM certificate chain and private key,
    /// as loaded with `rustls-pemfile`.
    pub fn new(cert_chain: Vec<rustls::Certificate>, key: rustls::PrivateKey) -> Result<Self> {
        let config = ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)
            .map_err(|e| Error::Tls(e.to_string()))?;
        Ok(Self {
            tcp: TcpAcceptor::new(),
            config: Arc::new(config),
            _init: TlsInitGuard::acquire(),
        })
    }

    /// Build a TLS acceptor by loading a PEM certificate chain and a
    /// PKCS#8 private key from disk.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_chain = load_cert_chain(cert_path)?;
        let key = load_private_key(key_path)?;
        Self::new(cert_chain, key)
    }
}

fn load_cert_chain(path: &Path) -> Result<Vec<rustls::Certificate>> {
    let file = std::fs::File::open(path).map_err(Error::Io)?;
    let mut reader = std::io::BufReader::new(file);
    let raw = rustls_pemfile::certs(&mut reader)
        .map_err(|e| Error::Tls(format!("failed to parse certificate chain at '{}': {e}", path.display())))?;
    if raw.is_empty() {
        return Err(Error::Tls(format!("no certificates found in '{}'", path.display())));
    }
    Ok(raw.into_iter().map(rustls::Certificate).collect())
}

fn load_private_key(path: &Path) -> Result<rustls::PrivateKey> {
    let file = std::fs::File::open(path).map_err(Error::Io)?;
    let mut reader = std::io::BufReader::new(file);
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .map_err(|e| Error::Tls(format!("failed to parse private key at '{}': {e}", path.display())))?;
    let key = keys
        .pop()
        .ok_or_else(|| Error::Tls(format!("no PKCS#8 private key found in '{}'", path.display())))?;
    Ok(rustls::PrivateKey(key))
}

impl Acceptor for TlsAcceptor {
    type Output = TlsAcceptedStream;

    fn open(&mut self, port: u16) -> Result<()> {
        self.tcp.open(port)
    }

    fn set_options(&mut self, opts: StreamOptions) {
        self.tcp.set_options(opts)
    }

    fn accept(&mut self) -> Result<TlsAcceptedStream> {
        let mut tcp = self.tcp.accept()?;
        let mut session =
            ServerConnection::new(Arc::clone(&self.config)).map_err(|e| Error::Tls(e.to_string()))?;

        while session.is_handshaking() {
            session
                .complete_io(&mut TcpStreamAdapter(&mut tcp))
                .map_err(|e| Error::Tls(e.to_string()))?;
        }

        Ok(TlsAcceptedStream { tcp, session })
    }

    fn raw(&self) -> RawFd {
        self.tcp.raw()
    }
}

/// Bridges `rustls`'s `std::io::Read + Write` expectations onto the
/// blocking stream capability during the handshake.
///
/// `read` must return as soon as some bytes are available rather than
/// waiting to fill `buf`: a handshake flight is usually much smaller than
/// the buffer `complete_io` passes in, so a full-satisfaction read would
/// block past the end of the flight waiting for bytes the peer has no
/// reason to send yet.
struct TcpStreamAdapter<'a>(&'a mut TcpStream);

impl<'a> std::io::Read for TcpStreamAdapter<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0
            .read_once(buf)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "stream read failed"))
    }
}

impl<'a> std::io::Write for TcpStreamAdapter<'a> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .write(buf)
            .map(|_| buf.len())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "stream write failed"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A TLS stream accepted by [`TlsAcceptor`], with the handshake already
/// complete. Implements [`BlockingStream`] like every other stream in this
/// crate, so protocol codecs written against that capability (the
/// WebSocket frame codec, for instance) run unmodified over a
/// server-accepted TLS connection.
pub struct TlsAcceptedStream {
    tcp: TcpStream,
    session: ServerConnection,
}

impl TlsAcceptedStream {
    /// Pump one chunk of ciphertext off the wire into the session and
    /// return the plaintext it yields into `buf`. Loops internally when a
    /// pumped chunk carries no application data (handshake or alert
    /// traffic only) rather than reporting a spurious empty read. `Ok(0)`
    /// means the peer performed an orderly close; it is never returned
    /// for a chunk that merely produced no plaintext.
    fn pump(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut chunk = [0u8; 8192];
            let n = self.tcp.read_once(&mut chunk)?;
            if n == 0 {
                return Ok(0);
            }
            let mut cursor = &chunk[..n];
            self.session
                .read_tls(&mut cursor)
                .map_err(|e| Error::Tls(e.to_string()))?;
            self.session
                .process_new_packets()
                .map_err(|e| Error::Tls(e.to_string()))?;
            let read = self.session.reader().read(buf).map_err(Error::Io)?;
            if read > 0 {
                return Ok(read);
            }
        }
    }
}

impl BlockingStream for TlsAcceptedStream {
    fn connect(&mut self, _host: &str, _port: u16) -> Result<()> {
        Err(Error::Tls("connect is not valid on an already-accepted TLS stream".to_string()))
    }

    fn disconnect(&mut self) {
        self.session.send_close_notify();
        self.tcp.disconnect();
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.session
            .writer()
            .write_all(buf)
            .map_err(|e| Error::Tls(e.to_string()))?;
        let mut out = Vec::new();
        self.session.write_tls(&mut out).map_err(|e| Error::Tls(e.to_string()))?;
        self.tcp.write(&out)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut read = 0;
        while read < buf.len() {
            let n = self.pump(&mut buf[read..])?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed before TLS read completed",
                )));
            }
            read += n;
        }
        Ok(())
    }

    fn stream_in(&mut self, out: &mut Vec<u8>) -> Result<()> {
        loop {
            let mut chunk = [0u8; 8192];
            let n = self.pump(&mut chunk)?;
            if n == 0 {
                return Ok(());
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    fn set_options(&mut self, opts: StreamOptions) -> Result<()> {
        self.tcp.set_options(opts)
    }

    fn endpoint(&self) -> Option<String> {
        self.tcp.endpoint()
    }
}
