//! Plain TCP implementation of the stream capability.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream as StdTcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use socket2::{Domain, Socket, Type};

use crate::config::StreamOptions;
use crate::error::{Error, Result};
use crate::stream::{interrupted, would_block, BlockingStream, NonblockingStream};

/// A TCP byte stream. Usable as a [`BlockingStream`] for synchronous
/// callers (HTTP helpers, the WebSocket and TLS handshakes) and as a
/// [`NonblockingStream`] once [`Self::set_options`] has put the socket in
/// non-blocking mode, as the reactor does on every connection it admits.
pub struct TcpStream {
    inner: Option<StdTcpStream>,
    peer: Option<SocketAddr>,
    pending_options: StreamOptions,
}

impl TcpStream {
    pub fn new() -> Self {
        Self {
            inner: None,
            peer: None,
            pending_options: StreamOptions::default(),
        }
    }

    /// Wrap an already-connected socket, as returned by an acceptor.
    pub fn from_std(inner: StdTcpStream) -> Self {
        let peer = inner.peer_addr().ok();
        Self {
            inner: Some(inner),
            peer,
            pending_options: StreamOptions::default(),
        }
    }

    fn require_inner(&self) -> Result<&StdTcpStream> {
        self.inner.as_ref().ok_or_else(|| Error::Connect(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "stream is not connected",
        )))
    }

    fn require_inner_mut(&mut self) -> Result<&mut StdTcpStream> {
        self.inner.as_mut().ok_or_else(|| Error::Connect(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "stream is not connected",
        )))
    }

    fn apply_options(&mut self, opts: StreamOptions) -> Result<()> {
        if let Some(inner) = self.inner.as_ref() {
            inner
                .set_nonblocking(opts.non_block_mode)
                .map_err(Error::Io)?;
            let read_timeout = (opts.read_timeout_ms != 0)
                .then(|| Duration::from_millis(opts.read_timeout_ms));
            let write_timeout = (opts.write_timeout_ms != 0)
                .then(|| Duration::from_millis(opts.write_timeout_ms));
            inner.set_read_timeout(read_timeout).map_err(Error::Io)?;
            inner.set_write_timeout(write_timeout).map_err(Error::Io)?;
        }
        self.pending_options = opts;
        Ok(())
    }
}

impl Default for TcpStream {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockingStream for TcpStream {
    fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let deadline = Duration::from_millis(self.pending_options.connection_timeout_ms.max(1));
        let mut addrs = (host, port)
            .to_socket_addrs()
            .map_err(|_| Error::Resolve(host.to_string()))?;
        let addr = addrs.next().ok_or_else(|| Error::Resolve(host.to_string()))?;

        let domain = match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::STREAM, None).map_err(Error::Connect)?;
        socket.set_nonblocking(true).map_err(Error::Connect)?;
        match socket.connect(&addr.into()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.raw_os_error() == Some(libc::EINPROGRESS) => {
                socket.connect_timeout(&addr.into(), deadline).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::TimedOut {
                        Error::Timeout
                    } else {
                        Error::Connect(e)
                    }
                })?;
            }
            Err(e) => return Err(Error::Connect(e)),
        }
        socket
            .set_nonblocking(self.pending_options.non_block_mode)
            .map_err(Error::Connect)?;

        let std_stream: StdTcpStream = socket.into();
        self.peer = std_stream.peer_addr().ok();
        self.inner = Some(std_stream);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.inner = None;
        self.peer = None;
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let inner = self.require_inner_mut()?;
        let mut written = 0;
        while written < buf.len() {
            match inner.write(&buf[written..]) {
                Ok(0) => return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "peer closed before write completed",
                ))),
                Ok(n) => written += n,
                Err(e) if interrupted(&e) => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let inner = self.require_inner_mut()?;
        let mut read = 0;
        while read < buf.len() {
            match inner.read(&mut buf[read..]) {
                Ok(0) => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "peer closed before read completed",
                    )))
                }
                Ok(n) => read += n,
                Err(e) if interrupted(&e) => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    fn stream_in(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let inner = self.require_inner_mut()?;
        let mut chunk = [0u8; 8192];
        loop {
            match inner.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => out.extend_from_slice(&chunk[..n]),
                Err(e) if interrupted(&e) => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn set_options(&mut self, opts: StreamOptions) -> Result<()> {
        self.apply_options(opts)
    }

    fn endpoint(&self) -> Option<String> {
        self.peer.map(|a| a.to_string())
    }
}

impl NonblockingStream for TcpStream {
    fn platform_socket(&self) -> RawFd {
        self.require_inner().map(|s| s.as_raw_fd()).unwrap_or(-1)
    }

    fn read_once(&mut self, buf: &mut [u8]) -> Result<usize> {
        let inner = self.require_inner_mut()?;
        loop {
            match inner.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if would_block(&e) => return Ok(0),
                Err(e) if interrupted(&e) => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn write_once(&mut self, buf: &[u8]) -> Result<usize> {
        let inner = self.require_inner_mut()?;
        loop {
            match inner.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if would_block(&e) => return Ok(0),
                Err(e) if interrupted(&e) => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn endpoint(&self) -> Option<String> {
        self.peer.map(|a| a.to_string())
    }
}
