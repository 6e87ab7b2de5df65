//! Plain TCP acceptor.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::os::unix::io::{AsRawFd, RawFd};

use socket2::{Domain, Socket, Type};

use crate::acceptor::Acceptor;
use crate::config::StreamOptions;
use crate::error::{Error, Result};
use crate::stream::tcp::TcpStream;
use crate::stream::BlockingStream;

pub struct TcpAcceptor {
    listener: Option<StdTcpListener>,
    template: StreamOptions,
}

impl TcpAcceptor {
    pub fn new() -> Self {
        Self {
            listener: None,
            template: StreamOptions::default(),
        }
    }

    /// Wrap a caller-supplied listener, for the reactor's
    /// `custom_acceptor` injection point. The acceptor does not own it:
    /// dropping this `TcpAcceptor` does not close the listener.
    pub fn from_listener(listener: StdTcpListener) -> Self {
        Self {
            listener: Some(listener),
            template: StreamOptions::default(),
        }
    }

    pub fn into_listener(self) -> Option<StdTcpListener> {
        self.listener
    }
}

impl Default for TcpAcceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Acceptor for TcpAcceptor {
    type Output = TcpStream;

    fn open(&mut self, port: u16) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).map_err(Error::Bind)?;
        socket.set_reuse_address(true).map_err(Error::Bind)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(Error::Bind)?;
        socket.bind(&addr.into()).map_err(Error::Bind)?;
        socket.listen(1024).map_err(Error::Listen)?;
        self.listener = Some(socket.into());
        Ok(())
    }

    fn set_options(&mut self, opts: StreamOptions) {
        self.template = opts;
    }

    fn accept(&mut self) -> Result<TcpStream> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| Error::Accept(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "acceptor has not been opened",
            )))?;
        let (socket, _peer) = listener.accept().map_err(Error::Accept)?;
        let mut stream = TcpStream::from_std(socket);
        stream.set_options(self.template)?;
        Ok(stream)
    }

    fn raw(&self) -> RawFd {
        self.listener.as_ref().map(|l| l.as_raw_fd()).unwrap_or(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_before_open_fails() {
        let mut acceptor = TcpAcceptor::new();
        assert!(acceptor.accept().is_err());
    }

    #[test]
    fn open_binds_an_ephemeral_port_and_listens() {
        let mut acceptor = TcpAcceptor::new();
        acceptor.open(0).expect("bind to ephemeral port");
        assert_ne!(acceptor.raw(), -1);
    }
}
