//! Connectionless datagram send/receive: one write is one datagram, one
//! read is one datagram (truncated if it exceeds the buffer). Neither
//! fragmentation nor reassembly is performed by this layer.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket as StdUdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use socket2::{Domain, Socket, Type};

use crate::error::{Error, Result};

/// Binds a datagram socket with `SO_REUSEADDR`. [`Builder::socket`] is
/// shared (via `Arc`) by any [`Sender`]/[`Receiver`] built from it, so
/// local loopback send/receive pairs can reuse one descriptor.
pub struct Builder {
    socket: Arc<StdUdpSocket>,
}

impl Builder {
    pub fn bind(port: u16) -> Result<Self> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None).map_err(Error::Bind)?;
        socket.set_reuse_address(true).map_err(Error::Bind)?;
        socket.bind(&addr.into()).map_err(Error::Bind)?;
        let std_socket: StdUdpSocket = socket.into();
        Ok(Self {
            socket: Arc::new(std_socket),
        })
    }

    pub fn platform_socket(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    pub fn sender(&self) -> Sender {
        Sender {
            socket: Arc::clone(&self.socket),
            peer: None,
        }
    }

    pub fn receiver(&self) -> Receiver {
        Receiver {
            socket: Arc::clone(&self.socket),
        }
    }
}

/// Sends datagrams to a fixed peer.
pub struct Sender {
    socket: Arc<StdUdpSocket>,
    peer: Option<SocketAddr>,
}

impl Sender {
    pub fn platform_socket(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|_| Error::Resolve(host.to_string()))?
            .next()
            .ok_or_else(|| Error::Resolve(host.to_string()))?;
        self.peer = Some(addr);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.peer = None;
    }

    /// Issue a single `sendto` carrying `data` as one datagram.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let peer = self
            .peer
            .ok_or_else(|| Error::Connect(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "sender has no configured peer",
            )))?;
        self.socket.send_to(data, peer).map_err(Error::Io)?;
        Ok(())
    }
}

/// Receives datagrams from any peer.
pub struct Receiver {
    socket: Arc<StdUdpSocket>,
}

impl Receiver {
    pub fn platform_socket(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Issue a single `recvfrom`, returning the byte count actually
    /// written into `data` (truncated to `data.len()` if the datagram was
    /// larger).
    pub fn read(&self, data: &mut [u8]) -> Result<usize> {
        let (n, _peer) = self.socket.recv_from(data).map_err(Error::Io)?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_send_receive_round_trip() {
        let server = Builder::bind(0).unwrap();
        let server_port = server.socket.local_addr().unwrap().port();
        let receiver = server.receiver();

        let client = Builder::bind(0).unwrap();
        let mut sender = client.sender();
        sender.connect("127.0.0.1", server_port).unwrap();
        sender.write(b"ping").unwrap();

        let mut buf = [0u8; 16];
        let n = receiver.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[test]
    fn write_without_connect_fails() {
        let b = Builder::bind(0).unwrap();
        let sender = b.sender();
        assert!(sender.write(b"x").is_err());
    }
}
