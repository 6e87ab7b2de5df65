//! The acceptor capability: bind, listen, and accept, producing stream
//! instances ready for either blocking use or reactor admission.

pub mod tcp;
#[cfg(feature = "tls")]
pub mod tls;

use std::os::unix::io::RawFd;

use crate::config::StreamOptions;
use crate::error::Result;

/// Binds a listening socket and produces accepted streams.
///
/// `Output` is the concrete stream type this acceptor hands back;
/// [`tcp::TcpAcceptor`] produces plain TCP streams, and
/// [`tls::TlsAcceptor`] (feature `tls`) composes a TCP acceptor with a
/// server-side handshake to produce TLS streams.
pub trait Acceptor {
    type Output;

    /// Create a listening socket with `SO_REUSEADDR`, bind `0.0.0.0:port`,
    /// and begin listening.
    fn open(&mut self, port: u16) -> Result<()>;

    /// Update the option template applied to every future accepted
    /// stream.
    fn set_options(&mut self, opts: StreamOptions);

    /// Block until a connection arrives and return a stream initialized
    /// with the acceptor's current option template.
    fn accept(&mut self) -> Result<Self::Output>;

    /// The listening descriptor, for reactor readiness registration.
    fn raw(&self) -> RawFd;
}
