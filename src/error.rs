//! Error taxonomy for the reactor and its collaborators.
//!
//! Modeled as a plain enum with manual `Display`/`Error` impls, the way
//! configuration errors are handled elsewhere in this crate: no derive
//! macro, just the variants a caller actually needs to match on.

use std::fmt;
use std::io;
use std::net::AddrParseError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced across the stream, acceptor, reactor, websocket and
/// UDP layers.
///
/// `io::ErrorKind::WouldBlock` is deliberately not represented here: it is
/// a transient non-blocking signal consumed internally by the reactor and
/// by `Stream::read_once`, never propagated to a caller.
#[derive(Debug)]
pub enum Error {
    /// Hostname resolution failed.
    Resolve(String),
    /// Transport connect failed or timed out.
    Connect(io::Error),
    /// Binding the listening socket failed (commonly: port in use).
    Bind(io::Error),
    /// Starting to listen on a bound socket failed.
    Listen(io::Error),
    /// Accepting a connection failed.
    Accept(io::Error),
    /// A non-retriable I/O error during `recv`/`send`.
    Io(io::Error),
    /// A deadline elapsed on a connect or a blocking I/O call.
    Timeout,
    /// TLS handshake or record-layer failure.
    Tls(String),
    /// A WebSocket handshake or frame failed validation.
    Protocol(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Resolve(host) => write!(f, "failed to resolve '{host}'"),
            Error::Connect(e) => write!(f, "connect failed: {e}"),
            Error::Bind(e) => write!(f, "bind failed: {e}"),
            Error::Listen(e) => write!(f, "listen failed: {e}"),
            Error::Accept(e) => write!(f, "accept failed: {e}"),
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Tls(reason) => write!(f, "tls error: {reason}"),
            Error::Protocol(reason) => write!(f, "protocol error: {reason}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connect(e) | Error::Bind(e) | Error::Listen(e) | Error::Accept(e) | Error::Io(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<AddrParseError> for Error {
    fn from(e: AddrParseError) -> Self {
        Error::Resolve(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_does_not_panic_for_every_variant() {
        let variants = vec![
            Error::Resolve("host".into()),
            Error::Connect(io::Error::new(io::ErrorKind::Other, "x")),
            Error::Bind(io::Error::new(io::ErrorKind::Other, "x")),
            Error::Listen(io::Error::new(io::ErrorKind::Other, "x")),
            Error::Accept(io::Error::new(io::ErrorKind::Other, "x")),
            Error::Io(io::Error::new(io::ErrorKind::Other, "x")),
            Error::Timeout,
            Error::Tls("bad cert".into()),
            Error::Protocol("bad frame".into()),
        ];
        for v in variants {
            assert!(!v.to_string().is_empty());
        }
    }
}
