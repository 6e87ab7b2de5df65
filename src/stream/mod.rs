//! The stream capability: blocking byte I/O used outside the reactor, and
//! the narrower non-blocking surface the reactor drives directly.
//!
//! The source modeled TCP and TLS streams as subclasses of one virtual
//! base. Here they are two concrete types implementing two traits split by
//! blocking behavior rather than by transport, so a TLS overlay composes a
//! TCP stream by ownership instead of inheriting from it.

pub mod tcp;
#[cfg(feature = "tls")]
pub mod tls;

use std::os::unix::io::RawFd;

use crate::config::StreamOptions;
use crate::error::Result;

/// Synchronous, full-satisfaction stream operations: used by HTTP-style
/// helpers, the WebSocket handshake, and the TLS handshake itself. Every
/// method blocks the calling thread until its contract is met or an error
/// occurs; none of these are safe to call from inside a reactor callback.
pub trait BlockingStream {
    /// Resolve `host`, open a connection to `port`, and complete it.
    fn connect(&mut self, host: &str, port: u16) -> Result<()>;

    /// Idempotent; closes the underlying socket if open.
    fn disconnect(&mut self);

    /// Write exactly `buf.len()` bytes, looping over partial writes.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Read exactly `buf.len()` bytes, looping over partial reads.
    /// Fails with [`crate::error::Error::Io`] if the peer closes before
    /// the buffer is filled.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Read until the peer performs an orderly close, appending every
    /// byte received to `out`.
    fn stream_in(&mut self, out: &mut Vec<u8>) -> Result<()>;

    /// Apply (or, if the socket does not yet exist, stage for later
    /// application) the given option set.
    fn set_options(&mut self, opts: StreamOptions) -> Result<()>;

    /// Human-readable peer address, if the stream is connected.
    fn endpoint(&self) -> Option<String>;
}

/// The non-blocking surface the reactor owns and drives directly. A
/// concrete stream type implementing both this and [`BlockingStream`] can
/// be used either standalone (blocking) or admitted into a reactor
/// (non-blocking), but a caller only ever holds the capability it needs.
pub trait NonblockingStream {
    /// Descriptor used to register this stream with the reactor's
    /// readiness object.
    fn platform_socket(&self) -> RawFd;

    /// Read up to `buf.len()` bytes without blocking. `Ok(0)` means an
    /// orderly peer close. A would-block condition is reported as `Ok(0)`
    /// with no bytes written to `buf`; the reactor only calls this after
    /// the kernel has reported readability, so a spurious wake is
    /// harmless.
    fn read_once(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write up to `buf.len()` bytes without blocking, returning the
    /// count actually accepted by the kernel.
    fn write_once(&mut self, buf: &[u8]) -> Result<usize>;

    fn endpoint(&self) -> Option<String>;
}

pub(crate) fn would_block(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
}

pub(crate) fn interrupted(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::Interrupted
}
