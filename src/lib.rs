//! A single-threaded readiness reactor and the stream/acceptor capability
//! it drives.
//!
//! The crate is organized leaf-first: [`buffer`] holds the fixed-capacity
//! ring buffer and its pool, [`stream`] and [`acceptor`] are the blocking
//! and non-blocking I/O capabilities, [`connection`] is the per-socket
//! state machine the reactor owns, [`reactor`] is the tick loop itself,
//! and [`ws`] / [`udp`] are independent consumers of the stream/socket
//! capabilities.

pub mod acceptor;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod reactor;
pub mod stream;
pub mod udp;
pub mod ws;

#[cfg(feature = "tls")]
pub mod tls_init;

pub use buffer::pool::BufferPool;
pub use buffer::ring::RingBuffer;
pub use config::{ReactorConfig, StreamOptions};
pub use connection::{ConnState, Connection};
pub use error::{Error, Result};
pub use reactor::{Reactor, ReactorCallbacks};
