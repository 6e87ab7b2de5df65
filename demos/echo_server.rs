//! A minimal reactor-driven echo server: admits connections, reads
//! whatever bytes arrive, and writes them straight back once the peer
//! stops sending (then reads again). Demonstrates the scenario-1 contract
//! of the reactor: `on_connect -> Read`, `on_read -> Write`, `on_write ->
//! Read`.
//!
//! Not part of the library: this is a thin illustration of wiring
//! [`reactor_io::Reactor`] up to real callbacks, kept separate from the
//! crate so the core stays a library.

use reactor_io::{ConnState, Connection, Reactor, ReactorCallbacks};
use tracing::info;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let config = match reactor_io::config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let reactor_config = (&config).into();

    info!(port = config.port, "starting echo demo reactor");

    let reactor: Reactor<()> = Reactor::new(reactor_config);
    let callbacks = ReactorCallbacks {
        on_connect: Box::new(|conn: &mut Connection<()>| conn.set_state(ConnState::Read)),
        on_read: Box::new(|conn: &mut Connection<()>| conn.set_state(ConnState::Write)),
        on_write: Box::new(|conn: &mut Connection<()>| conn.set_state(ConnState::Read)),
        on_err: Box::new(|_conn, reason| info!(reason, "connection error")),
    };

    if let Err(e) = reactor.run(callbacks) {
        eprintln!("reactor exited: {e}");
        std::process::exit(1);
    }
}
