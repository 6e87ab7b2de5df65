//! End-to-end echo scenario: a real reactor, a real loopback TCP
//! connection, driven from a second thread.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use reactor_io::acceptor::tcp::TcpAcceptor;
use reactor_io::acceptor::Acceptor;
use reactor_io::{ConnState, Connection, Reactor, ReactorCallbacks};

#[test]
fn echo_round_trip_over_real_sockets() {
    let mut acceptor = TcpAcceptor::new();
    acceptor.open(0).expect("bind ephemeral port");
    let listener = acceptor.into_listener().expect("listener present");
    let port = listener.local_addr().unwrap().port();

    let mut config = reactor_io::ReactorConfig::default();
    config.custom_acceptor = Some(listener);
    config.max_concurrent_connections = 8;

    let reactor: Reactor<()> = Reactor::new(config);
    let stop = reactor.stop_handle();

    let server = thread::spawn(move || {
        let callbacks = ReactorCallbacks {
            on_connect: Box::new(|conn: &mut Connection<()>| conn.set_state(ConnState::Read)),
            on_read: Box::new(|conn: &mut Connection<()>| conn.set_state(ConnState::Write)),
            on_write: Box::new(|conn: &mut Connection<()>| conn.set_state(ConnState::Read)),
            on_err: Box::new(|_, _| {}),
        };
        reactor.run(callbacks).expect("reactor run");
    });

    thread::sleep(Duration::from_millis(50));

    let mut client = TcpStream::connect(("127.0.0.1", port)).expect("connect to reactor");
    client.write_all(b"round trip me").expect("write request");
    let mut response = [0u8; "round trip me".len()];
    client.read_exact(&mut response).expect("read echoed response");
    assert_eq!(&response, b"round trip me");

    stop.stop();
    server.join().expect("reactor thread exits cleanly");
}

#[test]
fn admission_burst_stays_within_max_concurrent_connections() {
    let mut acceptor = TcpAcceptor::new();
    acceptor.open(0).expect("bind ephemeral port");
    let listener = acceptor.into_listener().expect("listener present");
    let port = listener.local_addr().unwrap().port();

    let mut config = reactor_io::ReactorConfig::default();
    config.custom_acceptor = Some(listener);
    config.max_concurrent_connections = 8;
    config.max_accepts_per_tick = 4;

    let reactor: Reactor<()> = Reactor::new(config);
    let stop = reactor.stop_handle();

    let server = thread::spawn(move || {
        let callbacks = ReactorCallbacks {
            on_connect: Box::new(|conn: &mut Connection<()>| conn.set_state(ConnState::Read)),
            on_read: Box::new(|conn: &mut Connection<()>| conn.set_state(ConnState::Write)),
            on_write: Box::new(|conn: &mut Connection<()>| conn.set_state(ConnState::Read)),
            on_err: Box::new(|_, _| {}),
        };
        reactor.run(callbacks).expect("reactor run");
    });

    thread::sleep(Duration::from_millis(50));

    let mut clients = Vec::new();
    for _ in 0..20 {
        clients.push(TcpStream::connect(("127.0.0.1", port)).expect("connect"));
    }
    // Give the reactor a few ticks to admit everyone it can.
    thread::sleep(Duration::from_millis(200));

    // Every connected client should still be able to round-trip a byte,
    // confirming the reactor services the admitted set rather than
    // wedging once the burst exceeds max_concurrent_connections.
    for client in clients.iter_mut().take(8) {
        client.write_all(b"x").unwrap();
        let mut b = [0u8; 1];
        client.read_exact(&mut b).unwrap();
        assert_eq!(b, [b'x']);
    }

    stop.stop();
    server.join().expect("reactor thread exits cleanly");
}
