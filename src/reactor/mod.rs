//! The single-threaded readiness reactor: the core of this crate.
//!
//! One thread owns a `mio::Poll`, a slab of connections, and a buffer
//! pool. Each tick waits on readiness, admits new connections up to a
//! per-tick cap, services ready connections by reading into or writing
//! out of their ring buffer, and reaps any connection that reached
//! `Dying`. See [`crate::connection`] for the per-connection state
//! machine this loop drives.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::TcpListener as StdTcpListener;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use tracing::{debug, warn};

use crate::acceptor::tcp::TcpAcceptor;
use crate::acceptor::Acceptor;
use crate::buffer::pool::BufferPool;
use crate::config::ReactorConfig;
use crate::connection::{ConnState, Connection};
use crate::error::Result;

/// Reserved token for the listening socket; connection tokens are slab
/// keys and therefore always `< usize::MAX`.
const LISTENER_TOKEN: Token = Token(usize::MAX);

/// The four callbacks a reactor dispatches. `on_err` must not panic; the
/// reactor guarantees the affected connection is torn down within the
/// same tick regardless of what the callback does.
pub struct ReactorCallbacks<Ctx> {
    pub on_connect: Box<dyn FnMut(&mut Connection<Ctx>)>,
    pub on_read: Box<dyn FnMut(&mut Connection<Ctx>)>,
    pub on_write: Box<dyn FnMut(&mut Connection<Ctx>)>,
    pub on_err: Box<dyn FnMut(&mut Connection<Ctx>, &str)>,
}

/// A cooperative flag any thread can use to ask a running reactor to stop
/// after its current tick.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct Slot<Ctx> {
    stream: TcpStream,
    conn: Connection<Ctx>,
}

/// The reactor itself. Construction does not bind or listen; that happens
/// in [`Reactor::run`], so a `Reactor` can be handed a `stop_handle()`
/// before it ever starts.
pub struct Reactor<Ctx = ()> {
    config: ReactorConfig,
    stopped: Arc<AtomicBool>,
    _ctx: std::marker::PhantomData<Ctx>,
}

impl<Ctx> Reactor<Ctx>
where
    Ctx: Default,
{
    pub fn new(config: ReactorConfig) -> Self {
        Self {
            config,
            stopped: Arc::new(AtomicBool::new(false)),
            _ctx: std::marker::PhantomData,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stopped))
    }

    /// Run the tick loop until [`StopHandle::stop`] is called. Returns
    /// once the current tick completes after the flag is observed.
    pub fn run(mut self, mut cb: ReactorCallbacks<Ctx>) -> Result<()> {
        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(self.config.max_concurrent_connections.max(64));

        let owns_listener = self.config.custom_acceptor.is_none();
        let std_listener: StdTcpListener = match self.config.custom_acceptor.take() {
            Some(listener) => listener,
            None => {
                let mut acceptor = TcpAcceptor::new();
                acceptor.open(self.config.port)?;
                acceptor.into_listener().expect("just opened")
            }
        };
        std_listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(std_listener);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let mut pool = BufferPool::new(self.config.ring_buffer_capacity);
        pool.prepool(self.config.max_concurrent_connections);

        let mut connections: Slab<Slot<Ctx>> = Slab::with_capacity(self.config.max_concurrent_connections);
        let dirty: Rc<RefCell<VecDeque<Token>>> = Rc::new(RefCell::new(VecDeque::new()));

        while !self.stopped.load(Ordering::Relaxed) {
            match poll.poll(&mut events, Some(Duration::from_millis(self.config.poll_timeout_ms))) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let reason = format!("reactor poll failed: {e}");
                    notify_all(&mut connections, &mut cb.on_err, &reason);
                    return Err(e.into());
                }
            }

            for event in events.iter() {
                if event.token() == LISTENER_TOKEN {
                    admit(
                        &self.config,
                        &mut poll,
                        &mut listener,
                        &mut connections,
                        &mut pool,
                        &dirty,
                        &mut cb.on_connect,
                        &mut cb.on_err,
                    );
                    drain_dirty(&mut poll, &mut connections, &dirty);
                    continue;
                }

                let key = event.token().0;
                if !connections.contains(key) {
                    continue;
                }

                if event.is_readable() {
                    handle_readable(key, &mut connections, &mut cb);
                }
                if connections.contains(key) && event.is_writable() {
                    handle_writable(key, &mut connections, &mut cb);
                }
                if connections.contains(key) && (event.is_error() || event.is_read_closed()) {
                    mark_dying(&mut connections, key, &mut cb.on_err, "peer hangup or socket error");
                }

                drain_dirty(&mut poll, &mut connections, &dirty);
            }

            reap(&mut poll, &mut connections, &mut pool);
        }

        if owns_listener {
            let _ = poll.registry().deregister(&mut listener);
        }
        Ok(())
    }
}

/// Accept up to `max_accepts_per_tick` pending connections, admitting
/// each into the slab and invoking `on_connect`. Stops early, without
/// draining the backlog, once the slab is at `max_concurrent_connections`:
/// the remaining pending connections stay queued in the kernel backlog for
/// a later tick rather than being accepted and immediately dropped.
fn admit<Ctx>(
    config: &ReactorConfig,
    poll: &mut Poll,
    listener: &mut TcpListener,
    connections: &mut Slab<Slot<Ctx>>,
    pool: &mut BufferPool,
    dirty: &Rc<RefCell<VecDeque<Token>>>,
    on_connect: &mut Box<dyn FnMut(&mut Connection<Ctx>)>,
    on_err: &mut Box<dyn FnMut(&mut Connection<Ctx>, &str)>,
) where
    Ctx: Default,
{
    for _ in 0..config.max_accepts_per_tick {
        if connections.len() >= config.max_concurrent_connections {
            debug!("at capacity: leaving remaining backlog queued");
            return;
        }

        let (mut stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!(error = %e, "accept failed");
                notify_all(connections, on_err, &format!("accept failed: {e}"));
                return;
            }
        };

        let _ = stream.set_nodelay(true);
        let buffer = pool.allocate();
        let entry = connections.vacant_entry();
        let token = Token(entry.key());

        if let Err(e) = poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)
        {
            warn!(error = %e, "failed to register accepted connection");
            pool.release(buffer);
            continue;
        }

        let mut conn = Connection::new(token, buffer, Ctx::default());
        let dirty_for_conn = Rc::clone(dirty);
        conn.set_observer(Box::new(move |t, _state| {
            dirty_for_conn.borrow_mut().push_back(t);
        }));
        entry.insert(Slot { stream, conn });

        debug!(peer = %peer, token = token.0, "admitted connection");
        on_connect(&mut connections[token.0].conn);
    }
}

/// Drain every connection the most recent callback marked dirty,
/// re-registering its readiness interest (or leaving it for `reap` if it
/// went to `Dying`).
fn drain_dirty<Ctx>(poll: &mut Poll, connections: &mut Slab<Slot<Ctx>>, dirty: &Rc<RefCell<VecDeque<Token>>>) {
    loop {
        let token = match dirty.borrow_mut().pop_front() {
            Some(t) => t,
            None => break,
        };
        let key = token.0;
        if !connections.contains(key) {
            continue;
        }
        let slot = &mut connections[key];
        let interest = match slot.conn.state() {
            ConnState::Read => Some(Interest::READABLE),
            ConnState::Write => Some(Interest::WRITABLE),
            ConnState::Idle | ConnState::Dying => None,
        };
        if let Some(interest) = interest {
            let _ = poll.registry().reregister(&mut slot.stream, token, interest);
        }
    }
}

fn handle_readable<Ctx>(key: usize, connections: &mut Slab<Slot<Ctx>>, cb: &mut ReactorCallbacks<Ctx>) {
    let slot = &mut connections[key];
    if slot.conn.state() != ConnState::Read {
        return;
    }

    loop {
        let span_len = slot.conn.buffer().free_space();
        if span_len == 0 {
            // Backpressure: the ring buffer is full and the application
            // has not drained it. Stop reading until it does.
            break;
        }

        let mut scratch = vec![0u8; span_len];
        match std::io::Read::read(&mut slot.stream, &mut scratch) {
            Ok(0) => {
                mark_dying(connections, key, &mut cb.on_err, "peer closed connection");
                return;
            }
            Ok(n) => {
                let slot = &mut connections[key];
                slot.conn.buffer_mut().write(&scratch[..n]);
                (cb.on_read)(&mut slot.conn);
                slot.conn.buffer_mut().compact();
                if n < span_len || slot.conn.state() != ConnState::Read {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                mark_dying(connections, key, &mut cb.on_err, &e.to_string());
                return;
            }
        }
    }
}

fn handle_writable<Ctx>(key: usize, connections: &mut Slab<Slot<Ctx>>, cb: &mut ReactorCallbacks<Ctx>) {
    let slot = &mut connections[key];
    if slot.conn.state() != ConnState::Write {
        return;
    }

    loop {
        let span = slot.conn.buffer().reserve_read().to_vec();
        if span.is_empty() {
            (cb.on_write)(&mut connections[key].conn);
            break;
        }
        match std::io::Write::write(&mut slot.stream, &span) {
            Ok(n) => {
                let slot = &mut connections[key];
                slot.conn.buffer_mut().commit_read(n);
                slot.conn.buffer_mut().compact();
                if n < span.len() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                mark_dying(connections, key, &mut cb.on_err, &e.to_string());
                return;
            }
        }
    }
}

/// Notify every live connection via `on_err` without touching its state.
/// Used for failures that are not specific to one connection (a fatal
/// `poll()` error, a broken listener) but that the application still needs
/// to learn about through the one channel it watches for failures.
fn notify_all<Ctx>(
    connections: &mut Slab<Slot<Ctx>>,
    on_err: &mut Box<dyn FnMut(&mut Connection<Ctx>, &str)>,
    reason: &str,
) {
    for (_, slot) in connections.iter_mut() {
        on_err(&mut slot.conn, reason);
    }
}

fn mark_dying<Ctx>(
    connections: &mut Slab<Slot<Ctx>>,
    key: usize,
    on_err: &mut Box<dyn FnMut(&mut Connection<Ctx>, &str)>,
    reason: &str,
) {
    if !connections.contains(key) {
        return;
    }
    let slot = &mut connections[key];
    if slot.conn.state() == ConnState::Dying {
        return;
    }
    on_err(&mut slot.conn, reason);
    if slot.conn.state() != ConnState::Dying {
        slot.conn.set_state(ConnState::Dying);
    }
}

/// Deregister, close, and return buffers for every connection that
/// reached `Dying` this tick.
fn reap<Ctx>(poll: &mut Poll, connections: &mut Slab<Slot<Ctx>>, pool: &mut BufferPool) {
    let dying: Vec<usize> = connections
        .iter()
        .filter(|(_, slot)| slot.conn.state() == ConnState::Dying)
        .map(|(key, _)| key)
        .collect();

    for key in dying {
        let mut slot = connections.remove(key);
        let _ = poll.registry().deregister(&mut slot.stream);
        let buffer = slot.conn.take_buffer();
        pool.release(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream as StdTcpStream;
    use std::thread;
    use std::time::Duration as StdDuration;

    #[test]
    fn echo_scenario_roundtrips_bytes() {
        let mut config = ReactorConfig::default();
        config.port = 0;
        config.max_concurrent_connections = 4;

        let acceptor_listener = {
            let mut acceptor = TcpAcceptor::new();
            acceptor.open(0).unwrap();
            acceptor.into_listener().unwrap()
        };
        let bound_port = acceptor_listener.local_addr().unwrap().port();
        config.custom_acceptor = Some(acceptor_listener);

        let reactor: Reactor<()> = Reactor::new(config);
        let stop = reactor.stop_handle();

        let handle = thread::spawn(move || {
            let callbacks = ReactorCallbacks {
                on_connect: Box::new(|conn| conn.set_state(ConnState::Read)),
                on_read: Box::new(|conn| conn.set_state(ConnState::Write)),
                on_write: Box::new(|conn| conn.set_state(ConnState::Read)),
                on_err: Box::new(|_conn, _reason| {}),
            };
            reactor.run(callbacks).unwrap();
        });

        thread::sleep(StdDuration::from_millis(50));
        let mut client = StdTcpStream::connect(("127.0.0.1", bound_port)).unwrap();
        client.write_all(b"hello").unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        stop.stop();
        handle.join().unwrap();
    }
}
