//! Per-socket state the reactor drives: the `{Idle, Read, Write, Dying}`
//! state machine, an owned ring buffer, and an explicit observer the
//! reactor installs at admission time.
//!
//! The observer replaces a global "state changed" hook: instead of every
//! connection in the process notifying one shared function, each
//! connection carries its own closure, installed once by whatever admitted
//! it, and called only for that connection's own transitions.

use mio::Token;

use crate::buffer::ring::RingBuffer;

/// Connection lifecycle state.
///
/// `Idle` is the state immediately after admission, before `on_connect`
/// has run. `Dying` is terminal; a connection in this state is reaped on
/// the next tick and never observed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Read,
    Write,
    Dying,
}

/// Called whenever a connection's state changes, with the connection's
/// identity and its new state. The reactor installs one of these per
/// connection at admission time so it can re-register the descriptor's
/// readiness interest immediately, without a process-wide hook.
pub type StateObserver = Box<dyn FnMut(Token, ConnState)>;

/// A single socket's reactor-owned state.
///
/// Identity is the `mio::Token` the reactor assigned on admission; two
/// connections are equal iff their tokens match.
pub struct Connection<Ctx = ()> {
    token: Token,
    state: ConnState,
    buffer: Option<RingBuffer>,
    observer: Option<StateObserver>,
    /// Opaque, application-assigned context. Callbacks may read and
    /// mutate it but must not assume it outlives the connection.
    pub ctx: Ctx,
}

impl<Ctx> Connection<Ctx> {
    pub fn new(token: Token, buffer: RingBuffer, ctx: Ctx) -> Self {
        Self {
            token,
            state: ConnState::Idle,
            buffer: Some(buffer),
            observer: None,
            ctx,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Install (or replace) the per-connection state-change observer.
    pub fn set_observer(&mut self, observer: StateObserver) {
        self.observer = Some(observer);
    }

    /// Transition to `new_state`, notifying the installed observer if any.
    ///
    /// A no-op transition (`new_state == state`) is rejected in debug
    /// builds, mirroring the invariant that callbacks request a genuine
    /// change; release builds tolerate it silently.
    pub fn set_state(&mut self, new_state: ConnState) {
        debug_assert_ne!(
            new_state, self.state,
            "set_state called with the connection's current state"
        );
        if new_state == self.state {
            return;
        }
        self.state = new_state;
        if let Some(observer) = self.observer.as_mut() {
            observer(self.token, new_state);
        }
    }

    pub fn buffer(&self) -> &RingBuffer {
        self.buffer.as_ref().expect("connection buffer already taken")
    }

    pub fn buffer_mut(&mut self) -> &mut RingBuffer {
        self.buffer.as_mut().expect("connection buffer already taken")
    }

    /// Remove the owned buffer, for returning it to the pool on reap.
    /// Panics if already taken; a connection is reaped at most once.
    pub fn take_buffer(&mut self) -> RingBuffer {
        self.buffer.take().expect("connection buffer already taken")
    }
}

impl<Ctx> PartialEq for Connection<Ctx> {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn state_changes_notify_the_installed_observer() {
        let seen: Rc<RefCell<Vec<ConnState>>> = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);

        let mut conn = Connection::new(Token(1), RingBuffer::new(16), ());
        conn.set_observer(Box::new(move |_token, state| seen2.borrow_mut().push(state)));

        conn.set_state(ConnState::Read);
        conn.set_state(ConnState::Write);
        conn.set_state(ConnState::Dying);

        assert_eq!(
            *seen.borrow(),
            vec![ConnState::Read, ConnState::Write, ConnState::Dying]
        );
    }

    #[test]
    fn identity_is_by_token() {
        let a = Connection::new(Token(5), RingBuffer::new(16), ());
        let b = Connection::new(Token(5), RingBuffer::new(16), ());
        let c = Connection::new(Token(6), RingBuffer::new(16), ());
        assert!(a == b);
        assert!(a != c);
    }

    #[test]
    fn take_buffer_removes_ownership() {
        let mut conn = Connection::new(Token(1), RingBuffer::new(16), ());
        let buf = conn.take_buffer();
        assert_eq!(buf.capacity(), 16);
    }
}
