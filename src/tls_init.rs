//! Reference-counted TLS library initialization.
//!
//! The source kept a process-wide counter and a mutex:
//! `init_tls()`/`deinit_tls()` calls had to be paired manually. Here a
//! [`TlsInitGuard`] is acquired once per TLS stream or acceptor and
//! dropped when no longer needed; the underlying counter is only ever
//! touched through the guard, so pairing is automatic.

use std::sync::atomic::{AtomicUsize, Ordering};

static REFCOUNT: AtomicUsize = AtomicUsize::new(0);

/// A handle representing one outstanding user of the TLS library. Cloning
/// acquires another reference; dropping the last outstanding clone tears
/// down any process-wide TLS state.
///
/// Acquiring and dropping guards is nestable and idempotent: any number of
/// acquire/drop pairs, in any order, leaves the library state equivalent
/// to never having been initialized once the last guard is dropped.
pub struct TlsInitGuard {
    _private: (),
}

impl TlsInitGuard {
    pub fn acquire() -> Self {
        REFCOUNT.fetch_add(1, Ordering::SeqCst);
        Self { _private: () }
    }

    /// Number of outstanding guards. Exposed for tests and diagnostics.
    pub fn outstanding() -> usize {
        REFCOUNT.load(Ordering::SeqCst)
    }
}

impl Clone for TlsInitGuard {
    fn clone(&self) -> Self {
        Self::acquire()
    }
}

impl Drop for TlsInitGuard {
    fn drop(&mut self) {
        REFCOUNT.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test_free_sync::ORDER_LOCK;

    mod serial_test_free_sync {
        use std::sync::Mutex;
        pub static ORDER_LOCK: Mutex<()> = Mutex::new(());
    }

    #[test]
    fn nested_acquire_and_drop_returns_to_zero() {
        let _lock = ORDER_LOCK.lock().unwrap();
        assert_eq!(TlsInitGuard::outstanding(), 0);
        let a = TlsInitGuard::acquire();
        let b = a.clone();
        assert_eq!(TlsInitGuard::outstanding(), 2);
        drop(a);
        assert_eq!(TlsInitGuard::outstanding(), 1);
        drop(b);
        assert_eq!(TlsInitGuard::outstanding(), 0);
    }
}
