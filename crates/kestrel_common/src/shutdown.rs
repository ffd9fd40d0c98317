//! Interruptible wait signal for retry loops.
//!
//! The registration client sleeps between join attempts; that sleep must be
//! interruptible so a shutdown aborts the wait early without failing the
//! loop. A Condvar-backed wait responds to the interrupt within
//! milliseconds instead of running out the full interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A cooperative interrupt signal.
///
/// Clones share the same underlying flag. Calling `interrupt()` wakes every
/// thread currently blocked in `wait_timeout()`.
#[derive(Clone)]
pub struct InterruptSignal {
    inner: Arc<InterruptInner>,
}

struct InterruptInner {
    flag: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl InterruptSignal {
    /// Create a new signal in the non-interrupted state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InterruptInner {
                flag: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Request interruption. Wakes all waiters immediately.
    pub fn interrupt(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.condvar.notify_all();
    }

    /// Check whether interruption has been requested (non-blocking).
    pub fn is_interrupted(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Sleep for at most `duration`, waking immediately if `interrupt()` is
    /// called. Returns `true` when the wait ended because of an interrupt.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        if self.is_interrupted() {
            return true;
        }
        let guard = self.inner.mutex.lock().unwrap_or_else(|e| e.into_inner());
        let (_guard, _timeout) = self
            .inner
            .condvar
            .wait_timeout(guard, duration)
            .unwrap_or_else(|e| e.into_inner());
        self.is_interrupted()
    }
}

impl Default for InterruptSignal {
    fn default() -> Self {
        Self::new()
    }
}
