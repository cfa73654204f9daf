//! Wait/notify point between a connecting sensor and its device callback.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Notified,
    TimedOut,
}

#[derive(Default)]
struct RendezvousState {
    generation: u64,
    waiters: usize,
}

/// Cloneable handle; all clones share one wait point.
///
/// `notify` only wakes threads that are already waiting. With no waiter it
/// returns `false` and leaves nothing behind for a later `wait`.
#[derive(Clone, Default)]
pub struct Rendezvous {
    inner: Arc<(Mutex<RendezvousState>, Condvar)>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the next `notify` or until `timeout` passes.
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut state = lock.lock();
        let generation = state.generation;
        state.waiters += 1;
        let outcome = loop {
            if state.generation != generation {
                break WaitOutcome::Notified;
            }
            if cvar.wait_until(&mut state, deadline).timed_out() {
                break if state.generation != generation {
                    WaitOutcome::Notified
                } else {
                    WaitOutcome::TimedOut
                };
            }
        };
        state.waiters -= 1;
        outcome
    }

    /// Wake every current waiter. Returns whether anyone was waiting.
    pub fn notify(&self) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        if state.waiters == 0 {
            return false;
        }
        state.generation = state.generation.wrapping_add(1);
        drop(state);
        cvar.notify_all();
        true
    }

    /// Threads currently blocked in `wait`
    pub fn waiters(&self) -> usize {
        self.inner.0.lock().waiters
    }
}

impl std::fmt::Debug for Rendezvous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendezvous")
            .field("waiters", &self.waiters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_notify_without_waiter_is_noop() {
        let r = Rendezvous::new();
        assert!(!r.notify());
        assert_eq!(r.wait(Duration::from_millis(20)), WaitOutcome::TimedOut);
    }

    #[test]
    fn test_notify_wakes_waiter() {
        let r = Rendezvous::new();
        let waiter = {
            let r = r.clone();
            thread::spawn(move || r.wait(Duration::from_secs(5)))
        };
        while r.waiters() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(r.notify());
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Notified);
        assert_eq!(r.waiters(), 0);
    }

    #[test]
    fn test_wait_times_out() {
        let r = Rendezvous::new();
        let start = Instant::now();
        assert_eq!(r.wait(Duration::from_millis(30)), WaitOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
