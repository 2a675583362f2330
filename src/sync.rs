#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::sync::atomic::{AtomicUsize, Ordering};
    use loom::thread;
    use std::panic::{self, AssertUnwindSafe};

    /// Run `lhs` on a new loom thread and `rhs` on the current one.
    pub(crate) fn join(lhs: impl FnOnce() + Send, rhs: impl FnOnce() + Send) {
        let lhs: Box<dyn FnOnce() + Send + '_> = Box::new(lhs);
        // SAFETY: the thread is joined before returning, even when `rhs`
        // panics, so everything `lhs` borrows outlives it.
        let lhs: Box<dyn FnOnce() + Send + 'static> = unsafe { core::mem::transmute(lhs) };
        let handle = thread::spawn(lhs);
        let rhs = panic::catch_unwind(AssertUnwindSafe(rhs));
        if let Err(payload) = handle.join().and(rhs) {
            panic::resume_unwind(payload);
        }
    }
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use core::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn join(lhs: impl FnOnce() + Send, rhs: impl FnOnce() + Send) {
        rayon::join(lhs, rhs);
    }
}

pub(crate) use imp::*;

/// Fan-in counter: the last of `total` arrivals wins.
///
/// Every producer calls [`arrive`](Self::arrive) once. Exactly one of them,
/// the one whose arrival brings the count to `total`, observes `true` and
/// becomes responsible for whatever waits behind the fan-in. The counter is
/// reset to zero at that moment, so the same `FanIn` can be reused for the
/// next round as long as rounds do not overlap.
///
/// The winning arrival synchronizes with all previous arrivals of the round
/// (`AcqRel`), so everything the other producers wrote before arriving is
/// visible to the winner.
#[derive(Debug)]
pub struct FanIn {
    total: usize,
    arrived: AtomicUsize,
}

impl FanIn {
    /// Create a fan-in expecting `total` arrivals per round.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            arrived: AtomicUsize::new(0),
        }
    }

    /// Number of arrivals expected per round.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Register one arrival. Returns `true` for the arrival that completes
    /// the round.
    ///
    /// With `total == 0` nothing can complete the round and this always
    /// returns `false`.
    pub fn arrive(&self) -> bool {
        let arrived = self.arrived.fetch_add(1, Ordering::AcqRel) + 1;
        if arrived == self.total {
            // All producers of this round are in; nobody else touches the
            // counter until the next round starts.
            self.arrived.store(0, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}
