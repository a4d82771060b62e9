//! Monotonic clock abstraction used by the run loop and the pacer

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::types::Nanos;

/// Source of monotonic time and fine-grained waiting
///
/// Implementations may substitute any sleep primitive; callers re-check the
/// clock after every wait.
pub trait Clock: Send {
    /// Nanoseconds since an arbitrary fixed origin
    fn now(&self) -> Nanos;

    /// Suspend the calling thread for roughly `nanos`
    fn park(&self, nanos: Nanos);

    /// Give up the rest of the time slice
    fn yield_now(&self);
}

/// Process-wide origin so timestamps from different servers are comparable
fn origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

/// Real clock backed by `Instant` and `thread::park_timeout`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Nanos {
        origin().elapsed().as_nanos() as Nanos
    }

    fn park(&self, nanos: Nanos) {
        if nanos > 0 {
            // Spurious wakeups are fine: the pacer re-checks the target
            std::thread::park_timeout(Duration::from_nanos(nanos as u64));
        }
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }
}
