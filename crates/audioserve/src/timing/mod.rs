//! Timing synchronization
//!
//! Two concerns live here:
//!
//! - [`TimeFilter`]: a delay-locked loop producing a smoothed, drift-corrected
//!   timestamp per cycle. This is the time handed to clients.
//! - [`Pacer`]: for backends whose writes do not block until the hardware
//!   needs the next buffer, decides when the next cycle may start so output
//!   tracks real time instead of loop speed.
//!
//! Pacing correctness depends only on the comparisons made before and after
//! each sleep, never on how long a sleep actually lasted.

mod clock;
mod filter;
mod pacer;

use serde::{Deserialize, Serialize};

pub use clock::{Clock, SystemClock};
pub use filter::{TimeFilter, DEFAULT_BANDWIDTH};
pub use pacer::{FramePosition, Pacer};

/// Pacing policy for backends that are not self-pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimingMode {
    /// Rely on the line's blocking write
    Blocking,
    /// Wait for the hardware playback position to reach the cycle target
    FramePosition,
    /// Wait for wall-clock time to reach the cycle target
    #[default]
    Estimated,
}

impl TimingMode {
    /// Whether the backend must add its own pacing on top of writes
    pub fn is_paced(self) -> bool {
        self != TimingMode::Blocking
    }
}
