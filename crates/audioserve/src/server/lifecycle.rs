//! Lock-free lifecycle shared between the owning thread and controllers
//!
//! ```text
//! New ──run()──► Initializing ──setup ok──► Active ──shutdown──► Closing
//!                     │                        │                    │
//!                     └──setup failed──────────┴────────────────────┴──► Terminated
//! ```
//!
//! `New → Initializing` and `→ Closing` are contested and use compare-and-set.
//! `→ Terminated` is only ever written by the owning thread, so a plain
//! store is enough.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Server lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    New = 0,
    Initializing = 1,
    Active = 2,
    Closing = 3,
    Terminated = 4,
}

impl State {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => State::New,
            1 => State::Initializing,
            2 => State::Active,
            3 => State::Closing,
            _ => State::Terminated,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::New => "New",
            State::Initializing => "Initializing",
            State::Active => "Active",
            State::Closing => "Closing",
            State::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Atomic lifecycle cell
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(State::New as u8),
        }
    }

    /// Current state (safe from any thread)
    #[inline]
    pub fn get(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `New → Initializing`; only the first caller wins
    pub fn begin(&self) -> bool {
        self.transition(State::New, State::Initializing)
    }

    /// `Initializing → Active`; fails if shutdown was requested meanwhile
    pub fn activate(&self) -> bool {
        self.transition(State::Initializing, State::Active)
    }

    /// Request shutdown from any thread
    ///
    /// Idempotent: a no-op once closing or terminated. Requests made during
    /// initialization are honoured by `activate` failing.
    pub fn request_shutdown(&self) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            match State::from_u8(current) {
                State::Closing | State::Terminated => return,
                _ => {}
            }
            match self.state.compare_exchange_weak(
                current,
                State::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Final transition, performed only by the owning thread after teardown
    pub fn terminate(&self) {
        self.state.store(State::Terminated as u8, Ordering::Release);
    }

    /// True while the server still owns resources (`Active` or `Closing`)
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.get(), State::Active | State::Closing)
    }

    /// True while the processing loop should keep running
    #[inline]
    pub fn is_running(&self) -> bool {
        self.get() == State::Active
    }

    fn transition(&self, from: State, to: State) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
