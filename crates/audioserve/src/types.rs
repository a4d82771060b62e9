//! Common types shared across the crate

/// Audio sample type seen by clients (32-bit float, nominal range -1.0..=1.0)
pub type Sample = f32;

/// Frame counter used for hardware playback positions
pub type FrameCount = u64;

/// Timestamps handed to clients, in nanoseconds on the server clock
pub type Nanos = i64;

/// Nanoseconds per second
pub const NANOS_PER_SEC: f64 = 1e9;
