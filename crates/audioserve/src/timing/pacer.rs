//! Catch-up pacing for non-blocking lines
//!
//! After each buffer is written the pacer compares the cycle's target
//! against the clock (Estimated) or the hardware playback position
//! (FramePosition). While more than 1/16 of a buffer ahead it waits: parking
//! in 0.5ms steps while far ahead, yielding once close, so overshoot stays
//! bounded without spinning hot.

use super::{Clock, TimingMode};
use crate::config::AudioConfiguration;
use crate::types::{FrameCount, Nanos, NANOS_PER_SEC};

/// Park duration while far ahead of the target
const PARK_NANOS: Nanos = 500_000;

/// Below this gap (Estimated mode) switch from parking to yielding
const ESTIMATED_PARK_THRESHOLD: Nanos = 1_000_000;

/// Longest wait for a stalled playback position, in buffers
const STALL_BUFFERS: i64 = 4;

/// Reports how many frames the hardware has played so far
pub trait FramePosition {
    fn frame_position(&self) -> FrameCount;
}

/// Per-run pacing state, owned by the real-time thread
#[derive(Debug, Clone)]
pub struct Pacer {
    mode: TimingMode,
    buffer_size: i64,
    buffer_nanos: Nanos,
    /// Frames in one millisecond
    ms_frames: i64,
    start: Nanos,
    cycles: u64,
}

impl Pacer {
    /// Create a pacer for `config`, with cycle 0 starting at `start`
    pub fn new(mode: TimingMode, config: &AudioConfiguration, start: Nanos) -> Self {
        Self {
            mode,
            buffer_size: config.max_buffer_size() as i64,
            buffer_nanos: (config.buffer_time() * NANOS_PER_SEC) as Nanos,
            ms_frames: (config.sample_rate() / 1000.0) as i64,
            start,
            cycles: 0,
        }
    }

    pub fn mode(&self) -> TimingMode {
        self.mode
    }

    /// Buffers paced so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Nominal cycle duration in nanoseconds
    pub fn buffer_nanos(&self) -> Nanos {
        self.buffer_nanos
    }

    /// Wait as required after the current cycle's buffer was written
    pub fn pace<C, P>(&mut self, clock: &C, position: &P)
    where
        C: Clock + ?Sized,
        P: FramePosition + ?Sized,
    {
        match self.mode {
            TimingMode::Estimated => {
                let target = self.start + self.buffer_nanos * (self.cycles as i64 + 1);
                catch_up(clock, self.buffer_nanos / 16, ESTIMATED_PARK_THRESHOLD, None, || {
                    clock.now() - target
                });
            }
            TimingMode::FramePosition => {
                let target = self.cycles as i64 * self.buffer_size;
                // A position that stops moving must not hold the loop forever
                let deadline = clock.now() + STALL_BUFFERS * self.buffer_nanos;
                catch_up(clock, self.buffer_size / 16, self.ms_frames, Some(deadline), || {
                    position.frame_position() as i64 - target
                });
            }
            TimingMode::Blocking => {}
        }
        self.cycles += 1;
    }
}

/// Wait until `difference()` is no more than `tolerance` below zero
///
/// Stops early once the clock passes `deadline`.
fn catch_up<C, F>(
    clock: &C,
    tolerance: i64,
    park_threshold: i64,
    deadline: Option<Nanos>,
    mut difference: F,
) where
    C: Clock + ?Sized,
    F: FnMut() -> i64,
{
    let mut gap = difference();
    while gap < -tolerance {
        if deadline.is_some_and(|deadline| clock.now() >= deadline) {
            log::warn!("Playback position stalled, {} frames behind", -gap);
            return;
        }
        if gap < -park_threshold {
            clock.park(PARK_NANOS);
        } else {
            clock.yield_now();
        }
        gap = difference();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

    /// Clock advanced only by waiting
    struct StepClock {
        now: AtomicI64,
        parks: AtomicU32,
        yields: AtomicU32,
    }

    impl StepClock {
        fn new(now: Nanos) -> Self {
            Self {
                now: AtomicI64::new(now),
                parks: AtomicU32::new(0),
                yields: AtomicU32::new(0),
            }
        }

        fn parks(&self) -> u32 {
            self.parks.load(Ordering::Relaxed)
        }

        fn yields(&self) -> u32 {
            self.yields.load(Ordering::Relaxed)
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> Nanos {
            self.now.load(Ordering::Relaxed)
        }

        fn park(&self, nanos: Nanos) {
            self.parks.fetch_add(1, Ordering::Relaxed);
            self.now.fetch_add(nanos, Ordering::Relaxed);
        }

        fn yield_now(&self) {
            self.yields.fetch_add(1, Ordering::Relaxed);
            self.now.fetch_add(10_000, Ordering::Relaxed);
        }
    }

    /// Playback position derived from the step clock at 48kHz
    struct ClockPosition<'a>(&'a StepClock);

    impl FramePosition for ClockPosition<'_> {
        fn frame_position(&self) -> FrameCount {
            (self.0.now() as f64 * 48000.0 / NANOS_PER_SEC) as FrameCount
        }
    }

    struct NoPosition;

    impl FramePosition for NoPosition {
        fn frame_position(&self) -> FrameCount {
            0
        }
    }

    fn config() -> AudioConfiguration {
        AudioConfiguration::new(48000.0, 0, 2, 480, true).unwrap()
    }

    #[test]
    fn test_estimated_waits_until_target() {
        let clock = StepClock::new(0);
        let mut pacer = Pacer::new(TimingMode::Estimated, &config(), 0);
        assert_eq!(pacer.buffer_nanos(), 10_000_000);

        pacer.pace(&clock, &NoPosition);
        // Target 10ms, tolerance 625us
        assert!(clock.now() >= 10_000_000 - 625_000);
        assert!(clock.now() < 10_000_000);
        assert!(clock.parks() > 0);
        assert!(clock.yields() > 0);
        assert_eq!(pacer.cycles(), 1);
    }

    #[test]
    fn test_estimated_does_not_wait_when_behind() {
        let clock = StepClock::new(50_000_000);
        let mut pacer = Pacer::new(TimingMode::Estimated, &config(), 0);
        pacer.pace(&clock, &NoPosition);
        assert_eq!(clock.now(), 50_000_000);
        assert_eq!(clock.parks() + clock.yields(), 0);
    }

    #[test]
    fn test_estimated_tracks_wall_clock_over_many_cycles() {
        let clock = StepClock::new(0);
        let mut pacer = Pacer::new(TimingMode::Estimated, &config(), 0);
        for _ in 0..1000 {
            pacer.pace(&clock, &NoPosition);
        }
        let expected = 1000 * 10_000_000i64;
        assert!((clock.now() - expected).abs() <= 625_000 + 10_000);
    }

    #[test]
    fn test_frame_position_waits_for_hardware() {
        let clock = StepClock::new(0);
        let position = ClockPosition(&clock);
        let mut pacer = Pacer::new(TimingMode::FramePosition, &config(), 0);

        // First buffer: target frame 0, nothing to wait for
        pacer.pace(&clock, &position);
        assert_eq!(clock.now(), 0);

        // Second buffer: wait until ~480 frames have played (tolerance 30)
        pacer.pace(&clock, &position);
        let played = position.frame_position();
        assert!(played >= 450, "played {}", played);
        assert!(played < 480 + 48);
    }

    #[test]
    fn test_stalled_position_gives_up() {
        let clock = StepClock::new(0);
        let mut pacer = Pacer::new(TimingMode::FramePosition, &config(), 0);
        pacer.pace(&clock, &NoPosition);
        assert_eq!(clock.now(), 0);

        // Hardware never plays: wait about four buffers, then move on
        pacer.pace(&clock, &NoPosition);
        assert!(clock.now() >= 40_000_000);
        assert!(clock.now() <= 40_000_000 + PARK_NANOS);
        assert_eq!(pacer.cycles(), 2);
    }

    #[test]
    fn test_blocking_never_waits() {
        let clock = StepClock::new(0);
        let mut pacer = Pacer::new(TimingMode::Blocking, &config(), 0);
        for _ in 0..10 {
            pacer.pace(&clock, &NoPosition);
        }
        assert_eq!(clock.now(), 0);
        assert_eq!(pacer.cycles(), 10);
    }
}
