//! Host-mixer line backend
//!
//! A mixer opens byte-oriented lines: a [`TargetLine`] captures from the
//! hardware and is read by the server, a [`SourceLine`] plays whatever the
//! server writes. Lines carry interleaved signed PCM in the encoding of
//! their [`LineFormat`].
//!
//! Lines are not self-pacing in general: a write may return as soon as the
//! bytes fit into the line's buffer. The server therefore paces itself with
//! the configured [`TimingMode`](crate::timing::TimingMode).

mod backend;
#[cfg(feature = "cpal-backend")]
pub mod cpal_mixer;
pub mod memory;
mod provider;

use std::fmt;
use std::sync::Arc;

use crate::convert::SampleEncoding;
use crate::error::LineError;
use crate::timing::FramePosition;

pub use backend::{LineServerBackend, LineSession};
pub use provider::LineProvider;

/// Ratio of line buffer to cycle buffer for non-blocking lines
pub const NON_BLOCKING_RATIO: usize = 16;

/// Upper bound, in frames, for a non-blocking output line buffer
pub const NON_BLOCKING_MAX_FRAMES: usize = 16384;

/// Shape of the bytes carried by a line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFormat {
    pub sample_rate: f32,
    pub channels: usize,
    pub encoding: SampleEncoding,
}

impl LineFormat {
    pub fn new(sample_rate: f32, channels: usize, encoding: SampleEncoding) -> Self {
        Self {
            sample_rate,
            channels,
            encoding,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_size(&self) -> usize {
        self.encoding.frame_size(self.channels)
    }
}

impl fmt::Display for LineFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz, {} channels, {:?}",
            self.sample_rate, self.channels, self.encoding
        )
    }
}

/// A capture line, read by the server
pub trait TargetLine {
    fn start(&mut self) -> Result<(), LineError>;

    /// Bytes that can be read without blocking
    fn available(&self) -> usize;

    /// Read up to `buf.len()` bytes, returning how many were read
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LineError>;

    fn close(&mut self) -> Result<(), LineError>;
}

/// A playback line, written by the server
pub trait SourceLine: FramePosition {
    fn start(&mut self) -> Result<(), LineError>;

    /// Write all of `buf`, blocking while the line buffer is full
    fn write(&mut self, buf: &[u8]) -> Result<usize, LineError>;

    fn close(&mut self) -> Result<(), LineError>;
}

/// Opens lines on one hardware device
///
/// Lines stay on the thread that opened them; only the mixer itself is
/// shared.
pub trait LineMixer: Send + Sync {
    fn name(&self) -> &str;

    /// Open a capture line with a buffer of `buffer_bytes`
    fn open_target(
        &self,
        format: &LineFormat,
        buffer_bytes: usize,
    ) -> Result<Box<dyn TargetLine>, LineError>;

    /// Open a playback line with a buffer of `buffer_bytes`
    fn open_source(
        &self,
        format: &LineFormat,
        buffer_bytes: usize,
    ) -> Result<Box<dyn SourceLine>, LineError>;
}

/// Device extension pointing at the mixer that serves the device
#[derive(Clone)]
pub struct MixerHandle(Arc<dyn LineMixer>);

impl MixerHandle {
    pub fn new(mixer: impl LineMixer + 'static) -> Self {
        Self(Arc::new(mixer))
    }

    pub fn from_shared(mixer: Arc<dyn LineMixer>) -> Self {
        Self(mixer)
    }

    pub fn mixer(&self) -> &dyn LineMixer {
        &*self.0
    }
}

impl fmt::Debug for MixerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MixerHandle").field(&self.0.name()).finish()
    }
}
