//! The processing client contract
//!
//! Call order guaranteed by every server:
//!
//! 1. `configure` exactly once, with the actual negotiated configuration
//! 2. `process` once per cycle, zero or more times, only after a successful `configure`
//! 3. `shutdown` exactly once, always last, on success and failure paths alike

use thiserror::Error;

use crate::buffers::AudioBuffers;
use crate::config::AudioConfiguration;
use crate::types::Nanos;

/// Returned by a client that cannot work with the negotiated configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ClientError {
    message: String,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An audio processing callback driven by a server
pub trait AudioClient: Send {
    /// Called once before any call to `process`
    ///
    /// The configuration may differ from the one requested (sample rate,
    /// buffer size, extra extensions). Return an error to abort the run.
    fn configure(&mut self, config: &AudioConfiguration) -> Result<(), ClientError>;

    /// Process one cycle
    ///
    /// `time` is the server's drift-corrected timestamp for this buffer, in
    /// nanoseconds on the server clock; clients should use it rather than
    /// reading a clock themselves. `inputs` is empty when there are no input
    /// channels. Every buffer holds exactly `nframes` samples.
    ///
    /// Return `false` to disconnect from the server.
    fn process(
        &mut self,
        time: Nanos,
        inputs: &AudioBuffers,
        outputs: &mut AudioBuffers,
        nframes: usize,
    ) -> bool;

    /// The server is shutting down; no further calls follow
    fn shutdown(&mut self);
}

impl<C: AudioClient + ?Sized> AudioClient for Box<C> {
    fn configure(&mut self, config: &AudioConfiguration) -> Result<(), ClientError> {
        (**self).configure(config)
    }

    fn process(
        &mut self,
        time: Nanos,
        inputs: &AudioBuffers,
        outputs: &mut AudioBuffers,
        nframes: usize,
    ) -> bool {
        (**self).process(time, inputs, outputs, nframes)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}
