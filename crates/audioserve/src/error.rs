//! Error types for audio servers

use thiserror::Error;

use crate::client::ClientError;

/// Errors raised while validating or negotiating a stream configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Sample rate below 1Hz or not a finite number
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f32),

    /// Buffer size must be at least one frame
    #[error("Invalid buffer size: {0} frames")]
    InvalidBufferSize(usize),

    /// The backend cannot run without real-time output
    #[error("At least one output channel is required")]
    NoOutputChannels,

    /// Requested channel count exceeds what the device offers
    #[error("Device '{device}' supports at most {max} channels, {requested} requested")]
    TooManyChannels {
        device: String,
        max: usize,
        requested: usize,
    },

    /// The backend does not support the requested sample encoding
    #[error("Unsupported sample encoding: {0}")]
    UnsupportedEncoding(String),

    /// The provider rejected the requested shape
    #[error("Configuration not supported: {0}")]
    Unsupported(String),
}

/// Errors raised by host-mixer lines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LineError {
    /// No device matched the requested format
    #[error("No line available for format: {0}")]
    Unavailable(String),

    /// Device exists but the line could not be opened
    #[error("Failed to open line: {0}")]
    OpenFailed(String),

    /// The line was closed while reading or writing
    #[error("Line closed")]
    Closed,

    /// Stream error reported by the host
    #[error("Line stream error: {0}")]
    Stream(String),
}

/// Errors that can occur while running an audio server
#[derive(Error, Debug)]
pub enum ServerError {
    /// `run()` was called on a server that already started
    #[error("Server has already been started")]
    AlreadyStarted,

    /// Stream shape cannot be satisfied
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Hardware line or client handle could not be opened
    #[error("Failed to acquire audio resources: {0}")]
    Acquisition(String),

    /// The client refused the negotiated configuration
    #[error("Client rejected configuration: {0}")]
    ClientRejected(#[from] ClientError),

    /// Line-level failure during setup
    #[error("Line error: {0}")]
    Line(#[from] LineError),

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// No provider registered under the requested library name
    #[error("Unknown audio server provider: {0}")]
    UnknownProvider(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
