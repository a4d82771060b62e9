//! Stream configuration
//!
//! An [`AudioConfiguration`] describes the shape of a stream: sample rate,
//! channel counts and buffer size, plus any typed extensions. The application
//! builds one to request a shape; the backend builds a new one describing
//! what it actually opened, and only that one is handed to the client.

use std::any::Any;
use std::fmt;

use crate::error::ConfigError;
use crate::ext::{Extension, ExtensionList};

/// Default sample rate (48kHz)
pub const DEFAULT_SAMPLE_RATE: f32 = 48000.0;

/// Default buffer size in frames
/// 512 frames @ 48kHz = ~10.7ms
pub const DEFAULT_BUFFER_SIZE: usize = 512;

/// Immutable description of a negotiated stream shape
#[derive(Debug, Clone)]
pub struct AudioConfiguration {
    sample_rate: f32,
    input_channels: usize,
    output_channels: usize,
    max_buffer_size: usize,
    fixed_buffer_size: bool,
    extensions: ExtensionList,
}

impl AudioConfiguration {
    /// Create a configuration without extensions
    ///
    /// Fails if the sample rate is below 1Hz or the buffer size is zero.
    pub fn new(
        sample_rate: f32,
        input_channels: usize,
        output_channels: usize,
        max_buffer_size: usize,
        fixed_buffer_size: bool,
    ) -> Result<Self, ConfigError> {
        Self::with_extensions(
            sample_rate,
            input_channels,
            output_channels,
            max_buffer_size,
            fixed_buffer_size,
            ExtensionList::new(),
        )
    }

    /// Create a configuration carrying the given extensions
    pub fn with_extensions(
        sample_rate: f32,
        input_channels: usize,
        output_channels: usize,
        max_buffer_size: usize,
        fixed_buffer_size: bool,
        extensions: ExtensionList,
    ) -> Result<Self, ConfigError> {
        if !sample_rate.is_finite() || sample_rate < 1.0 {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }
        if max_buffer_size < 1 {
            return Err(ConfigError::InvalidBufferSize(max_buffer_size));
        }
        Ok(Self {
            sample_rate,
            input_channels,
            output_channels,
            max_buffer_size,
            fixed_buffer_size,
            extensions,
        })
    }

    /// Return a copy with one more extension appended
    pub fn with_extension<T: Extension>(&self, extension: T) -> Self {
        let mut next = self.clone();
        next.extensions.push(extension);
        next
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn input_channel_count(&self) -> usize {
        self.input_channels
    }

    pub fn output_channel_count(&self) -> usize {
        self.output_channels
    }

    /// Buffer size in frames per channel
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// If true every cycle delivers exactly `max_buffer_size` frames,
    /// otherwise between 1 and `max_buffer_size`
    pub fn is_fixed_buffer_size(&self) -> bool {
        self.fixed_buffer_size
    }

    /// Nominal duration of one full buffer in seconds
    pub fn buffer_time(&self) -> f64 {
        self.max_buffer_size as f64 / self.sample_rate as f64
    }

    /// Nominal one-way latency of one full buffer in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.max_buffer_size as f32 / self.sample_rate) * 1000.0
    }

    pub fn extensions(&self) -> &ExtensionList {
        &self.extensions
    }

    /// First extension of type `T`
    pub fn find<T: Any>(&self) -> Option<&T> {
        self.extensions.find::<T>()
    }

    /// All extensions of type `T` in insertion order
    pub fn find_all<T: Any>(&self) -> Vec<&T> {
        self.extensions.find_all::<T>()
    }
}

impl fmt::Display for AudioConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Audio Configuration ---")?;
        writeln!(f, "Sample Rate : {}", self.sample_rate)?;
        writeln!(f, "Input Channels : {}", self.input_channels)?;
        writeln!(f, "Output Channels : {}", self.output_channels)?;
        writeln!(f, "Max Buffer Size : {}", self.max_buffer_size)?;
        writeln!(f, "Fixed Buffer Size : {}", self.fixed_buffer_size)?;
        if !self.extensions.is_empty() {
            writeln!(f, "Extensions -")?;
            for ext in self.extensions.iter() {
                writeln!(f, " -- {:?} ({})", ext, ext.type_name())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::{ClientId, Connections};

    #[test]
    fn test_validation() {
        assert!(AudioConfiguration::new(48000.0, 0, 2, 512, true).is_ok());
        assert_eq!(
            AudioConfiguration::new(0.5, 0, 2, 512, true).unwrap_err(),
            ConfigError::InvalidSampleRate(0.5)
        );
        assert!(AudioConfiguration::new(f32::NAN, 0, 2, 512, true).is_err());
        assert_eq!(
            AudioConfiguration::new(44100.0, 0, 2, 0, true).unwrap_err(),
            ConfigError::InvalidBufferSize(0)
        );
        // Channel-less configurations are legal at this level
        assert!(AudioConfiguration::new(1.0, 0, 0, 1, false).is_ok());
    }

    #[test]
    fn test_with_extension_leaves_original_untouched() {
        let base = AudioConfiguration::new(48000.0, 1, 2, 256, true).unwrap();
        let extended = base.with_extension(ClientId::new("synth"));

        assert!(base.find::<ClientId>().is_none());
        assert_eq!(extended.find::<ClientId>().map(|id| id.identifier()), Some("synth"));
        assert_eq!(extended.max_buffer_size(), 256);
    }

    #[test]
    fn test_timing_helpers() {
        let config = AudioConfiguration::new(48000.0, 0, 2, 512, true).unwrap();
        assert!((config.buffer_time() - 512.0 / 48000.0).abs() < 1e-12);
        assert!((config.latency_ms() - 10.666_667).abs() < 1e-3);
    }

    #[test]
    fn test_display_lists_extensions() {
        let exts = ExtensionList::new().with(Connections::All);
        let config = AudioConfiguration::with_extensions(44100.0, 2, 2, 128, false, exts).unwrap();
        let text = config.to_string();
        assert!(text.contains("Sample Rate : 44100"));
        assert!(text.contains("Fixed Buffer Size : false"));
        assert!(text.contains("All"));
    }
}
