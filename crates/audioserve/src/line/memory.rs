//! In-memory mixer
//!
//! Captured audio is whatever was queued with [`MemoryMixer::feed`]; played
//! audio is appended to a byte log. Playback is instantaneous, so the frame
//! position always equals the frames written. Used for loopback testing
//! and for driving a server without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::LineError;
use crate::ext::Device;
use crate::timing::FramePosition;
use crate::types::FrameCount;

use super::{LineFormat, LineMixer, MixerHandle, SourceLine, TargetLine};

#[derive(Debug, Default)]
struct MemoryState {
    capture: VecDeque<u8>,
    played: Vec<u8>,
    frames_played: FrameCount,
    writes: usize,
    opened: usize,
    closed: usize,
    fail_open: bool,
    last_buffer_bytes: Option<usize>,
}

/// Mixer backed by shared in-memory buffers
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryMixer {
    name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMixer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// A device served by this mixer
    pub fn device(&self, max_input_channels: usize, max_output_channels: usize) -> Device {
        Device::new(self.name.clone(), max_input_channels, max_output_channels)
            .with_extension(MixerHandle::new(self.clone()))
    }

    /// Queue bytes for capture lines to read
    pub fn feed(&self, bytes: &[u8]) {
        self.lock().capture.extend(bytes.iter().copied());
    }

    /// Everything written to playback lines so far
    pub fn played(&self) -> Vec<u8> {
        self.lock().played.clone()
    }

    pub fn frames_played(&self) -> FrameCount {
        self.lock().frames_played
    }

    /// Number of `write` calls on playback lines
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Lines opened and not yet closed
    pub fn open_lines(&self) -> usize {
        let state = self.lock();
        state.opened - state.closed
    }

    /// Buffer size requested by the most recent line open
    pub fn last_buffer_bytes(&self) -> Option<usize> {
        self.lock().last_buffer_bytes
    }

    /// Make subsequent opens fail
    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the log from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(&self, format: &LineFormat, buffer_bytes: usize) -> Result<(), LineError> {
        let mut state = self.lock();
        if state.fail_open {
            return Err(LineError::OpenFailed(format!("{}: {}", self.name, format)));
        }
        state.opened += 1;
        state.last_buffer_bytes = Some(buffer_bytes);
        Ok(())
    }
}

impl LineMixer for MemoryMixer {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_target(
        &self,
        format: &LineFormat,
        buffer_bytes: usize,
    ) -> Result<Box<dyn TargetLine>, LineError> {
        self.open(format, buffer_bytes)?;
        Ok(Box::new(MemoryTarget {
            mixer: self.clone(),
            open: true,
        }))
    }

    fn open_source(
        &self,
        format: &LineFormat,
        buffer_bytes: usize,
    ) -> Result<Box<dyn SourceLine>, LineError> {
        self.open(format, buffer_bytes)?;
        Ok(Box::new(MemorySource {
            mixer: self.clone(),
            frame_size: format.frame_size().max(1),
            open: true,
        }))
    }
}

struct MemoryTarget {
    mixer: MemoryMixer,
    open: bool,
}

impl TargetLine for MemoryTarget {
    fn start(&mut self) -> Result<(), LineError> {
        Ok(())
    }

    fn available(&self) -> usize {
        if self.open {
            self.mixer.lock().capture.len()
        } else {
            0
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LineError> {
        if !self.open {
            return Err(LineError::Closed);
        }
        let mut state = self.mixer.lock();
        let n = buf.len().min(state.capture.len());
        for (dst, src) in buf.iter_mut().zip(state.capture.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn close(&mut self) -> Result<(), LineError> {
        if std::mem::replace(&mut self.open, false) {
            self.mixer.lock().closed += 1;
        }
        Ok(())
    }
}

struct MemorySource {
    mixer: MemoryMixer,
    frame_size: usize,
    open: bool,
}

impl FramePosition for MemorySource {
    fn frame_position(&self) -> FrameCount {
        self.mixer.frames_played()
    }
}

impl SourceLine for MemorySource {
    fn start(&mut self) -> Result<(), LineError> {
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, LineError> {
        if !self.open {
            return Err(LineError::Closed);
        }
        let mut state = self.mixer.lock();
        state.played.extend_from_slice(buf);
        state.frames_played += (buf.len() / self.frame_size) as FrameCount;
        state.writes += 1;
        Ok(buf.len())
    }

    fn close(&mut self) -> Result<(), LineError> {
        if std::mem::replace(&mut self.open, false) {
            self.mixer.lock().closed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::SampleEncoding;

    fn stereo() -> LineFormat {
        LineFormat::new(48000.0, 2, SampleEncoding::S16Le)
    }

    #[test]
    fn test_loopback_bytes() {
        let mixer = MemoryMixer::new("mem");
        let mut source = mixer.open_source(&stereo(), 4096).unwrap();
        assert_eq!(source.write(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap(), 8);
        assert_eq!(source.frame_position(), 2);
        assert_eq!(mixer.played(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(mixer.last_buffer_bytes(), Some(4096));
    }

    #[test]
    fn test_capture_reads_partial() {
        let mixer = MemoryMixer::new("mem");
        let mut target = mixer.open_target(&stereo(), 1024).unwrap();
        mixer.feed(&[9, 8, 7]);
        assert_eq!(target.available(), 3);

        let mut buf = [0u8; 4];
        assert_eq!(target.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[9, 8, 7]);
        assert_eq!(target.available(), 0);
    }

    #[test]
    fn test_close_is_counted_once() {
        let mixer = MemoryMixer::new("mem");
        let mut target = mixer.open_target(&stereo(), 1024).unwrap();
        let mut source = mixer.open_source(&stereo(), 1024).unwrap();
        assert_eq!(mixer.open_lines(), 2);

        target.close().unwrap();
        target.close().unwrap();
        source.close().unwrap();
        assert_eq!(mixer.open_lines(), 0);
        assert!(matches!(source.write(&[0; 4]), Err(LineError::Closed)));
    }

    #[test]
    fn test_fail_open() {
        let mixer = MemoryMixer::new("mem");
        mixer.set_fail_open(true);
        assert!(matches!(
            mixer.open_source(&stereo(), 1024),
            Err(LineError::OpenFailed(_))
        ));
        assert_eq!(mixer.open_lines(), 0);
    }
}
