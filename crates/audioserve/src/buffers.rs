//! Per-channel sample buffers handed to the client each cycle
//!
//! Storage is allocated once at the configured maximum buffer size. Each
//! cycle the server sets the working frame count and the client only ever
//! sees slices of exactly that length (RT-safe: no allocation per cycle).

use crate::types::Sample;

/// A set of equally sized per-channel buffers
#[derive(Debug, Clone)]
pub struct AudioBuffers {
    channels: Vec<Vec<Sample>>,
    frames: usize,
    capacity: usize,
}

impl AudioBuffers {
    /// Allocate `channel_count` silent buffers of `capacity` frames
    ///
    /// The working length starts at the full capacity.
    pub fn new(channel_count: usize, capacity: usize) -> Self {
        Self {
            channels: vec![vec![0.0; capacity]; channel_count],
            frames: capacity,
            capacity,
        }
    }

    /// Set the working frame count (clamped to capacity)
    #[inline]
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.capacity);
    }

    /// Frames visible to the client this cycle
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of channels
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Samples of one channel for the current cycle
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index][..self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        let frames = self.frames;
        &mut self.channels[index][..frames]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Sample]> + '_ {
        let frames = self.frames;
        self.channels.iter().map(move |ch| &ch[..frames])
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut [Sample]> + '_ {
        let frames = self.frames;
        self.channels.iter_mut().map(move |ch| &mut ch[..frames])
    }

    /// Zero every channel for the current cycle
    pub fn fill_silence(&mut self) {
        for channel in self.iter_mut() {
            channel.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_length() {
        let mut buffers = AudioBuffers::new(2, 8);
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers.channel(0).len(), 8);

        buffers.set_frames(3);
        assert_eq!(buffers.frames(), 3);
        assert!(buffers.iter().all(|ch| ch.len() == 3));

        buffers.set_frames(100);
        assert_eq!(buffers.frames(), 8);
    }

    #[test]
    fn test_fill_silence() {
        let mut buffers = AudioBuffers::new(3, 4);
        for channel in buffers.iter_mut() {
            channel.fill(0.5);
        }
        buffers.fill_silence();
        assert!(buffers.iter().all(|ch| ch.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn test_empty() {
        let buffers = AudioBuffers::new(0, 512);
        assert!(buffers.is_empty());
        assert_eq!(buffers.iter().count(), 0);
    }
}
