//! Conversion between interleaved fixed-point bytes and per-channel floats
//!
//! Host-mixer lines transport interleaved signed PCM bytes; clients see one
//! float buffer per channel. Sample `i` of channel `c` lives at interleaved
//! position `i * channels + c`.
//!
//! All functions write into caller-provided storage so they can run on the
//! real-time thread without allocating.

use serde::{Deserialize, Serialize};

use crate::buffers::AudioBuffers;
use crate::types::Sample;

/// Signed PCM sample encodings supported by the line backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleEncoding {
    /// 16-bit signed, little-endian (line default)
    #[default]
    S16Le,
    /// 16-bit signed, big-endian
    S16Be,
    /// 24-bit signed packed in 3 bytes, little-endian
    S24Le,
    /// 32-bit signed, little-endian
    S32Le,
}

impl SampleEncoding {
    /// Bytes per sample of one channel
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleEncoding::S16Le | SampleEncoding::S16Be => 2,
            SampleEncoding::S24Le => 3,
            SampleEncoding::S32Le => 4,
        }
    }

    /// Bytes per interleaved frame
    pub const fn frame_size(self, channels: usize) -> usize {
        self.bytes_per_sample() * channels
    }

    /// Bits per sample
    pub const fn bits(self) -> u32 {
        (self.bytes_per_sample() * 8) as u32
    }

    /// Largest positive integer value, mapped to 1.0
    const fn full_scale(self) -> f64 {
        match self {
            SampleEncoding::S16Le | SampleEncoding::S16Be => 32767.0,
            SampleEncoding::S24Le => 8_388_607.0,
            SampleEncoding::S32Le => 2_147_483_647.0,
        }
    }

    /// One quantization step expressed as a float sample
    pub fn quantization_step(self) -> f32 {
        (1.0 / self.full_scale()) as f32
    }

    #[inline]
    fn read(self, bytes: &[u8]) -> i32 {
        match self {
            SampleEncoding::S16Le => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
            SampleEncoding::S16Be => i16::from_be_bytes([bytes[0], bytes[1]]) as i32,
            SampleEncoding::S24Le => {
                let sign = if bytes[2] & 0x80 != 0 { 0xFF } else { 0x00 };
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], sign])
            }
            SampleEncoding::S32Le => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    #[inline]
    fn write(self, value: i32, out: &mut [u8]) {
        match self {
            SampleEncoding::S16Le => out[..2].copy_from_slice(&(value as i16).to_le_bytes()),
            SampleEncoding::S16Be => out[..2].copy_from_slice(&(value as i16).to_be_bytes()),
            SampleEncoding::S24Le => out[..3].copy_from_slice(&value.to_le_bytes()[..3]),
            SampleEncoding::S32Le => out[..4].copy_from_slice(&value.to_le_bytes()),
        }
    }
}

/// Decode fixed-point bytes to normalized floats
///
/// Returns the number of samples written: the smaller of the whole samples
/// in `bytes` and `out.len()`.
pub fn decode(bytes: &[u8], encoding: SampleEncoding, out: &mut [Sample]) -> usize {
    let scale = encoding.full_scale();
    let mut count = 0;
    for (chunk, sample) in bytes
        .chunks_exact(encoding.bytes_per_sample())
        .zip(out.iter_mut())
    {
        *sample = (encoding.read(chunk) as f64 / scale) as Sample;
        count += 1;
    }
    count
}

/// Encode normalized floats to fixed-point bytes, clipping to -1.0..=1.0
///
/// Returns the number of samples written.
pub fn encode(samples: &[Sample], encoding: SampleEncoding, out: &mut [u8]) -> usize {
    let scale = encoding.full_scale();
    let mut count = 0;
    for (sample, chunk) in samples
        .iter()
        .zip(out.chunks_exact_mut(encoding.bytes_per_sample()))
    {
        let clipped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
        let value = (clipped as f64 * scale).round() as i32;
        encoding.write(value, chunk);
        count += 1;
    }
    count
}

/// Split interleaved samples into per-channel buffers
///
/// Fills `buffers.frames()` frames of every channel.
pub fn deinterleave(interleaved: &[Sample], buffers: &mut AudioBuffers) {
    let channels = buffers.len();
    for (c, channel) in buffers.iter_mut().enumerate() {
        for (i, sample) in channel.iter_mut().enumerate() {
            *sample = interleaved[i * channels + c];
        }
    }
}

/// Merge per-channel buffers into one interleaved sequence
pub fn interleave(buffers: &AudioBuffers, interleaved: &mut [Sample]) {
    let channels = buffers.len();
    for (c, channel) in buffers.iter().enumerate() {
        for (i, sample) in channel.iter().enumerate() {
            interleaved[i * channels + c] = *sample;
        }
    }
}

/// Decode and de-interleave in one step, using `scratch` as staging
pub fn to_float(
    bytes: &[u8],
    encoding: SampleEncoding,
    scratch: &mut [Sample],
    buffers: &mut AudioBuffers,
) {
    let samples = buffers.frames() * buffers.len();
    decode(&bytes[..samples * encoding.bytes_per_sample()], encoding, &mut scratch[..samples]);
    deinterleave(&scratch[..samples], buffers);
}

/// Interleave and encode in one step, using `scratch` as staging
///
/// Returns the number of bytes written.
pub fn to_bytes(
    buffers: &AudioBuffers,
    encoding: SampleEncoding,
    scratch: &mut [Sample],
    bytes: &mut [u8],
) -> usize {
    let samples = buffers.frames() * buffers.len();
    interleave(buffers, &mut scratch[..samples]);
    encode(&scratch[..samples], encoding, bytes) * encoding.bytes_per_sample()
}

/// Pre-allocated byte and float staging for one direction of a line
pub struct FrameConverter {
    encoding: SampleEncoding,
    channels: usize,
    scratch: Vec<Sample>,
    bytes: Vec<u8>,
}

impl FrameConverter {
    /// Allocate staging for up to `max_frames` frames of `channels` channels
    pub fn new(encoding: SampleEncoding, channels: usize, max_frames: usize) -> Self {
        Self {
            encoding,
            channels,
            scratch: vec![0.0; max_frames * channels],
            bytes: vec![0; max_frames * encoding.frame_size(channels)],
        }
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    /// Bytes needed for `frames` frames
    pub fn byte_len(&self, frames: usize) -> usize {
        frames * self.encoding.frame_size(self.channels)
    }

    /// Staging bytes for `frames` frames, to be filled from a line
    pub fn bytes_mut(&mut self, frames: usize) -> &mut [u8] {
        let len = self.byte_len(frames);
        &mut self.bytes[..len]
    }

    /// Decode the staged bytes into `buffers` (uses `buffers.frames()`)
    pub fn decode_into(&mut self, buffers: &mut AudioBuffers) {
        let len = self.byte_len(buffers.frames());
        to_float(&self.bytes[..len], self.encoding, &mut self.scratch, buffers);
    }

    /// Encode `buffers` into the staging bytes and return them
    pub fn encode_from(&mut self, buffers: &AudioBuffers) -> &[u8] {
        let written = to_bytes(buffers, self.encoding, &mut self.scratch, &mut self.bytes);
        &self.bytes[..written]
    }
}
