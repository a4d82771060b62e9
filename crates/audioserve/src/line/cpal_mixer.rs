//! Lines over CPAL streams
//!
//! CPAL is callback-driven while lines are read and written by the server
//! thread. Each line bridges the two with a lock-free SPSC ring of float
//! samples:
//!
//! ```text
//! SourceLine::write ──encode──► rtrb ──pop──► CPAL output callback
//! CPAL input callback ──push──► rtrb ──pop──► TargetLine::read
//! ```
//!
//! The ring holds the line buffer, so a write blocks only once the line
//! buffer is full. The output callback counts the frames it plays, which is
//! what the frame-position pacing waits on.
//!
//! A stream error raises the line's fault flag; every later read or write
//! fails, which ends the server loop. A write that finds the ring full for
//! longer than a few line buffers fails the same way, so a device that
//! silently stops draining cannot block the server thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};

use crate::convert::{decode, encode, SampleEncoding};
use crate::error::LineError;
use crate::ext::Device;
use crate::timing::FramePosition;
use crate::types::{FrameCount, Sample};

use super::{LineFormat, LineMixer, MixerHandle, SourceLine, TargetLine};

/// Wait while the ring is full
const WRITE_WAIT: Duration = Duration::from_micros(500);

/// Longest a write may wait on a full ring, in line buffers
const STALL_BUFFERS: f64 = 4.0;

/// Mixer for one CPAL device
pub struct CpalMixer {
    name: String,
    device: cpal::Device,
}

impl CpalMixer {
    pub fn new(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self { name, device }
    }

    fn stream_config(format: &LineFormat) -> StreamConfig {
        StreamConfig {
            channels: format.channels as u16,
            sample_rate: SampleRate(format.sample_rate as u32),
            buffer_size: BufferSize::Default,
        }
    }
}

impl LineMixer for CpalMixer {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_target(
        &self,
        format: &LineFormat,
        buffer_bytes: usize,
    ) -> Result<Box<dyn TargetLine>, LineError> {
        let capacity = (buffer_bytes / format.encoding.bytes_per_sample()).max(format.channels);
        let (mut producer, consumer) = rtrb::RingBuffer::<Sample>::new(capacity);
        let fault = Arc::new(AtomicBool::new(false));

        let name = self.name.clone();
        let raised = Arc::clone(&fault);
        let stream = self
            .device
            .build_input_stream(
                &Self::stream_config(format),
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        // Server fell behind: drop the newest samples
                        if producer.push(sample).is_err() {
                            break;
                        }
                    }
                },
                move |err| {
                    log::error!("Input stream error on '{}': {}", name, err);
                    raised.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| LineError::OpenFailed(format!("{}: {}", self.name, e)))?;

        Ok(Box::new(CpalTarget {
            stream: Some(stream),
            fault,
            consumer,
            encoding: format.encoding,
            scratch: Vec::with_capacity(capacity),
        }))
    }

    fn open_source(
        &self,
        format: &LineFormat,
        buffer_bytes: usize,
    ) -> Result<Box<dyn SourceLine>, LineError> {
        let capacity = (buffer_bytes / format.encoding.bytes_per_sample()).max(format.channels);
        let (producer, mut consumer) = rtrb::RingBuffer::<Sample>::new(capacity);
        let played = Arc::new(AtomicU64::new(0));
        let fault = Arc::new(AtomicBool::new(false));

        let channels = format.channels.max(1);
        let position = Arc::clone(&played);
        let name = self.name.clone();
        let raised = Arc::clone(&fault);
        let stream = self
            .device
            .build_output_stream(
                &Self::stream_config(format),
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    for out in data.iter_mut() {
                        // Underrun: play silence
                        *out = consumer.pop().unwrap_or(0.0);
                    }
                    position.fetch_add((data.len() / channels) as u64, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Output stream error on '{}': {}", name, err);
                    raised.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| LineError::OpenFailed(format!("{}: {}", self.name, e)))?;

        Ok(Box::new(CpalSource {
            stream: Some(stream),
            fault,
            max_waits: stall_waits(capacity / channels, format.sample_rate),
            producer,
            played,
            encoding: format.encoding,
            scratch: Vec::with_capacity(capacity),
        }))
    }
}

struct CpalTarget {
    stream: Option<Stream>,
    fault: Arc<AtomicBool>,
    consumer: rtrb::Consumer<Sample>,
    encoding: SampleEncoding,
    scratch: Vec<Sample>,
}

impl TargetLine for CpalTarget {
    fn start(&mut self) -> Result<(), LineError> {
        let stream = self.stream.as_ref().ok_or(LineError::Closed)?;
        stream.play().map_err(|e| LineError::Stream(e.to_string()))
    }

    fn available(&self) -> usize {
        self.consumer.slots() * self.encoding.bytes_per_sample()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LineError> {
        if self.stream.is_none() {
            return Err(LineError::Closed);
        }
        check_fault(&self.fault)?;
        let wanted = buf.len() / self.encoding.bytes_per_sample();
        self.scratch.clear();
        while self.scratch.len() < wanted {
            match self.consumer.pop() {
                Ok(sample) => self.scratch.push(sample),
                Err(_) => break,
            }
        }
        Ok(encode(&self.scratch, self.encoding, buf) * self.encoding.bytes_per_sample())
    }

    fn close(&mut self) -> Result<(), LineError> {
        if let Some(stream) = self.stream.take() {
            stream.pause().map_err(|e| LineError::Stream(e.to_string()))?;
        }
        Ok(())
    }
}

struct CpalSource {
    stream: Option<Stream>,
    fault: Arc<AtomicBool>,
    /// Full-ring waits allowed per write
    max_waits: u32,
    producer: rtrb::Producer<Sample>,
    played: Arc<AtomicU64>,
    encoding: SampleEncoding,
    scratch: Vec<Sample>,
}

impl FramePosition for CpalSource {
    fn frame_position(&self) -> FrameCount {
        self.played.load(Ordering::Relaxed)
    }
}

impl SourceLine for CpalSource {
    fn start(&mut self) -> Result<(), LineError> {
        let stream = self.stream.as_ref().ok_or(LineError::Closed)?;
        stream.play().map_err(|e| LineError::Stream(e.to_string()))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, LineError> {
        if self.stream.is_none() {
            return Err(LineError::Closed);
        }
        check_fault(&self.fault)?;
        let samples = buf.len() / self.encoding.bytes_per_sample();
        self.scratch.resize(samples, 0.0);
        decode(buf, self.encoding, &mut self.scratch);

        push_all(&mut self.producer, &self.scratch, &self.fault, self.max_waits)?;
        Ok(buf.len())
    }

    fn close(&mut self) -> Result<(), LineError> {
        if let Some(stream) = self.stream.take() {
            stream.pause().map_err(|e| LineError::Stream(e.to_string()))?;
        }
        Ok(())
    }
}

fn check_fault(fault: &AtomicBool) -> Result<(), LineError> {
    if fault.load(Ordering::Acquire) {
        return Err(LineError::Stream("stream stopped after a device error".to_string()));
    }
    Ok(())
}

/// Number of `WRITE_WAIT` waits covering `STALL_BUFFERS` ring lengths
fn stall_waits(ring_frames: usize, sample_rate: f32) -> u32 {
    let ring_secs = ring_frames as f64 / sample_rate.max(1.0) as f64;
    ((STALL_BUFFERS * ring_secs / WRITE_WAIT.as_secs_f64()).ceil() as u32).max(1)
}

/// Push every sample, waiting while the ring is full
///
/// Fails once the stream faulted, or when the ring stayed full for more
/// than `max_waits` waits over the whole call.
fn push_all(
    producer: &mut rtrb::Producer<Sample>,
    samples: &[Sample],
    fault: &AtomicBool,
    max_waits: u32,
) -> Result<(), LineError> {
    let mut waits = 0;
    for &sample in samples {
        let mut sample = sample;
        loop {
            match producer.push(sample) {
                Ok(()) => break,
                Err(rtrb::PushError::Full(rejected)) => {
                    check_fault(fault)?;
                    if producer.is_abandoned() {
                        return Err(LineError::Closed);
                    }
                    if waits >= max_waits {
                        return Err(LineError::Stream("output line stopped draining".to_string()));
                    }
                    waits += 1;
                    sample = rejected;
                    std::thread::park_timeout(WRITE_WAIT);
                }
            }
        }
    }
    Ok(())
}

/// Highest channel count over a device's supported configurations
fn max_channels<I>(configs: Result<I, cpal::SupportedStreamConfigsError>) -> usize
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    configs
        .map(|c| c.map(|range| range.channels() as usize).max().unwrap_or(0))
        .unwrap_or(0)
}

/// Enumerate the default host's devices, default output device first
///
/// Each device carries a [`MixerHandle`] for opening lines.
pub fn devices() -> Vec<Device> {
    let host = cpal::default_host();
    let default_output = host.default_output_device().and_then(|d| d.name().ok());
    let default_input = host.default_input_device().and_then(|d| d.name().ok());

    let all = match host.devices() {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("Failed to enumerate audio devices: {}", e);
            return Vec::new();
        }
    };

    let mut devices: Vec<(u8, Device)> = all
        .filter_map(|device| {
            let name = device.name().ok()?;
            let ins = max_channels(device.supported_input_configs());
            let outs = max_channels(device.supported_output_configs());
            if ins == 0 && outs == 0 {
                return None;
            }
            let rank = if default_output.as_ref() == Some(&name) {
                0
            } else if default_input.as_ref() == Some(&name) {
                1
            } else {
                2
            };
            let device = Device::new(name, ins, outs)
                .with_extension(MixerHandle::new(CpalMixer::new(device)));
            Some((rank, device))
        })
        .collect();

    // Stable: host order is kept within each rank
    devices.sort_by_key(|(rank, _)| *rank);

    log::info!(
        "Enumerated {} audio devices on host {:?}",
        devices.len(),
        host.id()
    );
    devices.into_iter().map(|(_, device)| device).collect()
}
