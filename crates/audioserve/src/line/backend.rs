//! Run loop for servers over host-mixer lines

use std::panic::{self, AssertUnwindSafe};

use crate::buffers::AudioBuffers;
use crate::client::{AudioClient, ClientError};
use crate::config::AudioConfiguration;
use crate::convert::{FrameConverter, SampleEncoding};
use crate::error::{ConfigError, LineError, ServerError, ServerResult};
use crate::ext::{Device, ExtensionList};
use crate::server::{ServerBackend, ServerController};
use crate::timing::{Clock, Pacer, SystemClock, TimeFilter, TimingMode, DEFAULT_BANDWIDTH};
use crate::types::{Nanos, NANOS_PER_SEC};

use super::{
    LineFormat, MixerHandle, SourceLine, TargetLine, NON_BLOCKING_MAX_FRAMES, NON_BLOCKING_RATIO,
};

/// Resources held for one run, owned by the calling thread
pub struct LineSession {
    input: Option<Box<dyn TargetLine>>,
    output: Box<dyn SourceLine>,
    inputs: AudioBuffers,
    outputs: AudioBuffers,
    input_converter: FrameConverter,
    output_converter: FrameConverter,
    frames: usize,
    timing_mode: TimingMode,
}

impl LineSession {
    pub fn timing_mode(&self) -> TimingMode {
        self.timing_mode
    }

    fn close(&mut self) {
        if let Err(e) = self.output.close() {
            log::warn!("Failed to close output line: {}", e);
        }
        if let Some(input) = self.input.as_mut() {
            if let Err(e) = input.close() {
                log::warn!("Failed to close input line: {}", e);
            }
        }
    }

    /// Fill the input buffers for one cycle, silence on underrun
    fn read_input(&mut self) -> Result<(), LineError> {
        let Some(input) = self.input.as_mut() else {
            return Ok(());
        };
        let bytes = self.input_converter.bytes_mut(self.frames);
        if input.available() < bytes.len() {
            self.inputs.fill_silence();
            return Ok(());
        }
        let read = input.read(bytes)?;
        if read < bytes.len() {
            self.inputs.fill_silence();
            return Ok(());
        }
        self.input_converter.decode_into(&mut self.inputs);
        Ok(())
    }

    fn write_output(&mut self) -> Result<(), LineError> {
        let bytes = self.output_converter.encode_from(&self.outputs);
        self.output.write(bytes)?;
        Ok(())
    }
}

/// Line backend: reads, processes, writes and paces on the calling thread
///
/// Buffers are always `max_buffer_size` frames; the negotiated
/// configuration is fixed-size regardless of the request.
pub struct LineServerBackend<C, K = SystemClock> {
    client: C,
    clock: K,
    input_device: Option<Device>,
    output_device: Option<Device>,
    encoding: SampleEncoding,
}

impl<C: AudioClient> LineServerBackend<C, SystemClock> {
    pub fn new(client: C) -> Self {
        Self::with_clock(client, SystemClock)
    }
}

impl<C: AudioClient, K: Clock> LineServerBackend<C, K> {
    pub fn with_clock(client: C, clock: K) -> Self {
        Self {
            client,
            clock,
            input_device: None,
            output_device: None,
            encoding: SampleEncoding::default(),
        }
    }

    /// Device capturing input; must carry a [`MixerHandle`]
    pub fn input_device(mut self, device: Device) -> Self {
        self.input_device = Some(device);
        self
    }

    /// Device playing output; must carry a [`MixerHandle`]
    pub fn output_device(mut self, device: Device) -> Self {
        self.output_device = Some(device);
        self
    }

    pub fn encoding(mut self, encoding: SampleEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn open_input(
        &self,
        format: &LineFormat,
        frames: usize,
    ) -> ServerResult<(&Device, Box<dyn TargetLine>)> {
        let device = self
            .input_device
            .as_ref()
            .ok_or_else(|| ServerError::Acquisition("No input device available".to_string()))?;
        check_channels(device, device.max_input_channels(), format.channels)?;
        let mixer = mixer_of(device)?;
        let buffer_bytes = frames * format.frame_size() * NON_BLOCKING_RATIO;
        let line = mixer.mixer().open_target(format, buffer_bytes)?;
        log::debug!("Opened input line on '{}': {}", device.name(), format);
        Ok((device, line))
    }

    fn open_output(
        &self,
        format: &LineFormat,
        frames: usize,
        mode: TimingMode,
    ) -> ServerResult<(&Device, Box<dyn SourceLine>)> {
        let device = self
            .output_device
            .as_ref()
            .ok_or_else(|| ServerError::Acquisition("No output device available".to_string()))?;
        check_channels(device, device.max_output_channels(), format.channels)?;
        let mixer = mixer_of(device)?;
        let line = mixer
            .mixer()
            .open_source(format, output_buffer_bytes(frames, format.frame_size(), mode))?;
        log::debug!("Opened output line on '{}': {}", device.name(), format);
        Ok((device, line))
    }

    /// Run the client for one cycle; a panic counts as a disconnect
    fn process_cycle(&mut self, time: Nanos, session: &mut LineSession) -> bool {
        let client = &mut self.client;
        let inputs = &session.inputs;
        let outputs = &mut session.outputs;
        let frames = session.frames;
        match panic::catch_unwind(AssertUnwindSafe(|| {
            client.process(time, inputs, outputs, frames)
        })) {
            Ok(keep_going) => keep_going,
            Err(_) => {
                log::error!("Audio client panicked during process, shutting down");
                false
            }
        }
    }
}

impl<C: AudioClient, K: Clock> ServerBackend for LineServerBackend<C, K> {
    type Session = LineSession;

    fn open(
        &mut self,
        requested: &AudioConfiguration,
        _controller: &ServerController,
    ) -> ServerResult<(LineSession, AudioConfiguration)> {
        let sample_rate = requested.sample_rate();
        let frames = requested.max_buffer_size();
        let input_channels = requested.input_channel_count();
        let output_channels = requested.output_channel_count();
        if output_channels == 0 {
            return Err(ConfigError::NoOutputChannels.into());
        }
        let timing_mode = requested.find::<TimingMode>().copied().unwrap_or_default();

        let input = if input_channels > 0 {
            let format = LineFormat::new(sample_rate, input_channels, self.encoding);
            Some(self.open_input(&format, frames)?)
        } else {
            None
        };

        let format = LineFormat::new(sample_rate, output_channels, self.encoding);
        let (output_device, output) = match self.open_output(&format, frames, timing_mode) {
            Ok(opened) => opened,
            Err(e) => {
                if let Some((_, mut line)) = input {
                    if let Err(close_err) = line.close() {
                        log::warn!("Failed to close input line: {}", close_err);
                    }
                }
                return Err(e);
            }
        };

        let mut extensions = ExtensionList::new();
        let input_device = input.as_ref().map(|(device, _)| *device);
        if let Some(device) = input_device {
            extensions.push(device.clone());
        }
        if input_device != Some(output_device) {
            extensions.push(output_device.clone());
        }
        extensions.push(timing_mode);

        let actual = AudioConfiguration::with_extensions(
            sample_rate,
            input_channels,
            output_channels,
            frames,
            true,
            extensions,
        )?;

        log::info!(
            "Line server on '{}': {}Hz, {} in / {} out, {} frames (~{:.1}ms latency), {:?} timing",
            output_device.name(),
            sample_rate,
            input_channels,
            output_channels,
            frames,
            actual.latency_ms(),
            timing_mode
        );

        let session = LineSession {
            input: input.map(|(_, line)| line),
            output,
            inputs: AudioBuffers::new(input_channels, frames),
            outputs: AudioBuffers::new(output_channels, frames),
            input_converter: FrameConverter::new(self.encoding, input_channels, frames),
            output_converter: FrameConverter::new(self.encoding, output_channels, frames),
            frames,
            timing_mode,
        };
        Ok((session, actual))
    }

    fn configure_client(&mut self, config: &AudioConfiguration) -> Result<(), ClientError> {
        self.client.configure(config)
    }

    fn process(
        &mut self,
        session: &mut LineSession,
        controller: &ServerController,
    ) -> ServerResult<()> {
        if let Some(input) = session.input.as_mut() {
            input.start()?;
        }
        session.output.start()?;

        let config = controller.configuration();
        let start = self.clock.now();
        let mut filter = TimeFilter::new(config.buffer_time(), DEFAULT_BANDWIDTH);
        let mut pacer = Pacer::new(session.timing_mode, &config, start);

        while controller.is_running() {
            let now = self.clock.now();
            session.read_input()?;
            let time = (filter.update(now as f64 / NANOS_PER_SEC) * NANOS_PER_SEC) as Nanos;
            if self.process_cycle(time, session) {
                session.write_output()?;
                pacer.pace(&self.clock, &*session.output);
            } else {
                controller.request_shutdown();
            }
            filter.report();
        }
        Ok(())
    }

    fn close(&mut self, mut session: LineSession) {
        session.close();
    }

    fn shutdown_client(&mut self) {
        self.client.shutdown();
    }
}

fn mixer_of(device: &Device) -> ServerResult<&MixerHandle> {
    device.find::<MixerHandle>().ok_or_else(|| {
        ServerError::Acquisition(format!("Device '{}' has no line mixer", device.name()))
    })
}

fn check_channels(device: &Device, max: usize, requested: usize) -> ServerResult<()> {
    if requested > max {
        return Err(ConfigError::TooManyChannels {
            device: device.name().to_string(),
            max,
            requested,
        }
        .into());
    }
    Ok(())
}

/// Output line buffer size in bytes for the timing mode
///
/// Blocking lines get exactly one cycle so writes self-pace. Paced lines
/// get headroom, capped so the hardware never lags far behind.
pub(crate) fn output_buffer_bytes(frames: usize, frame_size: usize, mode: TimingMode) -> usize {
    let bytes = frames * frame_size;
    if mode.is_paced() {
        (bytes * NON_BLOCKING_RATIO).min(NON_BLOCKING_MAX_FRAMES * frame_size)
    } else {
        bytes
    }
}
