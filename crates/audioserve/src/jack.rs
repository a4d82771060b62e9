//! Native JACK backend for Linux
//!
//! JACK is self-pacing: its real-time thread calls the process handler once
//! per period, so no pacing policy applies. The thread calling `run` only
//! activates the client, connects ports and then idles until shutdown.
//!
//! ```text
//! ┌──────────────────┐   activate    ┌─────────────────────┐
//! │  Owning thread   │──────────────►│   JACK RT thread    │
//! │  polls lifecycle │               │  ports ─► client ─► │
//! │  every 100ms     │◄──shutdown────│  ports              │
//! └──────────────────┘   request     └─────────────────────┘
//! ```
//!
//! The sample rate and buffer size always come from the JACK server; the
//! requested values are ignored.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ::jack::{
    AsyncClient, AudioIn, AudioOut, Client, ClientOptions, Control, Port, PortFlags, ProcessScope,
};

use crate::buffers::AudioBuffers;
use crate::client::{AudioClient, ClientError};
use crate::config::AudioConfiguration;
use crate::error::{ServerError, ServerResult};
use crate::ext::{ClientId, Connections, ExtensionList};
use crate::provider::AudioServerProvider;
use crate::server::{AudioServer, RealtimeServer, ServerBackend, ServerController};
use crate::timing::{Clock, SystemClock, TimeFilter, DEFAULT_BANDWIDTH};
use crate::types::{Nanos, NANOS_PER_SEC};

/// Client name used when the configuration carries no [`ClientId`]
pub const DEFAULT_CLIENT_ID: &str = "audioserve";

/// Interval at which the owning thread checks for shutdown
const IDLE_POLL: Duration = Duration::from_millis(100);

/// JACK port type for 32-bit float audio
const AUDIO_TYPE: &str = "32 bit float mono audio";

type SharedClient<C> = Arc<Mutex<C>>;

fn lock<C>(client: &SharedClient<C>) -> MutexGuard<'_, C> {
    client.lock().unwrap_or_else(|e| e.into_inner())
}

/// Whether a JACK period can be handed to the client
///
/// The published configuration is fixed-size, so any other period length
/// (after a server buffer-size change) must not reach the client.
fn period_matches(n_frames: usize, buffer_size: usize) -> bool {
    n_frames == buffer_size
}

/// What the process handler does with one cycle's client result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleAction {
    /// Copy the client's output to the ports
    Play,
    /// Client disconnected or panicked
    Stop,
    /// Client was busy; skip this cycle
    Skip,
}

impl CycleAction {
    /// `keep_going` is `None` when the client lock was not available
    fn from_result(keep_going: Option<bool>) -> Self {
        match keep_going {
            Some(true) => CycleAction::Play,
            Some(false) => CycleAction::Stop,
            None => CycleAction::Skip,
        }
    }
}

/// JACK process handler
///
/// The audio client is only locked by the owning thread before activation
/// and after deactivation. Should `try_lock` ever fail, the cycle is silent.
struct JackProcessor<C: AudioClient + 'static> {
    client: SharedClient<C>,
    controller: ServerController,
    /// Negotiated frames per cycle
    buffer_size: usize,
    input_ports: Vec<Port<AudioIn>>,
    output_ports: Vec<Port<AudioOut>>,
    inputs: AudioBuffers,
    outputs: AudioBuffers,
    filter: TimeFilter,
}

impl<C: AudioClient + 'static> JackProcessor<C> {
    fn silence(&mut self, ps: &ProcessScope) {
        for port in self.output_ports.iter_mut() {
            port.as_mut_slice(ps).fill(0.0);
        }
    }
}

impl<C: AudioClient + 'static> ::jack::ProcessHandler for JackProcessor<C> {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        if !self.controller.is_running() {
            self.silence(ps);
            return Control::Continue;
        }

        let n_frames = ps.n_frames() as usize;
        if !period_matches(n_frames, self.buffer_size) {
            log::error!(
                "JACK period changed to {} frames, configured for {}; shutting down",
                n_frames,
                self.buffer_size
            );
            self.silence(ps);
            self.controller.request_shutdown();
            return Control::Continue;
        }

        // Set working buffer length (RT-safe: no allocation)
        self.inputs.set_frames(n_frames);
        self.outputs.set_frames(n_frames);
        for (i, port) in self.input_ports.iter().enumerate() {
            self.inputs.channel_mut(i).copy_from_slice(port.as_slice(ps));
        }

        let now = SystemClock.now();
        let time = (self.filter.update(now as f64 / NANOS_PER_SEC) * NANOS_PER_SEC) as Nanos;

        let keep_going = match self.client.try_lock() {
            Ok(mut client) => {
                let inputs = &self.inputs;
                let outputs = &mut self.outputs;
                Some(
                    panic::catch_unwind(AssertUnwindSafe(|| {
                        client.process(time, inputs, outputs, n_frames)
                    }))
                    .unwrap_or_else(|_| {
                        log::error!("Audio client panicked during process, shutting down");
                        false
                    }),
                )
            }
            Err(_) => None,
        };

        match CycleAction::from_result(keep_going) {
            CycleAction::Play => {
                for (i, port) in self.output_ports.iter_mut().enumerate() {
                    port.as_mut_slice(ps).copy_from_slice(self.outputs.channel(i));
                }
            }
            CycleAction::Stop => {
                self.silence(ps);
                self.controller.request_shutdown();
            }
            CycleAction::Skip => self.silence(ps),
        }
        self.filter.report();
        Control::Continue
    }
}

/// JACK notification handler
struct JackNotifications {
    controller: ServerController,
}

impl ::jack::NotificationHandler for JackNotifications {
    unsafe fn shutdown(&mut self, _status: ::jack::ClientStatus, reason: &str) {
        log::warn!("JACK server shut down: {}", reason);
        self.controller.request_shutdown();
    }

    fn sample_rate(&mut self, _client: &Client, srate: ::jack::Frames) -> Control {
        log::info!("JACK sample rate: {}", srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

/// Resources of one JACK run
pub struct JackSession<C: AudioClient + 'static> {
    client: Option<Client>,
    processor: Option<JackProcessor<C>>,
    active: Option<AsyncClient<JackNotifications, JackProcessor<C>>>,
    input_port_names: Vec<String>,
    output_port_names: Vec<String>,
    connections: Connections,
}

/// Backend running a client as a JACK client
pub struct JackServerBackend<C: AudioClient + 'static> {
    client: SharedClient<C>,
}

impl<C: AudioClient + 'static> JackServerBackend<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
        }
    }
}

impl<C: AudioClient + 'static> ServerBackend for JackServerBackend<C> {
    type Session = JackSession<C>;

    fn open(
        &mut self,
        requested: &AudioConfiguration,
        controller: &ServerController,
    ) -> ServerResult<(JackSession<C>, AudioConfiguration)> {
        let id = requested
            .find::<ClientId>()
            .cloned()
            .unwrap_or_else(|| ClientId::new(DEFAULT_CLIENT_ID));
        let connections = requested.find::<Connections>().copied().unwrap_or_default();

        // Only start a server when asked to connect to hardware
        let options = if connections.any() {
            ClientOptions::empty()
        } else {
            ClientOptions::NO_START_SERVER
        };
        let (client, status) = Client::new(id.identifier(), options).map_err(|e| {
            ServerError::Acquisition(format!("Failed to create JACK client: {}", e))
        })?;
        log::debug!("JACK client created, status {:?}", status);

        let actual_name = client.name().to_string();
        let input_count = requested.input_channel_count();
        let output_count = requested.output_channel_count();

        let mut input_ports = Vec::with_capacity(input_count);
        let mut input_port_names = Vec::with_capacity(input_count);
        for i in 1..=input_count {
            let name = format!("Input_{}", i);
            let port = client
                .register_port(&name, AudioIn::default())
                .map_err(|e| ServerError::Acquisition(format!("Failed to register port: {}", e)))?;
            input_ports.push(port);
            input_port_names.push(format!("{}:{}", actual_name, name));
        }
        let mut output_ports = Vec::with_capacity(output_count);
        let mut output_port_names = Vec::with_capacity(output_count);
        for i in 1..=output_count {
            let name = format!("Output_{}", i);
            let port = client
                .register_port(&name, AudioOut::default())
                .map_err(|e| ServerError::Acquisition(format!("Failed to register port: {}", e)))?;
            output_ports.push(port);
            output_port_names.push(format!("{}:{}", actual_name, name));
        }

        let sample_rate = client.sample_rate() as f32;
        let buffer_size = client.buffer_size() as usize;

        // JACK may rename the client if the name is taken
        let id = if actual_name == id.identifier() {
            id
        } else {
            log::info!("JACK renamed client '{}' to '{}'", id, actual_name);
            ClientId::new(actual_name.clone())
        };
        let actual = AudioConfiguration::with_extensions(
            sample_rate,
            input_count,
            output_count,
            buffer_size,
            true,
            ExtensionList::new().with(id).with(connections),
        )?;

        log::info!(
            "JACK client '{}' created (sample rate: {}Hz, buffer: {} frames, latency: {:.1}ms)",
            actual_name,
            sample_rate,
            buffer_size,
            actual.latency_ms()
        );

        let processor = JackProcessor {
            client: Arc::clone(&self.client),
            controller: controller.clone(),
            buffer_size,
            input_ports,
            output_ports,
            inputs: AudioBuffers::new(input_count, buffer_size),
            outputs: AudioBuffers::new(output_count, buffer_size),
            filter: TimeFilter::new(actual.buffer_time(), DEFAULT_BANDWIDTH),
        };

        let session = JackSession {
            client: Some(client),
            processor: Some(processor),
            active: None,
            input_port_names,
            output_port_names,
            connections,
        };
        Ok((session, actual))
    }

    fn configure_client(&mut self, config: &AudioConfiguration) -> Result<(), ClientError> {
        lock(&self.client).configure(config)
    }

    fn process(
        &mut self,
        session: &mut JackSession<C>,
        controller: &ServerController,
    ) -> ServerResult<()> {
        let (client, processor) = match (session.client.take(), session.processor.take()) {
            (Some(client), Some(processor)) => (client, processor),
            _ => return Err(ServerError::Backend("JACK session already used".to_string())),
        };
        let notifications = JackNotifications {
            controller: controller.clone(),
        };
        let active = client
            .activate_async(notifications, processor)
            .map_err(|e| ServerError::Backend(format!("Failed to activate JACK client: {}", e)))?;
        log::info!("JACK client activated");

        if session.connections.connect_inputs() {
            connect_inputs(active.as_client(), &session.input_port_names);
        }
        if session.connections.connect_outputs() {
            connect_outputs(active.as_client(), &session.output_port_names);
        }
        session.active = Some(active);

        while controller.is_running() {
            std::thread::sleep(IDLE_POLL);
        }
        Ok(())
    }

    fn close(&mut self, session: JackSession<C>) {
        if let Some(active) = session.active {
            match active.deactivate() {
                Ok((client, _, _)) => drop(client),
                Err(e) => log::warn!("Failed to deactivate JACK client: {}", e),
            }
        }
        log::debug!("JACK client closed");
    }

    fn shutdown_client(&mut self) {
        lock(&self.client).shutdown();
    }
}

/// Connect physical capture ports to our inputs, in order
fn connect_inputs(client: &Client, ports: &[String]) {
    let physical = client.ports(
        None,
        Some(AUDIO_TYPE),
        PortFlags::IS_OUTPUT | PortFlags::IS_PHYSICAL,
    );
    for (source, ours) in physical.iter().zip(ports) {
        match client.connect_ports_by_name(source, ours) {
            Ok(()) => log::info!("Connected {} to {}", source, ours),
            Err(e) => log::warn!("Could not connect {} to {}: {}", source, ours, e),
        }
    }
}

/// Connect our outputs to physical playback ports, in order
fn connect_outputs(client: &Client, ports: &[String]) {
    let physical = client.ports(
        None,
        Some(AUDIO_TYPE),
        PortFlags::IS_INPUT | PortFlags::IS_PHYSICAL,
    );
    for (ours, destination) in ports.iter().zip(&physical) {
        match client.connect_ports_by_name(ours, destination) {
            Ok(()) => log::info!("Connected {} to {}", ours, destination),
            Err(e) => log::warn!("Could not connect {} to {}: {}", ours, destination, e),
        }
    }
}

/// Provider for [`JackServerBackend`]
#[derive(Debug, Default)]
pub struct JackProvider;

impl JackProvider {
    pub fn new() -> Self {
        Self
    }
}

impl AudioServerProvider for JackProvider {
    fn library_name(&self) -> &str {
        "JACK"
    }

    fn library_description(&self) -> &str {
        "Low-latency audio through a JACK server"
    }

    fn create_server(
        &self,
        config: &AudioConfiguration,
        client: Box<dyn AudioClient>,
    ) -> ServerResult<Box<dyn AudioServer>> {
        Ok(Box::new(RealtimeServer::new(
            config.clone(),
            JackServerBackend::new(client),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_negotiated_period_reaches_client() {
        assert!(period_matches(256, 256));
        assert!(!period_matches(128, 256));
        assert!(!period_matches(512, 256));
    }

    #[test]
    fn test_busy_client_skips_cycle_without_stopping() {
        assert_eq!(CycleAction::from_result(Some(true)), CycleAction::Play);
        assert_eq!(CycleAction::from_result(Some(false)), CycleAction::Stop);
        assert_eq!(CycleAction::from_result(None), CycleAction::Skip);
    }

    #[test]
    fn test_provider_metadata() {
        let provider = JackProvider::new();
        assert_eq!(provider.library_name(), "JACK");
        assert!(!provider.library_description().is_empty());
        let config = AudioConfiguration::new(48000.0, 2, 2, 256, true).unwrap();
        assert!(provider.is_configuration_supported(&config));
    }
}
