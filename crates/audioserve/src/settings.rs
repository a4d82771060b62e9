//! Server settings loaded from YAML
//!
//! Settings describe the requested stream and backend hints. They are only
//! ever read; nothing here writes them back.
//!
//! ```yaml
//! sample_rate: 44100
//! input_channels: 2
//! output_channels: 2
//! buffer_size: 256
//! timing_mode: FramePosition
//! client_id: synth
//! connections: all
//! device: USB
//! provider: CPAL
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::client::AudioClient;
use crate::config::{AudioConfiguration, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE};
use crate::ext::{ClientId, Connections, DeviceName, ExtensionList};
use crate::provider::ProviderRegistry;
use crate::server::AudioServer;
use crate::timing::TimingMode;

/// Requested stream shape and backend hints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub sample_rate: f32,
    pub input_channels: usize,
    pub output_channels: usize,
    /// Frames per cycle
    pub buffer_size: usize,
    pub fixed_buffer_size: bool,
    /// Pacing for line backends
    pub timing_mode: TimingMode,
    pub client_id: String,
    /// Auto-connection to physical ports (JACK)
    pub connections: Connections,
    /// Substring of the device name to prefer
    pub device: Option<String>,
    /// Library name of the provider; first supporting provider if unset
    pub provider: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            input_channels: 0,
            output_channels: 2,
            buffer_size: DEFAULT_BUFFER_SIZE,
            fixed_buffer_size: true,
            timing_mode: TimingMode::default(),
            client_id: "audioserve".to_string(),
            connections: Connections::default(),
            device: None,
            provider: None,
        }
    }
}

impl ServerSettings {
    /// The requested configuration, with settings attached as extensions
    pub fn to_configuration(&self) -> Result<AudioConfiguration> {
        let mut extensions = ExtensionList::new()
            .with(ClientId::new(self.client_id.clone()))
            .with(self.connections)
            .with(self.timing_mode);
        if let Some(device) = &self.device {
            extensions.push(DeviceName(device.clone()));
        }
        let config = AudioConfiguration::with_extensions(
            self.sample_rate,
            self.input_channels,
            self.output_channels,
            self.buffer_size,
            self.fixed_buffer_size,
            extensions,
        )
        .context("Invalid audio settings")?;
        Ok(config)
    }

    /// Build a server for `client` from the configured provider
    pub fn create_server(
        &self,
        registry: &ProviderRegistry,
        client: Box<dyn AudioClient>,
    ) -> Result<Box<dyn AudioServer>> {
        let config = self.to_configuration()?;
        let server = registry
            .create_server(self.provider.as_deref(), &config, client)
            .context("Failed to create audio server")?;
        Ok(server)
    }
}

/// Load settings from a YAML file
///
/// A missing file yields the defaults; an unreadable or invalid file is an
/// error.
pub fn load_settings(path: &Path) -> Result<ServerSettings> {
    if !path.exists() {
        log::info!("Settings file {:?} not found, using defaults", path);
        return Ok(ServerSettings::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {:?}", path))?;
    let settings: ServerSettings = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse settings file: {:?}", path))?;
    log::info!("Loaded audio settings from {:?}", path);
    Ok(settings)
}
