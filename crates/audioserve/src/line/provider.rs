//! Provider for line servers

use crate::client::AudioClient;
use crate::config::AudioConfiguration;
use crate::convert::SampleEncoding;
use crate::error::ServerResult;
use crate::ext::{Device, DeviceName, ExtensionList};
use crate::provider::AudioServerProvider;
use crate::server::{AudioServer, RealtimeServer};

use super::{LineServerBackend, MixerHandle};

/// Creates line servers over a fixed set of devices
///
/// Devices are searched in order, so list the default device first.
pub struct LineProvider {
    name: String,
    description: String,
    devices: Vec<Device>,
    encoding: SampleEncoding,
}

impl LineProvider {
    pub fn new(name: impl Into<String>, devices: Vec<Device>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            devices,
            encoding: SampleEncoding::default(),
        }
    }

    /// Provider over the host's audio devices
    #[cfg(feature = "cpal-backend")]
    pub fn system() -> Self {
        Self::new("CPAL", super::cpal_mixer::devices())
            .with_description("Host audio devices through CPAL")
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_encoding(mut self, encoding: SampleEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Pick the input and output devices for `config`
    ///
    /// Devices attached to the configuration win; then devices matching a
    /// [`DeviceName`] hint; then the provider's own devices in order. Only
    /// devices backed by a mixer qualify.
    pub fn select_devices(&self, config: &AudioConfiguration) -> (Option<Device>, Option<Device>) {
        let attached: Vec<&Device> = config.find_all::<Device>();
        let hint = config.find::<DeviceName>();
        let known: Vec<&Device> = self
            .devices
            .iter()
            .filter(|d| hint.map_or(true, |h| h.matches(d.name())))
            .collect();

        let pick = |wants: fn(&Device) -> usize| -> Option<Device> {
            attached
                .iter()
                .chain(known.iter())
                .find(|d| wants(d) > 0 && d.find::<MixerHandle>().is_some())
                .map(|d| (*d).clone())
        };
        (
            pick(Device::max_input_channels),
            pick(Device::max_output_channels),
        )
    }
}

impl AudioServerProvider for LineProvider {
    fn library_name(&self) -> &str {
        &self.name
    }

    fn library_description(&self) -> &str {
        &self.description
    }

    fn extensions(&self) -> ExtensionList {
        self.devices
            .iter()
            .cloned()
            .fold(ExtensionList::new(), |list, device| list.with(device))
    }

    fn is_configuration_supported(&self, config: &AudioConfiguration) -> bool {
        config.output_channel_count() > 0
    }

    fn create_server(
        &self,
        config: &AudioConfiguration,
        client: Box<dyn AudioClient>,
    ) -> ServerResult<Box<dyn AudioServer>> {
        let (input, output) = self.select_devices(config);
        log::debug!(
            "Building line server: input {:?}, output {:?}",
            input.as_ref().map(Device::name),
            output.as_ref().map(Device::name)
        );

        let mut backend = LineServerBackend::new(client).encoding(self.encoding);
        if let Some(device) = input {
            backend = backend.input_device(device);
        }
        if let Some(device) = output {
            backend = backend.output_device(device);
        }
        Ok(Box::new(RealtimeServer::new(config.clone(), backend)))
    }
}
