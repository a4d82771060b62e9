//! Server providers and the registry of compiled-in backends

use std::sync::Arc;

use crate::client::AudioClient;
use crate::config::AudioConfiguration;
use crate::error::{ServerError, ServerResult};
use crate::ext::ExtensionList;
use crate::server::AudioServer;

/// Factory for servers of one backend library
pub trait AudioServerProvider: Send + Sync {
    /// Name used to look the provider up, e.g. `"JACK"`
    fn library_name(&self) -> &str;

    fn library_description(&self) -> &str {
        ""
    }

    /// Capabilities offered by the backend, such as its devices
    fn extensions(&self) -> ExtensionList {
        ExtensionList::new()
    }

    /// Cheap pre-check; `create_server` may still fail
    fn is_configuration_supported(&self, _config: &AudioConfiguration) -> bool {
        true
    }

    /// Build a server for `config` driving `client`
    ///
    /// Nothing is opened until the server's `run` is called.
    fn create_server(
        &self,
        config: &AudioConfiguration,
        client: Box<dyn AudioClient>,
    ) -> ServerResult<Box<dyn AudioServer>>;
}

/// Ordered set of providers
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn AudioServerProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: impl AudioServerProvider + 'static) {
        log::debug!("Registered audio server provider '{}'", provider.library_name());
        self.providers.push(Arc::new(provider));
    }

    /// Provider by library name, ignoring case
    pub fn find(&self, library_name: &str) -> Option<Arc<dyn AudioServerProvider>> {
        self.providers
            .iter()
            .find(|p| p.library_name().eq_ignore_ascii_case(library_name))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AudioServerProvider>> + '_ {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Create a server from the named provider, or the first one supporting `config`
    pub fn create_server(
        &self,
        library_name: Option<&str>,
        config: &AudioConfiguration,
        client: Box<dyn AudioClient>,
    ) -> ServerResult<Box<dyn AudioServer>> {
        let provider = match library_name {
            Some(name) => self
                .find(name)
                .ok_or_else(|| ServerError::UnknownProvider(name.to_string()))?,
            None => self
                .providers
                .iter()
                .find(|p| p.is_configuration_supported(config))
                .cloned()
                .ok_or_else(|| ServerError::UnknownProvider("<any>".to_string()))?,
        };
        log::info!("Creating audio server with '{}'", provider.library_name());
        provider.create_server(config, client)
    }
}

/// Registry of every backend compiled into this build
///
/// JACK comes first when enabled, then the host-mixer lines.
pub fn default_registry() -> ProviderRegistry {
    // Without backend features nothing is registered
    #[allow(unused_mut)]
    let mut registry = ProviderRegistry::new();
    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    registry.register(crate::jack::JackProvider::new());
    #[cfg(feature = "cpal-backend")]
    registry.register(crate::line::LineProvider::system());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::AudioBuffers;
    use crate::client::ClientError;
    use crate::line::memory::MemoryMixer;
    use crate::line::LineProvider;
    use crate::types::Nanos;

    struct Silent;

    impl AudioClient for Silent {
        fn configure(&mut self, _config: &AudioConfiguration) -> Result<(), ClientError> {
            Ok(())
        }

        fn process(&mut self, _: Nanos, _: &AudioBuffers, _: &mut AudioBuffers, _: usize) -> bool {
            false
        }

        fn shutdown(&mut self) {}
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(LineProvider::new("Memory", vec![MemoryMixer::new("m").device(0, 2)]));
        registry
    }

    #[test]
    fn test_find_ignores_case() {
        let registry = registry();
        assert_eq!(registry.len(), 1);
        assert!(registry.find("memory").is_some());
        assert!(registry.find("MEMORY").is_some());
        assert!(registry.find("JACK").is_none());
    }

    #[test]
    fn test_unknown_provider() {
        let config = AudioConfiguration::new(48000.0, 0, 2, 256, true).unwrap();
        let result = registry().create_server(Some("Nope"), &config, Box::new(Silent));
        assert!(matches!(result, Err(ServerError::UnknownProvider(name)) if name == "Nope"));
    }

    #[test]
    fn test_create_and_run_default() {
        let config = AudioConfiguration::new(48000.0, 0, 2, 256, true).unwrap();
        let mut server = registry().create_server(None, &config, Box::new(Silent)).unwrap();
        assert!(!server.is_active());
        server.run().unwrap();
        assert!(!server.is_active());
    }

    #[test]
    fn test_default_registry_order() {
        let names: Vec<String> = default_registry()
            .iter()
            .map(|p| p.library_name().to_string())
            .collect();
        #[cfg(feature = "cpal-backend")]
        assert_eq!(names.last().map(String::as_str), Some("CPAL"));
        #[cfg(not(any(feature = "cpal-backend", feature = "jack-backend")))]
        assert!(names.is_empty());
        #[cfg(all(target_os = "linux", feature = "jack-backend"))]
        assert_eq!(names.first().map(String::as_str), Some("JACK"));
    }

    #[test]
    fn test_no_supporting_provider() {
        let config = AudioConfiguration::new(48000.0, 2, 0, 256, true).unwrap();
        let result = registry().create_server(None, &config, Box::new(Silent));
        assert!(matches!(result, Err(ServerError::UnknownProvider(_))));
    }
}
