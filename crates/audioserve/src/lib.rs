//! audioserve - hardware-agnostic real-time audio servers
//!
//! An application implements [`AudioClient`] once and runs it against any
//! backend: host-mixer lines (CPAL, or the in-memory mixer) or a native JACK
//! client on Linux.
//!
//! # Example Usage
//!
//! ```ignore
//! use audioserve::{default_registry, load_settings};
//!
//! let settings = load_settings(Path::new("audio.yaml"))?;
//! let mut server = settings.create_server(&default_registry(), Box::new(MySynth::new()))?;
//!
//! // Stop from another thread
//! let controller = server.controller();
//! std::thread::spawn(move || {
//!     wait_for_quit();
//!     controller.request_shutdown();
//! });
//!
//! // Blocks until shutdown
//! server.run()?;
//! ```

pub mod buffers;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod ext;
pub mod line;
pub mod provider;
pub mod server;
pub mod settings;
pub mod timing;
pub mod types;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
pub mod jack;

pub use buffers::AudioBuffers;
pub use client::{AudioClient, ClientError};
pub use config::AudioConfiguration;
pub use error::{ConfigError, LineError, ServerError, ServerResult};
pub use provider::{default_registry, AudioServerProvider, ProviderRegistry};
pub use server::{AudioServer, RealtimeServer, ServerController, State};
pub use settings::{load_settings, ServerSettings};
pub use timing::TimingMode;
pub use types::*;
