//! Typed extension objects attached to configurations, devices and providers
//!
//! Backends use extensions to receive hints from the application (which
//! device to open, whether to auto-connect ports, which pacing mode to use)
//! and to report back what they actually assigned (e.g. the client name the
//! JACK server granted).
//!
//! ```ignore
//! let exts = ExtensionList::new()
//!     .with(ClientId::new("synth"))
//!     .with(Connections::All);
//! assert_eq!(exts.find::<ClientId>().map(|id| id.identifier()), Some("synth"));
//! ```

mod client_id;
mod connections;
mod device;
mod lookup;

pub use client_id::ClientId;
pub use connections::Connections;
pub use device::{Device, DeviceName};
pub use lookup::{Extension, ExtensionList};
