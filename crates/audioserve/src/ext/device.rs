use std::any::Any;
use std::fmt;

use super::lookup::{Extension, ExtensionList};

/// A hardware device a backend can open
///
/// Backends attach their native handle (e.g. a CPAL device) as an extension
/// so a device chosen by the application can be resolved back to hardware.
#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    max_input_channels: usize,
    max_output_channels: usize,
    extensions: ExtensionList,
}

impl Device {
    pub fn new(name: impl Into<String>, max_input_channels: usize, max_output_channels: usize) -> Self {
        Self {
            name: name.into(),
            max_input_channels,
            max_output_channels,
            extensions: ExtensionList::new(),
        }
    }

    /// Attach a backend-specific extension (builder style)
    pub fn with_extension<T: Extension>(mut self, extension: T) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_input_channels(&self) -> usize {
        self.max_input_channels
    }

    pub fn max_output_channels(&self) -> usize {
        self.max_output_channels
    }

    pub fn find<T: Any>(&self) -> Option<&T> {
        self.extensions.find::<T>()
    }

    pub fn find_all<T: Any>(&self) -> Vec<&T> {
        self.extensions.find_all::<T>()
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.max_input_channels == other.max_input_channels
            && self.max_output_channels == other.max_output_channels
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Device selection hint: the first device whose name contains this text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceName(pub String);

impl DeviceName {
    pub fn matches(&self, device_name: &str) -> bool {
        device_name.contains(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct NativeHandle(u8);

    #[test]
    fn test_device_extensions() {
        let device = Device::new("hw:0,0", 2, 8).with_extension(NativeHandle(7));
        assert_eq!(device.find::<NativeHandle>(), Some(&NativeHandle(7)));
        assert_eq!(device.max_input_channels(), 2);
        assert_eq!(device.max_output_channels(), 8);
        assert_eq!(device.to_string(), "hw:0,0");
    }

    #[test]
    fn test_device_name_matches_substring() {
        let hint = DeviceName("USB".to_string());
        assert!(hint.matches("Scarlett USB Audio"));
        assert!(!hint.matches("HDA Intel"));
        assert!(DeviceName(String::new()).matches("anything"));
    }
}
