use std::fmt;

/// Identifier a backend should register the client under
///
/// Backends that rename clients on collision (JACK) attach the granted
/// identifier to the actual configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn identifier(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(identifier: &str) -> Self {
        Self::new(identifier)
    }
}
