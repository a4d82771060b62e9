use serde::{Deserialize, Serialize};

/// Auto-connection policy for backends with routable ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connections {
    /// Leave all ports unconnected
    #[default]
    None,
    /// Connect physical capture ports to the client's inputs
    Input,
    /// Connect the client's outputs to physical playback ports
    Output,
    /// Connect both directions
    All,
}

impl Connections {
    pub fn connect_inputs(self) -> bool {
        matches!(self, Connections::Input | Connections::All)
    }

    pub fn connect_outputs(self) -> bool {
        matches!(self, Connections::Output | Connections::All)
    }

    /// True when at least one direction should be connected
    pub fn any(self) -> bool {
        self != Connections::None
    }
}
