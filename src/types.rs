//! Core data types: material classes, command bytes, port descriptors
//! and the link state machine.

/// Material classes the sorter can route, one bin per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Material {
    /// Paper and cardboard.
    Paper,
    /// Metal cans and foil.
    Metal,
    /// Plastic bottles and packaging.
    Plastic,
    /// Glass bottles and jars.
    Glass,
    /// Everything else (the catch-all bin).
    Trash,
}

impl Material {
    /// All material classes, in firmware bin order.
    pub const ALL: [Self; 5] = [
        Self::Paper,
        Self::Metal,
        Self::Plastic,
        Self::Glass,
        Self::Trash,
    ];

    /// The single ASCII byte the firmware expects for this class.
    ///
    /// Note that plastic is `L`, not `P` - `P` is taken by paper.
    #[must_use]
    pub const fn command_byte(self) -> u8 {
        match self {
            Self::Paper => b'P',
            Self::Metal => b'M',
            Self::Plastic => b'L',
            Self::Glass => b'G',
            Self::Trash => b'T',
        }
    }

    /// The classifier label for this class.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Metal => "metal",
            Self::Plastic => "plastic",
            Self::Glass => "glass",
            Self::Trash => "trash",
        }
    }

    /// Maps a classifier label to its material class.
    ///
    /// Unknown labels fall back to [`Material::Trash`] so that a model
    /// retrained with extra classes cannot produce an unroutable item.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "paper" => Self::Paper,
            "metal" => Self::Metal,
            "plastic" => Self::Plastic,
            "glass" => Self::Glass,
            _ => Self::Trash,
        }
    }
}

impl std::fmt::Display for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single-byte command understood by the sorter firmware.
///
/// The wire protocol is one ASCII character per action, no framing, no
/// checksum. Status text flows back the other way as free-form
/// newline-terminated lines and is never parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortCommand {
    /// Route the current item into a material bin.
    Route(Material),
    /// Home the servos and flush firmware state. Also used as the
    /// post-connect handshake byte.
    Reset,
}

impl SortCommand {
    /// The encoded wire byte.
    #[must_use]
    pub const fn byte(self) -> u8 {
        match self {
            Self::Route(material) => material.command_byte(),
            Self::Reset => b'R',
        }
    }
}

/// One classifier verdict for a camera frame.
///
/// This is the full interface to the upstream classifier: a label and a
/// confidence in `0.0..=1.0`. The model internals are out of scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Predicted class label.
    pub label: String,
    /// Top-1 confidence.
    pub confidence: f32,
}

impl Classification {
    /// Creates a classification result.
    #[must_use]
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// The material class this classification routes to.
    #[must_use]
    pub fn material(&self) -> Material {
        Material::from_label(&self.label)
    }
}

/// A serial port seen during discovery.
///
/// Ephemeral - produced fresh on each enumeration call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    /// Device path (e.g. "/dev/ttyUSB0" or "COM3").
    pub path: String,
    /// Human-readable product description, empty when the OS has none.
    pub description: String,
    /// USB vendor id, if the port is a USB device.
    pub vid: Option<u16>,
    /// USB product id, if the port is a USB device.
    pub pid: Option<u16>,
}

/// Connection lifecycle states for the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    /// No open handle. The initial state, also entered on explicit close,
    /// fatal I/O error, or an exhausted reconnect budget.
    #[default]
    Disconnected,
    /// An open attempt is in progress.
    Connecting,
    /// The handle is open and the handshake has been sent.
    Connected,
    /// A liveness probe failed and bounded reconnection is under way.
    Reconnecting,
}
