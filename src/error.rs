//! Error types for the sortlink library.

use thiserror::Error;

/// The main error type for sortlink operations.
///
/// Every I/O failure is recovered into one of these variants; nothing
/// panics and nothing propagates as an unclassified exception to the
/// hosting layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Discovery found no candidate serial port.
    #[error("no candidate serial port found")]
    PortNotFound,

    /// The OS refused access to the device node.
    #[error("permission denied opening {port}")]
    PermissionDenied {
        /// Device path that was refused.
        port: String,
    },

    /// Another process holds the port open.
    #[error("device busy: {port}")]
    DeviceBusy {
        /// Device path that is in use.
        port: String,
    },

    /// The device path does not exist (unplugged, or a driver issue).
    #[error("device not found: {port}")]
    DeviceNotFound {
        /// Device path that is missing.
        port: String,
    },

    /// Every open attempt in one `connect` call failed.
    #[error("open failed after {attempts} attempts: {last_error}")]
    OpenExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Cause of the final attempt's failure.
        last_error: String,
    },

    /// The reconnect budget is spent; manual intervention is required.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    RetriesExhausted {
        /// Number of reconnect attempts made since the last successful open.
        attempts: u32,
    },

    /// Writing the command byte failed.
    #[error("write failed: {0}")]
    Write(std::io::Error),

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// Unclassified serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Unclassified I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classifies a failed open into the closest known cause.
    ///
    /// The error kind is authoritative where the backend sets one; the
    /// description text is matched as a fallback because several platforms
    /// report permission and busy conditions only as prose.
    pub(crate) fn classify_open(port: &str, err: tokio_serial::Error) -> Self {
        let port = port.to_owned();
        match err.kind {
            tokio_serial::ErrorKind::NoDevice => Self::DeviceNotFound { port },
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                Self::PermissionDenied { port }
            }
            _ => {
                let desc = err.description.to_ascii_lowercase();
                if desc.contains("permission denied") || desc.contains("access is denied") {
                    Self::PermissionDenied { port }
                } else if desc.contains("busy") || desc.contains("in use") {
                    Self::DeviceBusy { port }
                } else if desc.contains("no such file") || desc.contains("not found") {
                    Self::DeviceNotFound { port }
                } else {
                    Self::Serial(err)
                }
            }
        }
    }
}

/// Result type alias for sortlink operations.
pub type Result<T> = std::result::Result<T, Error>;
