//! Serial port discovery for USB-attached sorter controllers.
//!
//! The controller shows up as a USB-to-serial bridge; which chip depends on
//! the board revision, so candidates are matched by descriptive-string
//! keywords rather than a fixed VID/PID table.

use tokio_serial::{SerialPortInfo, SerialPortType};

use crate::types::PortDescriptor;

/// Case-insensitive substrings that mark a port as a likely controller.
///
/// Covers genuine boards ("arduino"), the bridge chips on clones (CH340,
/// CP210x, FTDI) and the macOS device-path conventions (usbmodem,
/// usbserial).
const CANDIDATE_KEYWORDS: &[&str] = &[
    "arduino",
    "ch340",
    "cp210",
    "ftdi",
    "usb",
    "usbmodem",
    "usbserial",
];

/// Lists serial ports that look like a sorter controller.
///
/// Enumerates every port visible to the OS and keeps those whose
/// description or device path contains a candidate keyword. Has no side
/// effects and never fails: enumeration errors are logged and yield an
/// empty list, same as an empty system.
#[must_use]
pub fn list_candidate_ports() -> Vec<PortDescriptor> {
    let ports = match tokio_serial::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            tracing::warn!("serial port enumeration failed: {e}");
            return Vec::new();
        }
    };

    ports
        .into_iter()
        .map(describe)
        .filter(is_candidate)
        .collect()
}

/// Flattens the OS port info into a [`PortDescriptor`].
fn describe(info: SerialPortInfo) -> PortDescriptor {
    match info.port_type {
        SerialPortType::UsbPort(usb) => PortDescriptor {
            path: info.port_name,
            description: usb.product.unwrap_or_default(),
            vid: Some(usb.vid),
            pid: Some(usb.pid),
        },
        _ => PortDescriptor {
            path: info.port_name,
            description: String::new(),
            vid: None,
            pid: None,
        },
    }
}

fn is_candidate(port: &PortDescriptor) -> bool {
    let description = port.description.to_ascii_lowercase();
    let path = port.path.to_ascii_lowercase();
    CANDIDATE_KEYWORDS
        .iter()
        .any(|keyword| description.contains(keyword) || path.contains(keyword))
}
