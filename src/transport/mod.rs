//! Transport layer for sorter communication.
//!
//! The trait is the seam between the connection manager and the wire:
//! production code uses [`SerialTransport`], tests substitute a mock that
//! records writes and injects failures.

pub mod serial;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::Result;

/// Trait for transport implementations.
///
/// All methods are single attempts with no retry or state-machine logic;
/// that lives in the connection manager so it can be exercised against a
/// mock without hardware.
pub trait Transport: Send + Sync {
    /// Sets the device path used by the next [`Transport::open`] call.
    fn set_path(&mut self, path: &str);

    /// Returns the currently configured device path, if any.
    fn path(&self) -> Option<&str>;

    /// Opens the device once. Does not retry.
    fn open(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Closes the device. A no-op when already closed.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Writes a single command byte and flushes it to the wire.
    fn write_byte(&mut self, byte: u8) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Discards anything sitting in the input buffer.
    ///
    /// Doubles as the liveness probe: on a silently dropped connection the
    /// underlying ioctl fails.
    fn clear_input(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Collects newline-terminated text the device emits within `window`.
    ///
    /// The device is free to stay silent; an empty result is not an error.
    fn read_lines(
        &mut self,
        window: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>>;

    /// Returns true if the handle is open.
    fn is_open(&self) -> bool;
}

pub use serial::SerialTransport;
