//! Serial/USB transport implementation.
//!
//! One open handle over `tokio-serial`, fixed baud rate, 8-N-1. The wire
//! protocol is a single ASCII byte per command with free-text status lines
//! flowing back.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Baud rate the sorter firmware is flashed for.
pub const DEFAULT_BAUD_RATE: u32 = 9_600;

/// Read timeout applied to the handle at open time.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Slice used when polling the input buffer for response lines.
const POLL_SLICE: Duration = Duration::from_millis(20);

/// Configuration for serial transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0" or "COM3"). `None` until the
    /// connection manager picks a discovery candidate.
    pub path: Option<String>,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout for the open handle.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// Creates a configuration with default settings and no port chosen.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            path: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Creates a configuration pinned to a specific port.
    #[must_use]
    pub fn for_port(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new()
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial transport for the sorter controller.
pub struct SerialTransport {
    config: SerialConfig,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    /// Creates a new serial transport with the given configuration.
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    /// Creates a transport pinned to a specific port with default settings.
    #[must_use]
    pub fn with_port(path: impl Into<String>) -> Self {
        Self::new(SerialConfig::for_port(path))
    }
}

impl Transport for SerialTransport {
    fn set_path(&mut self, path: &str) {
        self.config.path = Some(path.to_owned());
    }

    fn path(&self) -> Option<&str> {
        self.config.path.as_deref()
    }

    fn open(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.stream.is_some() {
                return Ok(());
            }

            let path = self.config.path.clone().ok_or(Error::PortNotFound)?;
            tracing::info!(port = %path, baud = self.config.baud_rate, "opening serial port");

            let mut stream = tokio_serial::new(&path, self.config.baud_rate)
                .timeout(self.config.read_timeout)
                .open_native_async()
                .map_err(|e| Error::classify_open(&path, e))?;

            // Asserting DTR resets the controller, same as pyserial did on
            // open. The manager's warm-up delay covers the firmware reboot.
            if let Err(e) = stream.write_data_terminal_ready(true) {
                tracing::warn!("failed to assert DTR: {e}");
            }

            self.stream = Some(stream);
            Ok(())
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.stream.take().is_some() {
                tracing::info!("closed serial port");
            }
            Ok(())
        })
    }

    fn write_byte(&mut self, byte: u8) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            stream.write_all(&[byte]).await.map_err(Error::Write)?;
            stream.flush().await.map_err(Error::Write)?;
            tracing::trace!(byte = %char::from(byte), "wrote command byte");
            Ok(())
        })
    }

    fn clear_input(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            stream
                .clear(tokio_serial::ClearBuffer::Input)
                .map_err(Error::Serial)
        })
    }

    fn read_lines(
        &mut self,
        window: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>> {
        Box::pin(async move {
            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

            let mut acc = BytesMut::new();
            let mut buf = [0u8; 256];
            let deadline = tokio::time::Instant::now() + window;

            while tokio::time::Instant::now() < deadline {
                match tokio::time::timeout(POLL_SLICE, stream.read(&mut buf)).await {
                    Ok(Ok(0)) => break,
                    Ok(Ok(n)) => acc.extend_from_slice(&buf[..n]),
                    Ok(Err(e)) => return Err(Error::Io(e)),
                    Err(_) => {} // nothing pending in this slice
                }
            }

            let lines = acc[..]
                .split(|&b| b == b'\n')
                .map(|raw| String::from_utf8_lossy(raw).trim().to_owned())
                .filter(|line| !line.is_empty())
                .collect();
            Ok(lines)
        })
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
