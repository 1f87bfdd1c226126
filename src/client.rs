//! High-level [`SortLink`] client.
//!
//! Wraps the connection manager with per-dispatch health supervision and
//! the classifier-facing API. Constructed explicitly and owned by the
//! hosting service; there is no global singleton.

use crate::error::{Error, Result};
use crate::event::Subscription;
use crate::link::{LinkConfig, LinkManager};
use crate::transport::serial::SerialConfig;
use crate::transport::{SerialTransport, Transport};
use crate::types::{Classification, LinkState, Material, SortCommand};

/// Default minimum confidence for routing a classified frame.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Client for driving a serial-connected sorter controller.
pub struct SortLink<T> {
    manager: LinkManager<T>,
    confidence_threshold: f32,
}

impl SortLink<SerialTransport> {
    /// Creates a client that discovers the controller port on connect.
    #[must_use]
    pub fn auto() -> Self {
        Self::with_serial_config(SerialConfig::new(), LinkConfig::new())
    }

    /// Creates a client pinned to a specific serial port.
    #[must_use]
    pub fn serial(port: impl Into<String>) -> Self {
        Self::with_serial_config(SerialConfig::for_port(port), LinkConfig::new())
    }

    /// Creates a client with custom serial and link configuration.
    #[must_use]
    pub fn with_serial_config(serial: SerialConfig, link: LinkConfig) -> Self {
        Self::new(SerialTransport::new(serial), link)
    }
}

impl<T: Transport> SortLink<T> {
    /// Creates a client over the given transport.
    #[must_use]
    pub fn new(transport: T, config: LinkConfig) -> Self {
        Self {
            manager: LinkManager::new(transport, config),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    /// Connects to the controller, discovering a port when none is given
    /// and none was configured.
    pub async fn connect(&mut self, port: Option<&str>) -> Result<()> {
        self.manager.connect(port).await
    }

    /// Closes the link. Idempotent.
    pub async fn disconnect(&mut self) {
        self.manager.disconnect().await;
    }

    /// Current state of the link.
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.manager.state()
    }

    /// Returns true when the link is usable.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Subscribes to link events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.manager.subscribe()
    }

    /// Minimum confidence below which classified frames are skipped.
    #[must_use]
    pub const fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Sets the confidence threshold, clamped to `0.1..=1.0`.
    pub fn set_confidence_threshold(&mut self, threshold: f32) {
        self.confidence_threshold = threshold.clamp(0.1, 1.0);
    }

    /// Sends a command with health supervision.
    ///
    /// When the manager reports `Connected`, a liveness probe runs first
    /// (which itself reconnects on a dropped handle). When the link is
    /// down, one bounded reconnect is attempted. The command is written
    /// only if the link comes up; otherwise the caller learns the command
    /// was not sent via [`Error::NotConnected`].
    pub async fn dispatch(&mut self, command: SortCommand) -> Result<()> {
        let alive = match self.manager.state() {
            LinkState::Connected => self.manager.ensure_alive().await,
            _ => self.manager.reconnect().await.is_ok(),
        };
        if !alive {
            return Err(Error::NotConnected);
        }
        self.manager.send(command).await
    }

    /// Routes a classified frame to its bin.
    ///
    /// Frames below the confidence threshold are skipped and `Ok(None)` is
    /// returned; the servos should not move on a guess. Otherwise the
    /// label's material command is dispatched and the material returned.
    pub async fn dispatch_classification(
        &mut self,
        classification: &Classification,
    ) -> Result<Option<Material>> {
        if classification.confidence < self.confidence_threshold {
            tracing::debug!(
                label = %classification.label,
                confidence = classification.confidence,
                threshold = self.confidence_threshold,
                "below confidence threshold, frame skipped"
            );
            return Ok(None);
        }

        let material = classification.material();
        self.dispatch(SortCommand::Route(material)).await?;
        Ok(Some(material))
    }

    /// Homes the servos via the reset command.
    pub async fn reset(&mut self) -> Result<()> {
        self.dispatch(SortCommand::Reset).await
    }
}
