//! Connection manager and command dispatcher for the sorter link.
//!
//! State machine: `Disconnected -> Connecting -> Connected -> Disconnected`
//! on explicit close or fatal I/O error, with `Reconnecting` entered from
//! `Connected` when a liveness probe fails. At most one open handle exists
//! at a time; a new open always closes the prior handle first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::discovery;
use crate::error::{Error, Result};
use crate::event::{EventDispatcher, LinkEvent, Subscription};
use crate::transport::Transport;
use crate::types::{LinkState, SortCommand};

/// Timing and retry policy for the link.
///
/// The defaults match the firmware: a freshly opened port resets the
/// controller, which takes about two seconds to boot and print its banner.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Open attempts for a single `connect` call.
    pub open_attempts: u32,
    /// Delay between open attempts.
    pub open_retry_delay: Duration,
    /// Grace period after closing a handle, giving the OS time to release
    /// the device before it is reopened.
    pub close_grace: Duration,
    /// Firmware boot time after the port opens.
    pub warm_up: Duration,
    /// Window for collecting handshake and status lines.
    pub response_window: Duration,
    /// Reconnect attempts before the manager gives up and requires
    /// external intervention.
    pub max_reconnect_attempts: u32,
    /// Delay before each reconnect attempt.
    pub reconnect_delay: Duration,
}

impl LinkConfig {
    /// Creates the default policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            open_attempts: 3,
            open_retry_delay: Duration::from_secs(1),
            close_grace: Duration::from_millis(500),
            warm_up: Duration::from_secs(2),
            response_window: Duration::from_secs(1),
            max_reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(1),
        }
    }

    /// Sets the number of open attempts per connect call.
    #[must_use]
    pub const fn open_attempts(mut self, attempts: u32) -> Self {
        self.open_attempts = attempts;
        self
    }

    /// Sets the firmware warm-up delay.
    #[must_use]
    pub const fn warm_up(mut self, warm_up: Duration) -> Self {
        self.warm_up = warm_up;
        self
    }

    /// Sets the reconnect budget.
    #[must_use]
    pub const fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection manager owning the single serial handle.
///
/// The transport sits behind a mutex so that no two operations can
/// interleave on the wire, whatever the hosting layer does with the
/// manager.
pub struct LinkManager<T> {
    transport: Arc<Mutex<T>>,
    config: LinkConfig,
    dispatcher: EventDispatcher,
    state: LinkState,
    /// Last port a connect succeeded or was attempted on; reconnect target.
    port: Option<String>,
    /// Attempts made since the last successful open.
    reconnect_attempts: u32,
}

impl<T: Transport> LinkManager<T> {
    /// Creates a manager over the given transport.
    #[must_use]
    pub fn new(transport: T, config: LinkConfig) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            config,
            dispatcher: EventDispatcher::new(64),
            state: LinkState::Disconnected,
            port: None,
            reconnect_attempts: 0,
        }
    }

    /// Current state of the link.
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Returns true when the link is usable.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected)
    }

    /// The port the manager last connected (or tried to connect) to.
    #[must_use]
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Subscribes to link events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    /// Connects to the sorter.
    ///
    /// With no port given, the first discovery candidate is used. Any
    /// existing handle is closed first, with a grace period for the OS to
    /// release the device. The open is retried a bounded number of times
    /// at a fixed delay; on success the manager waits out the firmware
    /// boot, drops the boot banner, sends the reset handshake and collects
    /// whatever the firmware prints back. A silent device is not a
    /// failure.
    pub async fn connect(&mut self, port: Option<&str>) -> Result<()> {
        let path = match port {
            Some(p) => p.to_owned(),
            None => discovery::list_candidate_ports()
                .into_iter()
                .next()
                .map(|candidate| candidate.path)
                .ok_or(Error::PortNotFound)?,
        };

        self.state = LinkState::Connecting;
        self.port = Some(path.clone());

        // One handle at a time: close before reopening.
        let had_handle = {
            let mut transport = self.transport.lock().await;
            if transport.is_open() {
                if let Err(e) = transport.close().await {
                    tracing::warn!("closing previous handle failed: {e}");
                }
                true
            } else {
                false
            }
        };
        if had_handle {
            tokio::time::sleep(self.config.close_grace).await;
        }

        if let Err(e) = self.open_with_retries(&path).await {
            self.state = LinkState::Disconnected;
            return Err(e);
        }

        // The open reset the controller; wait out the firmware boot.
        tokio::time::sleep(self.config.warm_up).await;

        if let Err(e) = self.handshake().await {
            tracing::error!("handshake failed: {e}");
            let mut transport = self.transport.lock().await;
            let _ = transport.close().await;
            drop(transport);
            self.state = LinkState::Disconnected;
            return Err(e);
        }

        self.reconnect_attempts = 0;
        self.state = LinkState::Connected;
        self.dispatcher.dispatch(LinkEvent::Connected);
        tracing::info!(port = %path, "sorter link established");
        Ok(())
    }

    /// Bounded open loop, surfacing the last classified error.
    async fn open_with_retries(&mut self, path: &str) -> Result<()> {
        let attempts = self.config.open_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let result = {
                let mut transport = self.transport.lock().await;
                transport.set_path(path);
                transport.open().await
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(attempt, attempts, "open failed: {e}");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.open_retry_delay).await;
                    }
                }
            }
        }

        Err(Error::OpenExhausted {
            attempts,
            last_error: last_error.map_or_else(String::new, |e| e.to_string()),
        })
    }

    /// Drops the boot banner and sends the reset handshake.
    async fn handshake(&mut self) -> Result<()> {
        let mut transport = self.transport.lock().await;

        // Banner drain is best effort; the handshake write is not.
        if let Err(e) = transport.clear_input().await {
            tracing::debug!("banner drain failed: {e}");
        }
        transport.write_byte(SortCommand::Reset.byte()).await?;

        match transport.read_lines(self.config.response_window).await {
            Ok(lines) => {
                drop(transport);
                for line in lines {
                    tracing::info!(device = %line, "handshake response");
                    self.dispatcher.dispatch(LinkEvent::DeviceLine(line));
                }
            }
            Err(e) => tracing::debug!("no handshake response: {e}"),
        }
        Ok(())
    }

    /// Cheap liveness probe on the existing handle.
    ///
    /// When the probe fails or the handle reports closed, triggers a
    /// bounded [`LinkManager::reconnect`] and returns its outcome. Returns
    /// false without touching the OS when the manager is not `Connected`.
    pub async fn ensure_alive(&mut self) -> bool {
        if self.state != LinkState::Connected {
            return false;
        }

        let alive = {
            let mut transport = self.transport.lock().await;
            transport.is_open() && transport.clear_input().await.is_ok()
        };
        if alive {
            return true;
        }

        tracing::warn!("liveness probe failed, attempting reconnect");
        self.reconnect().await.is_ok()
    }

    /// Bounded reconnection to the last known port.
    ///
    /// The attempt counter persists across calls and is reset only by a
    /// successful open, so a permanently unplugged device cannot cause a
    /// retry spin: once the budget is spent every call returns
    /// [`Error::RetriesExhausted`] immediately.
    pub async fn reconnect(&mut self) -> Result<()> {
        let Some(port) = self.port.clone() else {
            return Err(Error::PortNotFound);
        };

        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            self.state = LinkState::Disconnected;
            return Err(Error::RetriesExhausted {
                attempts: self.reconnect_attempts,
            });
        }

        self.state = LinkState::Reconnecting;
        self.dispatcher.dispatch(LinkEvent::Reconnecting);

        while self.reconnect_attempts < self.config.max_reconnect_attempts {
            self.reconnect_attempts += 1;
            let attempt = self.reconnect_attempts;
            tracing::info!(
                attempt,
                max = self.config.max_reconnect_attempts,
                port = %port,
                "reconnecting"
            );

            // Drop the stale handle before trying again.
            {
                let mut transport = self.transport.lock().await;
                if transport.is_open() {
                    let _ = transport.close().await;
                }
            }
            tokio::time::sleep(self.config.reconnect_delay).await;

            match self.connect(Some(&port)).await {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!(attempt, "reconnect attempt failed: {e}"),
            }
        }

        self.state = LinkState::Disconnected;
        self.dispatcher.dispatch(LinkEvent::Disconnected);
        Err(Error::RetriesExhausted {
            attempts: self.reconnect_attempts,
        })
    }

    /// Closes the link. Idempotent.
    pub async fn disconnect(&mut self) {
        {
            let mut transport = self.transport.lock().await;
            if transport.is_open() {
                if let Err(e) = transport.close().await {
                    tracing::warn!("close failed: {e}");
                }
            }
        }
        self.reconnect_attempts = 0;
        if self.state != LinkState::Disconnected {
            self.state = LinkState::Disconnected;
            self.dispatcher.dispatch(LinkEvent::Disconnected);
        }
    }

    /// Sends a single command byte to the sorter.
    ///
    /// Fire-and-forget: success means the byte was written and flushed,
    /// not that the servos finished moving. The firmware prints progress
    /// lines back; they are collected within the response window for
    /// logging only. The missing per-command acknowledgment is a known
    /// weakness of the wire protocol, inherited from the firmware.
    ///
    /// Refuses with [`Error::NotConnected`] when the link is not up - no
    /// OS write is attempted. A write-level I/O error closes the handle
    /// and drops the manager to `Disconnected`.
    pub async fn send(&mut self, command: SortCommand) -> Result<()> {
        if self.state != LinkState::Connected {
            return Err(Error::NotConnected);
        }

        let byte = command.byte();
        let mut transport = self.transport.lock().await;

        if let Err(e) = transport.clear_input().await {
            tracing::debug!("stale input clear failed: {e}");
        }

        if let Err(e) = transport.write_byte(byte).await {
            tracing::error!(byte = %char::from(byte), "command write failed: {e}");
            let _ = transport.close().await;
            drop(transport);
            self.state = LinkState::Disconnected;
            self.dispatcher.dispatch(LinkEvent::Disconnected);
            return Err(e);
        }

        let lines = transport
            .read_lines(self.config.response_window)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!("response read failed: {e}");
                Vec::new()
            });
        drop(transport);

        tracing::debug!(byte = %char::from(byte), "command dispatched");
        self.dispatcher.dispatch(LinkEvent::CommandSent(command));
        for line in lines {
            tracing::info!(device = %line, "device status");
            self.dispatcher.dispatch(LinkEvent::DeviceLine(line));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::types::Material;

    fn manager() -> (
        LinkManager<MockTransport>,
        Arc<std::sync::Mutex<crate::transport::mock::MockState>>,
    ) {
        let (transport, state) = MockTransport::new();
        (LinkManager::new(transport, LinkConfig::new()), state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sends_reset_handshake() {
        let (mut manager, state) = manager();
        manager.connect(Some("/dev/ttyUSB0")).await.unwrap();

        assert_eq!(manager.state(), LinkState::Connected);
        let state = state.lock().unwrap();
        assert_eq!(state.written, vec![b'R']);
        assert_eq!(state.opens, 1);
        assert_eq!(state.path.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_connect_closes_previous_handle() {
        let (mut manager, state) = manager();
        manager.connect(Some("/dev/ttyUSB0")).await.unwrap();
        manager.connect(Some("/dev/ttyUSB0")).await.unwrap();
        manager.connect(Some("/dev/ttyACM1")).await.unwrap();

        let state = state.lock().unwrap();
        // Every reopen was preceded by a close: no leaked handles.
        assert_eq!(state.opens, 3);
        assert_eq!(state.closes, 2);
        assert!(state.open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_retries_then_succeeds() {
        let (mut manager, state) = manager();
        state.lock().unwrap().fail_opens = 2;

        manager.connect(Some("/dev/ttyUSB0")).await.unwrap();
        assert_eq!(manager.state(), LinkState::Connected);
        assert_eq!(state.lock().unwrap().opens, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_exhaustion_surfaces_last_error() {
        let (mut manager, state) = manager();
        state.lock().unwrap().fail_opens = u32::MAX;

        let err = manager.connect(Some("/dev/ttyUSB0")).await.unwrap_err();
        assert!(matches!(err, Error::OpenExhausted { attempts: 3, .. }));
        assert_eq!(manager.state(), LinkState::Disconnected);
        assert_eq!(state.lock().unwrap().opens, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_when_disconnected_does_not_write() {
        let (mut manager, state) = manager();

        let err = manager.send(SortCommand::Route(Material::Paper)).await;
        assert!(matches!(err, Err(Error::NotConnected)));
        assert!(state.lock().unwrap().written.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_drops_link() {
        let (mut manager, state) = manager();
        manager.connect(Some("/dev/ttyUSB0")).await.unwrap();
        state.lock().unwrap().fail_write = true;

        let err = manager.send(SortCommand::Route(Material::Metal)).await;
        assert!(matches!(err, Err(Error::Write(_))));
        assert_eq!(manager.state(), LinkState::Disconnected);
        assert!(!state.lock().unwrap().open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_budget_is_bounded() {
        let (mut manager, state) = manager();
        manager.connect(Some("/dev/ttyUSB0")).await.unwrap();

        // Kill the device: probe fails, every reopen fails.
        {
            let mut state = state.lock().unwrap();
            state.fail_clear = true;
            state.fail_opens = u32::MAX;
        }

        assert!(!manager.ensure_alive().await);
        assert_eq!(manager.state(), LinkState::Disconnected);

        // The budget is spent; further calls return at once without I/O.
        let opens_before = state.lock().unwrap().opens;
        let err = manager.reconnect().await.unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3 }));
        assert_eq!(state.lock().unwrap().opens, opens_before);
        assert_eq!(manager.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_counter_resets_on_success() {
        let (mut manager, state) = manager();
        manager.connect(Some("/dev/ttyUSB0")).await.unwrap();

        // Handle silently dropped; the reopen recovers on its second try.
        {
            let mut state = state.lock().unwrap();
            state.open = false;
            state.fail_opens = 1;
        }

        assert!(manager.ensure_alive().await);
        assert_eq!(manager.state(), LinkState::Connected);
        assert_eq!(manager.reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent() {
        let (mut manager, state) = manager();
        manager.connect(Some("/dev/ttyUSB0")).await.unwrap();

        manager.disconnect().await;
        manager.disconnect().await;

        assert_eq!(manager.state(), LinkState::Disconnected);
        assert_eq!(state.lock().unwrap().closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_paper_dispatch() {
        let (mut manager, state) = manager();
        manager.connect(Some("/dev/ttyUSB0")).await.unwrap();

        manager
            .send(SortCommand::Route(Material::Paper))
            .await
            .unwrap();

        let state = state.lock().unwrap();
        let paper_writes = state.written.iter().filter(|&&b| b == 0x50).count();
        assert_eq!(paper_writes, 1);
        assert_eq!(*state.written.last().unwrap(), b'P');
        drop(state);
        assert_eq!(manager.state(), LinkState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_status_lines_are_broadcast() {
        let (mut manager, state) = manager();
        manager.connect(Some("/dev/ttyUSB0")).await.unwrap();
        let mut sub = manager.subscribe();

        state
            .lock()
            .unwrap()
            .lines
            .push_back(vec!["sorting paper".into(), "done".into()]);

        manager
            .send(SortCommand::Route(Material::Paper))
            .await
            .unwrap();

        assert!(matches!(sub.recv().await, Some(LinkEvent::CommandSent(_))));
        let Some(LinkEvent::DeviceLine(line)) = sub.recv().await else {
            panic!("expected a device line");
        };
        assert_eq!(line, "sorting paper");
    }
}
