//! Link event broadcasting.
//!
//! The hosting HTTP/UI layer subscribes here to surface connection state
//! and firmware chatter without polling the manager.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::types::SortCommand;

/// Events emitted by the link manager.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Handshake completed; the link is usable.
    Connected,
    /// The link was closed or dropped.
    Disconnected,
    /// A liveness probe failed; bounded reconnection is under way.
    Reconnecting,
    /// A command byte was written to the device.
    CommandSent(SortCommand),
    /// A newline-terminated status line the firmware printed back.
    /// Logged and broadcast verbatim, never parsed.
    DeviceLine(String),
}

/// A subscription to link events.
pub struct Subscription {
    receiver: broadcast::Receiver<LinkEvent>,
}

impl Subscription {
    /// Receives the next event.
    ///
    /// Returns `None` once the dispatcher is gone. A slow subscriber that
    /// lags behind skips the missed events rather than erroring.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

struct EventDispatcherInner {
    sender: broadcast::Sender<LinkEvent>,
}

/// Dispatches link events to subscribers.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<EventDispatcherInner>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(EventDispatcherInner { sender }),
        }
    }

    /// Dispatches an event to all subscribers.
    pub fn dispatch(&self, event: LinkEvent) {
        // No receivers is fine; the event is simply dropped.
        let _ = self.inner.sender.send(event);
    }

    /// Subscribes to events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.inner.sender.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_dispatch() {
        let dispatcher = EventDispatcher::new(16);
        let mut sub = dispatcher.subscribe();

        dispatcher.dispatch(LinkEvent::Connected);

        let event = tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv())
            .await
            .unwrap();

        assert!(matches!(event, Some(LinkEvent::Connected)));
    }

    #[tokio::test]
    async fn test_dispatch_without_subscribers_is_fine() {
        let dispatcher = EventDispatcher::new(16);
        dispatcher.dispatch(LinkEvent::Disconnected);
    }
}
