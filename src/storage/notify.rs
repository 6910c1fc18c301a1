//! Keyspace Notifications
//!
//! The storage engine publishes a message on `__keyevent@0__:expired` whenever
//! it removes an expired key, mirroring Redis keyspace events. Publishing is
//! gated by the `notify-keyspace-events` parameter, which starts out empty
//! (notifications disabled) just like on a fresh Redis server.
//!
//! ## Flags
//!
//! - `E`: keyevent notifications (`__keyevent@<db>__:<event>` channels)
//! - `x`: expired events
//! - `A`: alias for all event classes, including `x`
//!
//! Expired events are published only when `E` is set together with `x` or `A`.

use bytes::Bytes;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

/// Channel used for expired key notifications.
pub const KEYEVENT_EXPIRED_CHANNEL: &str = "__keyevent@0__:expired";

/// Name of the configuration parameter controlling notifications.
pub const NOTIFY_KEYSPACE_EVENTS: &str = "notify-keyspace-events";

/// Capacity of the pub/sub channel.
const CHANNEL_CAPACITY: usize = 4096;

/// A pub/sub message: the channel it was published on and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: Bytes,
    pub payload: Bytes,
}

impl Message {
    pub fn new(channel: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Publishes store messages to every subscriber.
#[derive(Debug)]
pub struct KeyspaceNotifier {
    sender: broadcast::Sender<Message>,
    flags: RwLock<String>,
}

impl Default for KeyspaceNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyspaceNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            flags: RwLock::new(String::new()),
        }
    }

    /// Returns the current `notify-keyspace-events` flags.
    pub fn flags(&self) -> String {
        self.flags.read().unwrap().clone()
    }

    /// Replaces the `notify-keyspace-events` flags.
    pub fn set_flags(&self, flags: &str) {
        *self.flags.write().unwrap() = flags.to_string();
    }

    /// Returns true if expired events should be published.
    pub fn expired_events_enabled(&self) -> bool {
        let flags = self.flags.read().unwrap();
        flags.contains('E') && (flags.contains('x') || flags.contains('A'))
    }

    /// Subscribes to all published messages.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }

    /// Publishes a message, returning the number of subscribers that received it.
    pub fn publish(&self, message: Message) -> usize {
        // No subscribers is not an error for pub/sub
        self.sender.send(message).unwrap_or(0)
    }

    /// Publishes an expired event for `key` if expired events are enabled.
    pub fn notify_expired(&self, key: &Bytes) {
        if !self.expired_events_enabled() {
            return;
        }
        let receivers = self.publish(Message::new(KEYEVENT_EXPIRED_CHANNEL, key.clone()));
        trace!(key = ?key, receivers = receivers, "Published expired event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_gate_expired_events() {
        let notifier = KeyspaceNotifier::new();
        assert!(!notifier.expired_events_enabled());

        notifier.set_flags("x");
        assert!(!notifier.expired_events_enabled());

        notifier.set_flags("Ex");
        assert!(notifier.expired_events_enabled());

        notifier.set_flags("EA");
        assert!(notifier.expired_events_enabled());
    }

    #[test]
    fn test_notify_expired() {
        let notifier = KeyspaceNotifier::new();
        let mut rx = notifier.subscribe();

        // Disabled: nothing published
        notifier.notify_expired(&Bytes::from("person:1"));
        assert!(rx.try_recv().is_err());

        notifier.set_flags("Ex");
        notifier.notify_expired(&Bytes::from("person:1"));
        let message = rx.try_recv().unwrap();
        assert_eq!(message.channel, Bytes::from(KEYEVENT_EXPIRED_CHANNEL));
        assert_eq!(message.payload, Bytes::from("person:1"));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = KeyspaceNotifier::new();
        assert_eq!(notifier.publish(Message::new("chan", "payload")), 0);
    }
}
