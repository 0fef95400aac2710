//! Best-effort signal relay between session managers.
//!
//! When a manager evicts the previous holder of a seat, it publishes a
//! [`RelaySignal::ForceLogout`] here so that a loser running in the same
//! process hears about the eviction immediately instead of waiting for its
//! next registry check. Delivery is best-effort: managers on other hosts
//! never see these signals and rely on the registry watch or poll instead.

use seatlock_protocol::RelaySignal;
use tokio::sync::broadcast;

/// Channel capacity for relay signals.
///
/// Evictions are rare; a small buffer is enough to absorb a burst while a
/// subscriber is between polls of its receiver.
const RELAY_CAPACITY: usize = 64;

/// Broadcast bus for force-logout signals.
///
/// Cloning the relay is cheap; all clones share the same channel. A relay
/// with no subscribers silently drops published signals.
#[derive(Debug, Clone)]
pub struct SignalRelay {
    tx: broadcast::Sender<RelaySignal>,
}

impl SignalRelay {
    /// Creates a new relay with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(RELAY_CAPACITY);
        Self { tx }
    }

    /// Publishes a signal to all current subscribers.
    ///
    /// Send errors mean nobody is listening, which is fine.
    pub fn publish(&self, signal: RelaySignal) {
        let _ = self.tx.send(signal);
    }

    /// Returns a receiver for relay signals.
    ///
    /// Only signals published after this call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<RelaySignal> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SignalRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatlock_protocol::{AccountId, SessionId};

    fn force_logout(account: &str) -> RelaySignal {
        RelaySignal::ForceLogout {
            account_id: AccountId::new(account),
            winner: SessionId::generate(),
            at_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let relay = SignalRelay::new();
        let mut rx = relay.subscribe();

        let signal = force_logout("user@example.com");
        relay.publish(signal.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, signal);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_panic() {
        let relay = SignalRelay::new();
        relay.publish(force_logout("user@example.com"));
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let relay = SignalRelay::new();
        let clone = relay.clone();
        let mut rx = clone.subscribe();

        relay.publish(force_logout("user@example.com"));

        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_subscriber_only_sees_later_signals() {
        let relay = SignalRelay::new();
        relay.publish(force_logout("early@example.com"));

        let mut rx = relay.subscribe();
        relay.publish(force_logout("late@example.com"));

        let received = rx.recv().await.unwrap();
        let RelaySignal::ForceLogout { account_id, .. } = received;
        assert_eq!(account_id.as_str(), "late@example.com");
    }

    #[tokio::test]
    async fn test_subscriber_count() {
        let relay = SignalRelay::new();
        assert_eq!(relay.subscriber_count(), 0);

        let _rx1 = relay.subscribe();
        let _rx2 = relay.subscribe();
        assert_eq!(relay.subscriber_count(), 2);

        drop(_rx1);
        assert_eq!(relay.subscriber_count(), 1);
    }
}
