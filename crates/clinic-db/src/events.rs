//! # Change Feed
//!
//! Live notifications of committed writes.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Change Feed                                    │
//! │                                                                         │
//! │  InventoryRepository::apply_delta                                      │
//! │       │  (after COMMIT)                                                 │
//! │       ▼                                                                 │
//! │  ChangeFeed::publish(ChangeEvent { inventory, inv-1, updated })        │
//! │       │                                                                 │
//! │       ▼  tokio::sync::broadcast                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐                  │
//! │  │ Subscription │  │ Subscription │  │ Subscription │  ...             │
//! │  │  (screen A)  │  │  (screen B)  │  │   (tests)    │                  │
//! │  └──────────────┘  └──────────────┘  └──────────────┘                  │
//! │                                                                         │
//! │  Dropping a Subscription unsubscribes it.                              │
//! │  Publishing with no subscribers is a no-op.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

/// Buffered events per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Table a change happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Medicines,
    Inventory,
    InventoryPurchases,
    InventoryLogs,
    Patients,
    Workorders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub id: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(collection: Collection, id: impl Into<String>, kind: ChangeKind) -> Self {
        ChangeEvent {
            collection,
            id: id.into(),
            kind,
        }
    }
}

/// Sending half, shared by the database handle and its repositories.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        ChangeFeed { tx }
    }

    /// Publishes an event to every live subscription.
    pub fn publish(&self, event: ChangeEvent) {
        // No receivers is not an error
        let _ = self.tx.send(event);
    }

    /// Shorthand for `publish(ChangeEvent::new(..))`.
    pub fn notify(&self, collection: Collection, id: impl Into<String>, kind: ChangeKind) {
        self.publish(ChangeEvent::new(collection, id, kind));
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving half. Drop it to unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once the feed is gone.
    ///
    /// A lagging subscriber skips the events it missed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change feed subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drains every event delivered so far.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let feed = ChangeFeed::new();
        let mut a = feed.subscribe();
        let mut b = feed.subscribe();

        feed.notify(Collection::Inventory, "inv-1", ChangeKind::Updated);

        let expected = ChangeEvent::new(Collection::Inventory, "inv-1", ChangeKind::Updated);
        assert_eq!(a.recv().await, Some(expected.clone()));
        assert_eq!(b.try_recv(), Some(expected));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let feed = ChangeFeed::new();
        let sub = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(sub);
        assert_eq!(feed.subscriber_count(), 0);

        // Publishing with nobody listening is fine
        feed.notify(Collection::Patients, "pat-1", ChangeKind::Created);
    }

    #[test]
    fn test_drain_returns_in_order() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe();

        feed.notify(Collection::Medicines, "m1", ChangeKind::Created);
        feed.notify(Collection::Inventory, "i1", ChangeKind::Created);

        let ids: Vec<String> = sub.drain().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["m1", "i1"]);
        assert!(sub.try_recv().is_none());
    }
}
