//! In-flight registry guaranteeing one decode per key at a time.
//!
//! The first caller for a key becomes the leader; later callers for the same
//! key are parked as waiters. When the leader finishes, every parked caller
//! (the leader included) receives the same outcome through its own channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use super::decoder::DecodedImage;

/// Result shared with every caller of one flight. `None` = no image.
pub type DecodeOutcome = Option<Arc<DecodedImage>>;

/// Role handed out by [`InFlightRegistry::join`].
#[derive(Debug)]
pub enum Flight {
    /// The caller must run the decode and then call [`LeaderGuard::complete`].
    Leader(LeaderGuard, oneshot::Receiver<DecodeOutcome>),
    /// Another caller is decoding; await the receiver for its outcome.
    Waiter(oneshot::Receiver<DecodeOutcome>),
}

/// Registry of keys currently being decoded.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    flights: Mutex<HashMap<String, Vec<oneshot::Sender<DecodeOutcome>>>>,
}

impl InFlightRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically becomes the leader for `key`, or registers as a waiter.
    pub fn join(self: &Arc<Self>, key: &str) -> Flight {
        let (sender, receiver) = oneshot::channel();
        let mut flights = self.lock();
        if let Some(waiters) = flights.get_mut(key) {
            waiters.push(sender);
            return Flight::Waiter(receiver);
        }
        flights.insert(key.to_string(), vec![sender]);
        Flight::Leader(
            LeaderGuard {
                registry: Arc::clone(self),
                key: key.to_string(),
                completed: false,
            },
            receiver,
        )
    }

    /// Returns whether a decode for `key` is underway.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of keys currently in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when no decode is underway.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn release(&self, key: &str) -> Vec<oneshot::Sender<DecodeOutcome>> {
        self.lock().remove(key).unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<oneshot::Sender<DecodeOutcome>>>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Leadership of one key's flight.
///
/// Dropping the guard without calling [`complete`](Self::complete) (leader
/// panicked or was torn down) removes the record and releases every waiter
/// with an empty outcome.
#[derive(Debug)]
pub struct LeaderGuard {
    registry: Arc<InFlightRegistry>,
    key: String,
    completed: bool,
}

impl LeaderGuard {
    /// The key this guard leads.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Ends the flight and hands `outcome` to every registered caller.
    pub fn complete(mut self, outcome: &DecodeOutcome) {
        self.completed = true;
        for waiter in self.registry.release(&self.key) {
            // Receivers dropped by cancelled callers are fine to skip.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.completed {
            for waiter in self.registry.release(&self.key) {
                let _ = waiter.send(None);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn image() -> DecodeOutcome {
        Some(Arc::new(DecodedImage {
            width: 1,
            height: 1,
            pixels: vec![1, 2, 3, 4],
        }))
    }

    #[tokio::test]
    async fn test_first_caller_leads_and_others_wait() {
        let registry = Arc::new(InFlightRegistry::new());

        let Flight::Leader(guard, leader_rx) = registry.join("a") else {
            panic!("first caller must lead");
        };
        let Flight::Waiter(waiter_rx) = registry.join("a") else {
            panic!("second caller must wait");
        };
        assert!(registry.contains("a"));
        assert_eq!(registry.len(), 1);

        guard.complete(&image());

        assert_eq!(leader_rx.await.unwrap(), image());
        assert_eq!(waiter_rx.await.unwrap(), image());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_each_get_a_leader() {
        let registry = Arc::new(InFlightRegistry::new());
        assert!(matches!(registry.join("a"), Flight::Leader(..)));
        assert!(matches!(registry.join("b"), Flight::Leader(..)));
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_waiters_empty() {
        let registry = Arc::new(InFlightRegistry::new());
        let Flight::Leader(guard, _leader_rx) = registry.join("a") else {
            panic!("first caller must lead");
        };
        let Flight::Waiter(waiter_rx) = registry.join("a") else {
            panic!("second caller must wait");
        };

        drop(guard);

        assert_eq!(waiter_rx.await.unwrap(), None);
        assert!(!registry.contains("a"));
    }

    #[tokio::test]
    async fn test_key_can_be_led_again_after_completion() {
        let registry = Arc::new(InFlightRegistry::new());
        let Flight::Leader(guard, _rx) = registry.join("a") else {
            panic!("first caller must lead");
        };
        guard.complete(&None);
        assert!(matches!(registry.join("a"), Flight::Leader(..)));
    }
}
