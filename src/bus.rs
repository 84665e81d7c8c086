//! Typed event bus
//!
//! Explicit channel-based fan-out: subscribers receive their own unbounded
//! channel and an unsubscribe token. Delivery happens on whichever context
//! calls `publish`; for notification events that is always the pipeline
//! worker, never an arbitrary publisher thread.

use ahash::{HashMap, HashMapExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Token identifying one subscription; pass back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken(u64);

/// One subscriber's end of the bus.
pub struct Subscription<T> {
    pub token: SubscriptionToken,
    pub receiver: mpsc::UnboundedReceiver<T>,
}

pub struct EventBus<T> {
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<T>>>,
    next_token: AtomicU64,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().insert(token, tx);
        Subscription {
            token: SubscriptionToken(token),
            receiver: rx,
        }
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.subscribers.lock().unwrap().remove(&token.0);
    }

    /// Deliver `event` to every live subscriber, pruning any whose receiver
    /// was dropped without unsubscribing.
    pub fn publish(&self, event: T) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}
