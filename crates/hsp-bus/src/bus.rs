//! # Bus Core
//!
//! The subscription registry and delivery loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use hsp_types::{topic_matches, BusMessage};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// An async subscriber callback.
///
/// Returning `Err` marks the delivery as failed for this subscriber only;
/// other subscribers still receive the message.
pub type BusCallback = Arc<dyn Fn(BusMessage) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure into a [`BusCallback`].
pub fn boxed_callback<F, Fut>(f: F) -> BusCallback
where
    F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |msg| f(msg).boxed())
}

/// Handle identifying one registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    callback: BusCallback,
}

pub(crate) struct BusInner {
    /// Topic pattern -> subscribers in registration order.
    subscriptions: RwLock<HashMap<String, Vec<Subscriber>>>,
    /// Monotonic id source; doubles as the global registration order.
    next_id: AtomicU64,
    /// Total messages published.
    published: AtomicU64,
    /// Total failed callback deliveries.
    delivery_failures: AtomicU64,
}

/// In-process pub/sub bus.
///
/// Cloning is cheap and shares the registry.
#[derive(Clone)]
pub struct InternalBus {
    pub(crate) inner: Arc<BusInner>,
}

impl InternalBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscriptions: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                published: AtomicU64::new(0),
                delivery_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Register a callback for topics matching `pattern`.
    ///
    /// Patterns may use `+` (one level) and a trailing `#` (any remainder).
    pub fn subscribe(&self, pattern: impl Into<String>, callback: BusCallback) -> SubscriptionId {
        let pattern = pattern.into();
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs = self.inner.subscriptions.write();
        subs.entry(pattern.clone())
            .or_default()
            .push(Subscriber { id, callback });
        debug!(pattern = %pattern, id = id.0, "Bus subscription created");
        id
    }

    /// Remove a registration. Returns whether it existed.
    pub fn unsubscribe(&self, pattern: &str, id: SubscriptionId) -> bool {
        let mut subs = self.inner.subscriptions.write();
        let Some(list) = subs.get_mut(pattern) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() < before;
        if list.is_empty() {
            subs.remove(pattern);
        }
        if removed {
            debug!(pattern = %pattern, id = id.0, "Bus subscription removed");
        }
        removed
    }

    /// Deliver a message to every matching subscriber, in registration
    /// order, awaiting each callback in turn.
    ///
    /// Returns the number of subscribers that received the message
    /// (failing callbacks included; they were invoked).
    pub async fn publish(&self, topic: &str, message: BusMessage) -> usize {
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        // Snapshot matching subscribers so callbacks can re-enter the bus.
        let matching: Vec<(SubscriptionId, BusCallback)> = {
            let subs = self.inner.subscriptions.read();
            let mut matching: Vec<(SubscriptionId, BusCallback)> = subs
                .iter()
                .filter(|(pattern, _)| topic_matches(pattern, topic))
                .flat_map(|(_, list)| list.iter().map(|s| (s.id, Arc::clone(&s.callback))))
                .collect();
            // Registration order across patterns, not map iteration order.
            matching.sort_by_key(|(id, _)| id.0);
            matching
        };

        if matching.is_empty() {
            debug!(topic = %topic, "Bus message dropped (no subscribers)");
            return 0;
        }

        let delivered = matching.len();
        for (id, callback) in matching {
            if let Err(error) = callback(message.clone()).await {
                self.inner.delivery_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    topic = %topic,
                    subscriber = id.0,
                    error = %error,
                    "Bus subscriber failed; continuing delivery"
                );
            }
        }
        delivered
    }

    /// Fire-and-forget variant of [`InternalBus::publish`].
    ///
    /// Delivery happens on a spawned task; ordering relative to other
    /// detached publishes is not guaranteed.
    pub fn publish_detached(&self, topic: impl Into<String>, message: BusMessage) {
        let bus = self.clone();
        let topic = topic.into();
        tokio::spawn(async move {
            bus.publish(&topic, message).await;
        });
    }

    /// Total messages published.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Total failed callback deliveries.
    #[must_use]
    pub fn delivery_failures(&self) -> u64 {
        self.inner.delivery_failures.load(Ordering::Relaxed)
    }

    /// Current number of registrations across all patterns.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.read().values().map(Vec::len).sum()
    }
}

impl Default for InternalBus {
    fn default() -> Self {
        Self::new()
    }
}
