//! In-memory broker and transport.
//!
//! A process-local routing hub implementing the same contract a real
//! broker-backed transport would. Serves three roles:
//!
//! - mock mode: a connector with a private broker loops publishes straight
//!   back to its own subscriptions
//! - integration tests: several connectors share one broker and exchange
//!   real wire bytes
//! - outage simulation: the broker can be taken down (`set_available`),
//!   which fails connects/publishes and pushes `ConnectionLost` to every
//!   connected client, and individual topics can be made to reject
//!   publishes while the link stays up

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::ports::outbound::{
    TransportError, TransportEvent, TransportEventHandler, WireTransport,
};
use hsp_types::{topic_matches, QosLevel};

#[derive(Default)]
struct ClientState {
    connected: bool,
    subscriptions: Vec<String>,
    handler: Option<TransportEventHandler>,
}

struct BrokerInner {
    clients: Mutex<HashMap<u64, ClientState>>,
    next_client_id: AtomicU64,
    available: AtomicBool,
    /// Topics that currently reject publishes (per-destination fault
    /// injection while the link stays up).
    failing_topics: Mutex<HashSet<String>>,
    /// Publish attempts that reached the broker, per topic.
    publish_attempts: Mutex<HashMap<String, u64>>,
    total_publishes: AtomicU64,
}

/// Process-local pub/sub hub.
///
/// Cloning is cheap and shares the hub.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    /// Create an available broker with no clients.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                clients: Mutex::new(HashMap::new()),
                next_client_id: AtomicU64::new(0),
                available: AtomicBool::new(true),
                failing_topics: Mutex::new(HashSet::new()),
                publish_attempts: Mutex::new(HashMap::new()),
                total_publishes: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new client and return its transport handle.
    #[must_use]
    pub fn client(&self) -> MemoryTransport {
        let client_id = self.inner.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .clients
            .lock()
            .insert(client_id, ClientState::default());
        MemoryTransport {
            inner: Arc::clone(&self.inner),
            client_id,
        }
    }

    /// Take the broker down or bring it back.
    ///
    /// Going down disconnects every client and delivers `ConnectionLost`
    /// to their handlers.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        if available {
            return;
        }
        let handlers: Vec<TransportEventHandler> = {
            let mut clients = self.inner.clients.lock();
            clients
                .values_mut()
                .filter_map(|client| {
                    if std::mem::replace(&mut client.connected, false) {
                        client.handler.clone()
                    } else {
                        None
                    }
                })
                .collect()
        };
        for handler in handlers {
            handler(TransportEvent::ConnectionLost {
                reason: "broker unavailable".into(),
            });
        }
    }

    /// Whether the broker currently accepts traffic.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Make publishes to one topic fail while the link stays up.
    pub fn fail_topic(&self, topic: impl Into<String>) {
        self.inner.failing_topics.lock().insert(topic.into());
    }

    /// Stop failing publishes to one topic.
    pub fn restore_topic(&self, topic: &str) {
        self.inner.failing_topics.lock().remove(topic);
    }

    /// Publish attempts that reached the broker for `topic`.
    #[must_use]
    pub fn publish_attempts(&self, topic: &str) -> u64 {
        self.inner
            .publish_attempts
            .lock()
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    /// Total publish attempts that reached the broker.
    #[must_use]
    pub fn total_publishes(&self) -> u64 {
        self.inner.total_publishes.load(Ordering::Relaxed)
    }

    /// Number of currently connected clients.
    #[must_use]
    pub fn connected_clients(&self) -> usize {
        self.inner
            .clients
            .lock()
            .values()
            .filter(|client| client.connected)
            .count()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerInner {
    fn route(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(TransportError::PublishRejected {
                topic: topic.to_owned(),
                reason: "broker unavailable".into(),
            });
        }

        self.total_publishes.fetch_add(1, Ordering::Relaxed);
        *self
            .publish_attempts
            .lock()
            .entry(topic.to_owned())
            .or_insert(0) += 1;

        if self.failing_topics.lock().contains(topic) {
            return Err(TransportError::PublishRejected {
                topic: topic.to_owned(),
                reason: "injected failure".into(),
            });
        }

        // Snapshot matching handlers, then deliver outside the lock.
        let handlers: Vec<TransportEventHandler> = {
            let clients = self.clients.lock();
            clients
                .values()
                .filter(|client| {
                    client.connected
                        && client
                            .subscriptions
                            .iter()
                            .any(|pattern| topic_matches(pattern, topic))
                })
                .filter_map(|client| client.handler.clone())
                .collect()
        };
        debug!(topic = %topic, receivers = handlers.len(), "Broker routed message");
        for handler in handlers {
            handler(TransportEvent::Message {
                topic: topic.to_owned(),
                payload: payload.to_vec(),
            });
        }
        Ok(())
    }
}

/// One client's handle onto an [`InMemoryBroker`].
pub struct MemoryTransport {
    inner: Arc<BrokerInner>,
    client_id: u64,
}

impl MemoryTransport {
    fn with_client<R>(&self, f: impl FnOnce(&mut ClientState) -> R) -> Result<R, TransportError> {
        let mut clients = self.inner.clients.lock();
        clients
            .get_mut(&self.client_id)
            .map(f)
            .ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl WireTransport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed {
                reason: "broker unavailable".into(),
            });
        }
        self.with_client(|client| client.connected = true)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.with_client(|client| client.connected = false)
    }

    fn is_connected(&self) -> bool {
        self.with_client(|client| client.connected).unwrap_or(false)
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        _qos: QosLevel,
    ) -> Result<(), TransportError> {
        let connected = self.with_client(|client| client.connected)?;
        if !connected {
            return Err(TransportError::NotConnected);
        }
        self.inner.route(topic, payload)
    }

    async fn subscribe(&self, topic: &str, _qos: QosLevel) -> Result<(), TransportError> {
        let connected = self.with_client(|client| client.connected)?;
        if !connected {
            return Err(TransportError::NotConnected);
        }
        self.with_client(|client| {
            if !client.subscriptions.iter().any(|s| s == topic) {
                client.subscriptions.push(topic.to_owned());
            }
        })
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.with_client(|client| client.subscriptions.retain(|s| s != topic))
    }

    fn set_event_handler(&self, handler: TransportEventHandler) {
        let _ = self.with_client(|client| client.handler = Some(handler));
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.inner.clients.lock().remove(&self.client_id);
    }
}
