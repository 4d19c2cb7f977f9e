//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the connector **requires** the host to implement: the wire
//! transport and a clock. Production adapters live in
//! [`crate::adapters`]; tests inject controllable implementations.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use hsp_types::QosLevel;

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach or authenticate with the broker.
    #[error("Connection to broker failed: {reason}")]
    ConnectionFailed { reason: String },

    /// Operation requires an established connection.
    #[error("Not connected to broker")]
    NotConnected,

    /// The broker refused or dropped the publish.
    #[error("Publish to {topic} rejected: {reason}")]
    PublishRejected { topic: String, reason: String },

    /// The broker refused the subscription.
    #[error("Subscribe to {topic} failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },

    /// The transport has been shut down and cannot be reused.
    #[error("Transport closed")]
    Closed,
}

/// Events the transport pushes to the connector.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An inbound message on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
    /// The established connection was lost. The resilience layer reacts by
    /// starting the reconnect ladder.
    ConnectionLost { reason: String },
}

/// Callback invoked by the transport for each event.
///
/// Implementations must be cheap and non-blocking (the connector's handler
/// just enqueues the event for its dispatch worker).
pub type TransportEventHandler = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Abstract interface to the real publish/subscribe transport.
///
/// # Contract
///
/// - `connect` / `disconnect` are idempotent: calling either in the state
///   it would produce is a successful no-op.
/// - `publish` takes a topic, opaque bytes, and a QoS level; the transport
///   owns the delivery guarantee.
/// - Events (inbound messages, connection loss) are delivered through the
///   handler installed with `set_event_handler`.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the connector calls them from
/// multiple tasks concurrently.
#[async_trait]
pub trait WireTransport: Send + Sync {
    /// Establish the connection.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Tear the connection down. No-op when already disconnected.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Whether the transport currently holds a live connection.
    fn is_connected(&self) -> bool;

    /// Publish `payload` to `topic` at the given QoS level.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QosLevel)
        -> Result<(), TransportError>;

    /// Subscribe to a topic (wildcards per the transport's grammar).
    async fn subscribe(&self, topic: &str, qos: QosLevel) -> Result<(), TransportError>;

    /// Remove a subscription.
    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Install the event handler. Replaces any previous handler.
    fn set_event_handler(&self, handler: TransportEventHandler);
}

/// Abstract interface for time: reading it and sleeping through it.
///
/// Injecting the clock keeps the backoff ladder and staleness windows
/// deterministic under test.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current Unix time in milliseconds.
    fn now_ms(&self) -> u64;

    /// Sleep for `duration`.
    async fn sleep(&self, duration: Duration);
}
