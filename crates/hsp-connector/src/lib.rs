//! # hsp-connector
//!
//! The HSP protocol connector: bridges an in-process bus to an external
//! publish/subscribe transport so independently-running agents can exchange
//! facts, opinions, capability advertisements, and task requests/results.
//!
//! ## Overview
//!
//! This crate provides:
//! - **Data Aligner**: validates and normalizes raw wire bytes into typed
//!   envelopes without ever taking the bridge down on malformed input
//! - **Resilience Layer**: reconnect with bounded exponential backoff,
//!   per-destination circuit breakers, and a bounded offline queue
//! - **Message Bridge**: bidirectional routing between the internal bus and
//!   the external transport
//! - **Connector facade**: the public API agents program against
//!
//! ## Architecture
//!
//! ```text
//!            ┌───────────────────────────────────────────┐
//!            │              HspConnector                 │
//!            │                                           │
//!  agent ──→ │ facade ──→ bridge ──→ circuit ──→ transport ──→ broker
//!            │              │          breaker            │
//!            │              ▼                             │
//!            │        internal bus ←── aligner ←──────────│←── broker
//!            │              │                             │
//!            │              ▼                             │
//!            │        registered callbacks                │
//!            └───────────────────────────────────────────┘
//! ```
//!
//! ## Connection Lifecycle
//!
//! ```text
//! [DISCONNECTED] ──connect()──→ [CONNECTING] ──ok──→ [CONNECTED]
//!        ↑                           │                    │
//!        │                     retries exhausted     connection lost
//!        │                           ▼                    ▼
//!  disconnect()                  [FAILED]          [RECONNECTING {n}]
//!        │                           ↑                    │
//!        └───────────────────────────┴────── retries exhausted
//! ```
//!
//! While FAILED, outbound traffic lands in the offline queue (bounded,
//! drop-oldest by default) and is flushed FIFO once a later `connect()`
//! succeeds.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hsp_connector::{ConnectorConfig, HspConnector};
//!
//! let config = ConnectorConfig::new("did:hsp:alpha", "localhost", 1883);
//! let connector = HspConnector::mock(config);
//! connector.connect().await?;
//!
//! connector.subscribe_to_facts(std::sync::Arc::new(|fact, _kind, envelope| {
//!     println!("fact from {}: {:?}", envelope.sender_ai_id, fact.statement);
//! }));
//! connector.publish_fact(fact, None).await?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod bridge;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export main types
pub use adapters::clock::SystemClock;
pub use adapters::memory::{InMemoryBroker, MemoryTransport};
pub use bridge::{MessageBridge, PublishOutcome};
pub use config::{ConfigError, ConnectorConfig};
pub use domain::aligner::DataAligner;
pub use domain::backoff::BackoffPolicy;
pub use domain::capabilities::CapabilityRegistry;
pub use domain::circuit::{CircuitBreaker, CircuitRegistry, CircuitState};
pub use domain::link::{LinkEvent, LinkState, LinkStateMachine};
pub use domain::offline_queue::{EnqueueOutcome, OfflineQueue, OverflowPolicy};
pub use error::{HspError, HspResult};
pub use ports::inbound::ConnectorApi;
pub use ports::outbound::{Clock, TransportError, TransportEvent, WireTransport};
pub use service::{
    AckCallback, AssertionCallback, CapabilityCallback, CapabilityProvider, ConnectorStatus,
    HealthReport, HspConnector, LifecycleCallback, RequestTarget, TaskHandle,
    TaskRequestCallback, TaskResultCallback,
};
