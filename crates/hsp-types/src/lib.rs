//! # hsp-types
//!
//! Protocol type definitions for the HSP agent mesh.
//!
//! Every message exchanged between agents travels inside a versioned
//! [`MessageEnvelope`]. The payload is a closed set of tagged variants
//! ([`MessagePayload`]) rather than free-form maps, so a receiving agent can
//! dispatch on type without inspecting field soup.
//!
//! ## Wire Contract
//!
//! - Topic: hierarchical string, e.g. `hsp/knowledge/facts/<ai_id>`
//! - Payload: UTF-8 JSON encoding of the envelope
//! - QoS: integer 0/1/2 passed through to the transport
//!
//! ```text
//! ┌────────────┐   publish(topic, json, qos)   ┌────────────┐
//! │  Agent A   │ ────────────────────────────→ │  transport │
//! └────────────┘                               └────────────┘
//!                                                    │ on_message
//!                                                    ▼
//!                                              ┌────────────┐
//!                                              │  Agent B   │
//!                                              └────────────┘
//! ```

pub mod bus;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod qos;
pub mod topic;

// Re-export main types
pub use bus::{BusMessage, OutboundBody, OutboundMessage};
pub use envelope::{
    AiId, MessageEnvelope, MessageType, RawEnvelope, BROADCAST_RECIPIENT, PROTOCOL_VERSION,
};
pub use error::AlignmentError;
pub use payload::{
    AckPayload, AckStatus, AssertionKind, AssertionPayload, CapabilityAvailability,
    CapabilityPayload, MessagePayload, Statement, TaskError, TaskRequestPayload,
    TaskResultPayload, TaskStatus,
};
pub use qos::{MessagePriority, QosLevel, QosParams};
pub use topic::{topic_matches, Topics, BUS_INTERNAL_MESSAGE};
