//! # Bus Frames
//!
//! Message shapes carried by the in-process bus. Inbound traffic travels as
//! aligned envelopes; outbound traffic travels as [`OutboundMessage`]
//! frames that the bridge encodes and hands to the transport.

use std::sync::Arc;

use crate::envelope::MessageEnvelope;
use crate::qos::QosLevel;

/// Body of an outbound frame, with its wire encoding rule.
///
/// Encoding: `Envelope` and `Json` become JSON bytes, `Text` becomes UTF-8
/// bytes, `Raw` passes through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    /// A protocol envelope (the normal case).
    Envelope(MessageEnvelope),
    /// Arbitrary structured data.
    Json(serde_json::Value),
    /// Plain text.
    Text(String),
    /// Pre-encoded bytes.
    Raw(Vec<u8>),
}

impl OutboundBody {
    /// Encode the body to wire bytes.
    ///
    /// # Errors
    ///
    /// Propagates JSON serialization failures for the structured variants.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Envelope(envelope) => envelope.to_wire(),
            Self::Json(value) => serde_json::to_vec(value),
            Self::Text(text) => Ok(text.as_bytes().to_vec()),
            Self::Raw(bytes) => Ok(bytes.clone()),
        }
    }
}

/// An outbound publication: destination topic, QoS, and body.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub qos: QosLevel,
    pub body: OutboundBody,
}

impl OutboundMessage {
    /// Frame an envelope for publication.
    #[must_use]
    pub fn envelope(topic: impl Into<String>, qos: QosLevel, envelope: MessageEnvelope) -> Self {
        Self {
            topic: topic.into(),
            qos,
            body: OutboundBody::Envelope(envelope),
        }
    }
}

/// What the internal bus carries.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// An aligned inbound envelope, shared across subscribers.
    Inbound(Arc<MessageEnvelope>),
    /// An outbound frame awaiting transport publication.
    Outbound(OutboundMessage),
}

impl BusMessage {
    /// The inbound envelope, if any.
    #[must_use]
    pub fn as_inbound(&self) -> Option<&Arc<MessageEnvelope>> {
        match self {
            Self::Inbound(envelope) => Some(envelope),
            Self::Outbound(_) => None,
        }
    }
}
