//! # Message Envelope
//!
//! The universal wrapper for every protocol message.
//!
//! ## Properties
//!
//! - **Versioning**: every envelope carries `protocol_version`; the aligner
//!   rejects unknown versions before any payload inspection.
//! - **Correlation**: task results and acknowledgements reference the
//!   originating message via `correlation_id`.
//! - **Broadcast**: an absent recipient means every subscriber of the topic
//!   may consume the message; on the wire this is encoded as `"all"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::payload::MessagePayload;
use crate::qos::QosParams;

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Wire spelling of a broadcast recipient.
pub const BROADCAST_RECIPIENT: &str = "all";

/// Identifier of an agent on the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AiId(String);

impl AiId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AiId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for AiId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for AiId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of protocol message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Fact,
    Opinion,
    CapabilityAdvertisement,
    TaskRequest,
    TaskResult,
    Acknowledgement,
}

impl MessageType {
    /// All message types, in dispatch order.
    pub const ALL: [MessageType; 6] = [
        MessageType::Fact,
        MessageType::Opinion,
        MessageType::CapabilityAdvertisement,
        MessageType::TaskRequest,
        MessageType::TaskResult,
        MessageType::Acknowledgement,
    ];

    /// Snake-case wire name, matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Opinion => "opinion",
            Self::CapabilityAdvertisement => "capability_advertisement",
            Self::TaskRequest => "task_request",
            Self::TaskResult => "task_result",
            Self::Acknowledgement => "acknowledgement",
        }
    }

    /// Internal bus topic aligned inbound messages of this type are
    /// published under (`hsp.external.<type>`).
    #[must_use]
    pub fn bus_topic(self) -> &'static str {
        match self {
            Self::Fact => "hsp.external.fact",
            Self::Opinion => "hsp.external.opinion",
            Self::CapabilityAdvertisement => "hsp.external.capability_advertisement",
            Self::TaskRequest => "hsp.external.task_request",
            Self::TaskResult => "hsp.external.task_result",
            Self::Acknowledgement => "hsp.external.acknowledgement",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aligned, fully-typed protocol message.
///
/// Invariant: `message_type == payload.message_type()`. Construct through
/// [`MessageEnvelope::new`] to keep the two in agreement.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    /// Protocol version; unknown versions never get past the aligner.
    pub protocol_version: u16,
    /// Unique per sender.
    pub message_id: Uuid,
    /// References the originating message for results and acknowledgements.
    pub correlation_id: Option<Uuid>,
    /// The sending agent.
    pub sender_ai_id: AiId,
    /// The intended recipient; `None` means broadcast.
    pub recipient_ai_id: Option<AiId>,
    /// Unix milliseconds at send time.
    pub timestamp_sent: u64,
    /// Tag agreeing with the payload variant.
    pub message_type: MessageType,
    /// Per-message QoS parameters.
    pub qos: QosParams,
    /// The typed payload.
    pub payload: MessagePayload,
}

impl MessageEnvelope {
    /// Build an envelope around a payload, deriving `message_type` from the
    /// payload variant.
    #[must_use]
    pub fn new(sender_ai_id: AiId, timestamp_sent: u64, payload: MessagePayload) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            message_id: Uuid::new_v4(),
            correlation_id: None,
            sender_ai_id,
            recipient_ai_id: None,
            timestamp_sent,
            message_type: payload.message_type(),
            qos: QosParams::default(),
            payload,
        }
    }

    /// Address the envelope to a single recipient.
    #[must_use]
    pub fn to_recipient(mut self, recipient: AiId) -> Self {
        self.recipient_ai_id = Some(recipient);
        self
    }

    /// Attach a correlation id referencing an earlier message.
    #[must_use]
    pub fn correlated_with(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Override the QoS parameters.
    #[must_use]
    pub fn with_qos(mut self, qos: QosParams) -> Self {
        self.qos = qos;
        self
    }

    /// Lower into the loose wire mirror.
    ///
    /// # Errors
    ///
    /// Propagates payload serialization failures.
    pub fn to_raw(&self) -> Result<RawEnvelope, serde_json::Error> {
        Ok(RawEnvelope {
            protocol_version: Some(Value::from(self.protocol_version)),
            message_id: Some(self.message_id.to_string()),
            correlation_id: self.correlation_id.map(|id| id.to_string()),
            sender_ai_id: Some(self.sender_ai_id.to_string()),
            recipient_ai_id: Some(
                self.recipient_ai_id
                    .as_ref()
                    .map_or_else(|| BROADCAST_RECIPIENT.to_owned(), ToString::to_string),
            ),
            timestamp_sent: Some(Value::from(self.timestamp_sent)),
            message_type: Some(self.message_type.as_str().to_owned()),
            qos: Some(self.qos),
            payload: Some(self.payload.to_value()?),
        })
    }

    /// Encode to the UTF-8 JSON wire form.
    ///
    /// # Errors
    ///
    /// Propagates payload serialization failures.
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_raw()?)
    }
}

/// The loose wire mirror of [`MessageEnvelope`].
///
/// Fields that remote peers routinely get wrong (ids as non-UUID strings,
/// versions as strings, numbers as strings inside the payload) are kept
/// loose here; the aligner owns the coercion into the typed envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    /// Version as sent; may be a number or a numeric string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_ai_id: Option<String>,
    /// `None` and `"all"` both mean broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_ai_id: Option<String>,
    /// Unix milliseconds; may be a number or a numeric string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_sent: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos: Option<QosParams>,
    /// Undecoded payload; interpreted according to `message_type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}
