//! # Quality of Service
//!
//! Delivery-guarantee levels passed through to the transport, plus the
//! per-message QoS parameters carried inside the envelope.

use serde::{Deserialize, Serialize};

/// Transport-level delivery guarantee for a single publish call.
///
/// The connector passes the level straight to the transport and performs no
/// application-level de-duplication, so subscribers at
/// [`QosLevel::AtLeastOnce`] must tolerate duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QosLevel {
    /// Fire and forget. The transport may drop the message.
    AtMostOnce,
    /// Delivered at least once; duplicates are possible.
    #[default]
    AtLeastOnce,
    /// Delivered exactly once, guaranteed end-to-end by the transport.
    ExactlyOnce,
}

impl QosLevel {
    /// Wire representation (MQTT-style integer).
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(other),
        }
    }
}

impl Serialize for QosLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for QosLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Self::try_from(value)
            .map_err(|v| serde::de::Error::custom(format!("invalid QoS level: {v}")))
    }
}

/// Relative priority hint carried in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Medium,
    High,
}

/// Per-message QoS parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QosParams {
    /// Whether the receiver should reply with an [`crate::AckPayload`].
    #[serde(default)]
    pub requires_ack: bool,
    /// Priority hint for the receiver's scheduling.
    #[serde(default)]
    pub priority: MessagePriority,
}

impl QosParams {
    /// Parameters requesting an acknowledgement at the given priority.
    #[must_use]
    pub fn acked(priority: MessagePriority) -> Self {
        Self {
            requires_ack: true,
            priority,
        }
    }
}
