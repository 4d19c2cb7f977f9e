//! # Payload Variants
//!
//! The closed set of payload types that may travel inside a
//! [`crate::MessageEnvelope`]. Facts and opinions share one
//! [`AssertionPayload`] shape and one dispatch path; the
//! [`AssertionKind`] tag is what distinguishes them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::envelope::AiId;

/// Distinguishes a fact from an opinion on the shared assertion path.
///
/// Opinions are assertions carrying a confidence judgement and an optional
/// reasoning chain; both kinds flow through the same callbacks, with
/// subscription-side filtering deciding which a consumer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    Fact,
    Opinion,
}

/// The statement carried by an assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    /// Free-text statement.
    NaturalLanguage { text: String },
    /// Subject/predicate/object triple.
    SemanticTriple {
        subject: String,
        predicate: String,
        object: String,
    },
    /// JSON-LD document.
    JsonLd { document: Value },
}

/// A fact or opinion published to the knowledge topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionPayload {
    /// Unique id of the assertion, generated by the originating agent.
    pub id: Uuid,
    /// The statement content.
    pub statement: Statement,
    /// The agent that originally produced the assertion.
    pub source_ai_id: AiId,
    /// Unix milliseconds when the assertion was created.
    pub timestamp_created: u64,
    /// Confidence in the statement, in `[0.0, 1.0]`.
    pub confidence_score: f64,
    /// Reasoning steps behind an opinion, oldest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_chain: Option<Vec<String>>,
    /// Free-form classification tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Advertised availability of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityAvailability {
    #[default]
    Online,
    Degraded,
    Offline,
}

/// A named, versioned function an agent advertises as remotely callable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityPayload {
    /// Unique per advertising agent.
    pub capability_id: String,
    /// The advertising agent.
    pub ai_id: AiId,
    /// Human-readable capability name.
    pub name: String,
    /// What the capability does.
    pub description: String,
    /// Capability version string.
    pub version: String,
    /// JSON schema for the request parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// JSON schema for the result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Current availability.
    #[serde(default)]
    pub availability: CapabilityAvailability,
}

/// A request for a remote agent to execute a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequestPayload {
    /// Caller-generated id; exactly one [`TaskResultPayload`] (or a local
    /// timeout) resolves it.
    pub request_id: Uuid,
    /// Restricts which capability may serve the request. Matched against
    /// `capability_id` first, then `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_id_filter: Option<String>,
    /// Capability-specific parameters.
    pub parameters: Value,
    /// The requesting agent.
    pub requester_ai_id: AiId,
    /// Topic the result should be published to. Defaults to the
    /// requester's results topic when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_address: Option<String>,
}

/// Outcome of a task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failure,
}

/// Structured failure detail attached to a failed task result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub error_code: String,
    pub error_message: String,
}

/// The result of executing a [`TaskRequestPayload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResultPayload {
    /// Unique id of this result.
    pub result_id: Uuid,
    /// The request being resolved.
    pub request_id: Uuid,
    /// The agent that executed the task.
    pub executing_ai_id: AiId,
    /// Success or failure.
    pub status: TaskStatus,
    /// Result data; present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Failure detail; present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl TaskResultPayload {
    /// Build a success result for the given request.
    #[must_use]
    pub fn success(request_id: Uuid, executing_ai_id: AiId, payload: Value) -> Self {
        Self {
            result_id: Uuid::new_v4(),
            request_id,
            executing_ai_id,
            status: TaskStatus::Success,
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a failure result for the given request.
    #[must_use]
    pub fn failure(
        request_id: Uuid,
        executing_ai_id: AiId,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            result_id: Uuid::new_v4(),
            request_id,
            executing_ai_id,
            status: TaskStatus::Failure,
            payload: None,
            error: Some(TaskError {
                error_code: error_code.into(),
                error_message: error_message.into(),
            }),
        }
    }
}

/// Receipt status reported in an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    #[default]
    Received,
}

/// Acknowledgement of a message whose QoS parameters requested one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckPayload {
    /// The message being acknowledged.
    pub target_message_id: Uuid,
    /// Receipt status.
    #[serde(default)]
    pub status: AckStatus,
    /// Unix milliseconds when the acknowledgement was produced.
    pub ack_timestamp: u64,
}

/// Closed union of every payload the protocol carries.
///
/// The variant must agree with the envelope's
/// [`crate::MessageType`]; the aligner enforces this on inbound traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Fact(AssertionPayload),
    Opinion(AssertionPayload),
    CapabilityAdvertisement(CapabilityPayload),
    TaskRequest(TaskRequestPayload),
    TaskResult(TaskResultPayload),
    Acknowledgement(AckPayload),
}

impl MessagePayload {
    /// The message type implied by this payload variant.
    #[must_use]
    pub fn message_type(&self) -> crate::MessageType {
        use crate::MessageType;
        match self {
            Self::Fact(_) => MessageType::Fact,
            Self::Opinion(_) => MessageType::Opinion,
            Self::CapabilityAdvertisement(_) => MessageType::CapabilityAdvertisement,
            Self::TaskRequest(_) => MessageType::TaskRequest,
            Self::TaskResult(_) => MessageType::TaskResult,
            Self::Acknowledgement(_) => MessageType::Acknowledgement,
        }
    }

    /// Serialize the inner payload to a JSON value for the wire envelope.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error if the payload cannot be
    /// represented as JSON (practically unreachable for these types).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Fact(p) | Self::Opinion(p) => serde_json::to_value(p),
            Self::CapabilityAdvertisement(p) => serde_json::to_value(p),
            Self::TaskRequest(p) => serde_json::to_value(p),
            Self::TaskResult(p) => serde_json::to_value(p),
            Self::Acknowledgement(p) => serde_json::to_value(p),
        }
    }

    /// The shared assertion payload, if this is a fact or opinion.
    #[must_use]
    pub fn as_assertion(&self) -> Option<(&AssertionPayload, AssertionKind)> {
        match self {
            Self::Fact(p) => Some((p, AssertionKind::Fact)),
            Self::Opinion(p) => Some((p, AssertionKind::Opinion)),
            _ => None,
        }
    }
}
