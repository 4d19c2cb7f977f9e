//! # Data Aligner
//!
//! Validates and normalizes raw wire bytes into typed envelopes. Pure and
//! stateless: a malformed message yields an error value, never a panic, and
//! has no effect on subsequent messages.
//!
//! Version compatibility is checked before anything else; payloads are then
//! decoded according to the envelope's `message_type`, with tolerant
//! coercion of the loose typing remote peers routinely produce (numbers
//! sent as strings, `"all"` as a broadcast recipient).

use serde_json::Value;
use uuid::Uuid;

use hsp_types::{
    AlignmentError, AiId, AssertionPayload, MessageEnvelope, MessagePayload, MessageType,
    RawEnvelope, BROADCAST_RECIPIENT, PROTOCOL_VERSION,
};

/// Validator/normalizer for inbound wire traffic.
#[derive(Debug, Clone)]
pub struct DataAligner {
    supported_version: u16,
}

impl Default for DataAligner {
    fn default() -> Self {
        Self {
            supported_version: PROTOCOL_VERSION,
        }
    }
}

impl DataAligner {
    /// Aligner accepting the current protocol version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Align raw wire bytes into a typed envelope.
    ///
    /// # Errors
    ///
    /// Returns an [`AlignmentError`] describing the first problem found;
    /// the bridge logs and drops such messages.
    pub fn align(&self, raw: &[u8]) -> Result<MessageEnvelope, AlignmentError> {
        let raw: RawEnvelope =
            serde_json::from_slice(raw).map_err(|e| AlignmentError::Malformed {
                reason: e.to_string(),
            })?;
        self.align_raw(raw)
    }

    /// Align an already-parsed raw envelope.
    ///
    /// # Errors
    ///
    /// Returns an [`AlignmentError`] describing the first problem found.
    pub fn align_raw(&self, raw: RawEnvelope) -> Result<MessageEnvelope, AlignmentError> {
        // Version gate comes first: nothing else about an envelope from an
        // incompatible peer is trustworthy.
        let version_value = raw
            .protocol_version
            .ok_or(AlignmentError::MissingField {
                field: "protocol_version",
            })?;
        let version = coerce_u64(&version_value)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| AlignmentError::InvalidField {
                field: "protocol_version",
                reason: format!("not a version number: {version_value}"),
            })?;
        if version != self.supported_version {
            return Err(AlignmentError::UnsupportedVersion {
                received: version.to_string(),
                supported: self.supported_version,
            });
        }

        let type_name = raw.message_type.ok_or(AlignmentError::MissingField {
            field: "message_type",
        })?;
        let message_type = parse_message_type(&type_name)?;

        let message_id = parse_uuid(
            raw.message_id.ok_or(AlignmentError::MissingField {
                field: "message_id",
            })?,
            "message_id",
        )?;
        let correlation_id = match raw.correlation_id {
            Some(id) => Some(parse_uuid(id, "correlation_id")?),
            None => None,
        };

        let sender = raw.sender_ai_id.ok_or(AlignmentError::MissingField {
            field: "sender_ai_id",
        })?;
        if sender.is_empty() {
            return Err(AlignmentError::InvalidField {
                field: "sender_ai_id",
                reason: "empty".into(),
            });
        }

        // Absent recipient and the wire spelling "all" both mean broadcast.
        let recipient = raw
            .recipient_ai_id
            .filter(|r| !r.is_empty() && r != BROADCAST_RECIPIENT)
            .map(AiId::from);

        let timestamp_value = raw.timestamp_sent.ok_or(AlignmentError::MissingField {
            field: "timestamp_sent",
        })?;
        let timestamp_sent =
            coerce_u64(&timestamp_value).ok_or_else(|| AlignmentError::InvalidField {
                field: "timestamp_sent",
                reason: format!("not a millisecond timestamp: {timestamp_value}"),
            })?;

        let payload_value = raw
            .payload
            .ok_or(AlignmentError::MissingField { field: "payload" })?;
        let payload = decode_payload(message_type, payload_value)?;

        Ok(MessageEnvelope {
            protocol_version: version,
            message_id,
            correlation_id,
            sender_ai_id: AiId::from(sender),
            recipient_ai_id: recipient,
            timestamp_sent,
            message_type,
            qos: raw.qos.unwrap_or_default(),
            payload,
        })
    }
}

fn parse_message_type(name: &str) -> Result<MessageType, AlignmentError> {
    MessageType::ALL
        .into_iter()
        .find(|t| t.as_str() == name)
        .ok_or_else(|| AlignmentError::UnknownMessageType {
            received: name.to_owned(),
        })
}

fn parse_uuid(value: String, field: &'static str) -> Result<Uuid, AlignmentError> {
    Uuid::parse_str(&value).map_err(|_| AlignmentError::InvalidField {
        field,
        reason: format!("not a UUID: {value:?}"),
    })
}

/// Accept integers, integral floats, and numeric strings.
fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s
            .parse::<u64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        _ => None,
    }
}

/// Rewrite string-encoded numbers in an assertion payload before decoding.
fn normalize_assertion_fields(value: &mut Value) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    for field in ["confidence_score", "timestamp_created"] {
        let coerced = object.get(field).and_then(|v| match v {
            Value::String(s) => s.parse::<f64>().ok().map(Value::from),
            _ => None,
        });
        if let Some(coerced) = coerced {
            object.insert(field.to_owned(), coerced);
        }
    }
}

fn decode_payload(
    message_type: MessageType,
    mut value: Value,
) -> Result<MessagePayload, AlignmentError> {
    let mismatch = |reason: serde_json::Error| AlignmentError::PayloadMismatch {
        expected: message_type.as_str(),
        reason: reason.to_string(),
    };

    match message_type {
        MessageType::Fact | MessageType::Opinion => {
            normalize_assertion_fields(&mut value);
            let assertion: AssertionPayload = serde_json::from_value(value).map_err(mismatch)?;
            if !(0.0..=1.0).contains(&assertion.confidence_score)
                || assertion.confidence_score.is_nan()
            {
                return Err(AlignmentError::InvalidField {
                    field: "confidence_score",
                    reason: format!("outside [0, 1]: {}", assertion.confidence_score),
                });
            }
            Ok(if message_type == MessageType::Fact {
                MessagePayload::Fact(assertion)
            } else {
                MessagePayload::Opinion(assertion)
            })
        }
        MessageType::CapabilityAdvertisement => Ok(MessagePayload::CapabilityAdvertisement(
            serde_json::from_value(value).map_err(mismatch)?,
        )),
        MessageType::TaskRequest => Ok(MessagePayload::TaskRequest(
            serde_json::from_value(value).map_err(mismatch)?,
        )),
        MessageType::TaskResult => Ok(MessagePayload::TaskResult(
            serde_json::from_value(value).map_err(mismatch)?,
        )),
        MessageType::Acknowledgement => Ok(MessagePayload::Acknowledgement(
            serde_json::from_value(value).map_err(mismatch)?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsp_types::{QosParams, Statement, TaskRequestPayload};
    use serde_json::json;

    fn sample_envelope() -> MessageEnvelope {
        let payload = MessagePayload::Fact(AssertionPayload {
            id: Uuid::new_v4(),
            statement: Statement::SemanticTriple {
                subject: "urn:alpha".into(),
                predicate: "urn:is".into(),
                object: "stable".into(),
            },
            source_ai_id: AiId::from("did:hsp:alpha"),
            timestamp_created: 1_700_000_000_000,
            confidence_score: 0.9,
            reasoning_chain: Some(vec!["observed twice".into()]),
            tags: vec!["status".into()],
        });
        MessageEnvelope::new(AiId::from("did:hsp:alpha"), 1_700_000_000_100, payload)
            .to_recipient(AiId::from("did:hsp:beta"))
            .correlated_with(Uuid::new_v4())
            .with_qos(QosParams::acked(hsp_types::MessagePriority::High))
    }

    #[test]
    fn test_round_trip_preserves_envelope() {
        let aligner = DataAligner::new();
        let envelope = sample_envelope();
        let aligned = aligner.align(&envelope.to_wire().unwrap()).unwrap();
        assert_eq!(aligned, envelope);
    }

    #[test]
    fn test_round_trip_broadcast() {
        let aligner = DataAligner::new();
        let envelope = MessageEnvelope::new(
            AiId::from("did:hsp:alpha"),
            1,
            sample_envelope().payload,
        );
        let aligned = aligner.align(&envelope.to_wire().unwrap()).unwrap();
        assert!(aligned.recipient_ai_id.is_none());
        assert_eq!(aligned, envelope);
    }

    #[test]
    fn test_garbage_bytes_are_malformed() {
        let aligner = DataAligner::new();
        assert!(matches!(
            aligner.align(b"not json at all"),
            Err(AlignmentError::Malformed { .. })
        ));
        assert!(matches!(
            aligner.align(&[0xff, 0xfe, 0x00]),
            Err(AlignmentError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let aligner = DataAligner::new();
        let mut raw = sample_envelope().to_raw().unwrap();
        raw.protocol_version = Some(json!(99));
        let err = aligner.align_raw(raw).unwrap_err();
        assert!(matches!(err, AlignmentError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_version_checked_before_payload() {
        // A wrong version wins over a broken payload.
        let aligner = DataAligner::new();
        let mut raw = sample_envelope().to_raw().unwrap();
        raw.protocol_version = Some(json!(99));
        raw.payload = Some(json!("nonsense"));
        assert!(matches!(
            aligner.align_raw(raw),
            Err(AlignmentError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_numeric_string_version_is_coerced() {
        let aligner = DataAligner::new();
        let mut raw = sample_envelope().to_raw().unwrap();
        raw.protocol_version = Some(json!("1"));
        assert!(aligner.align_raw(raw).is_ok());
    }

    #[test]
    fn test_unknown_message_type() {
        let aligner = DataAligner::new();
        let mut raw = sample_envelope().to_raw().unwrap();
        raw.message_type = Some("rumor".into());
        assert!(matches!(
            aligner.align_raw(raw),
            Err(AlignmentError::UnknownMessageType { received }) if received == "rumor"
        ));
    }

    #[test]
    fn test_missing_fields_are_named() {
        let aligner = DataAligner::new();

        let mut raw = sample_envelope().to_raw().unwrap();
        raw.sender_ai_id = None;
        assert!(matches!(
            aligner.align_raw(raw),
            Err(AlignmentError::MissingField { field: "sender_ai_id" })
        ));

        let mut raw = sample_envelope().to_raw().unwrap();
        raw.payload = None;
        assert!(matches!(
            aligner.align_raw(raw),
            Err(AlignmentError::MissingField { field: "payload" })
        ));
    }

    #[test]
    fn test_all_recipient_is_broadcast() {
        let aligner = DataAligner::new();
        let mut raw = sample_envelope().to_raw().unwrap();
        raw.recipient_ai_id = Some("all".into());
        let aligned = aligner.align_raw(raw).unwrap();
        assert!(aligned.recipient_ai_id.is_none());
    }

    #[test]
    fn test_string_confidence_is_coerced() {
        let aligner = DataAligner::new();
        let mut raw = sample_envelope().to_raw().unwrap();
        if let Some(payload) = raw.payload.as_mut().and_then(Value::as_object_mut) {
            payload.insert("confidence_score".into(), json!("0.75"));
        }
        let aligned = aligner.align_raw(raw).unwrap();
        match aligned.payload {
            MessagePayload::Fact(fact) => assert_eq!(fact.confidence_score, 0.75),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_confidence_is_rejected() {
        let aligner = DataAligner::new();
        let mut raw = sample_envelope().to_raw().unwrap();
        if let Some(payload) = raw.payload.as_mut().and_then(Value::as_object_mut) {
            payload.insert("confidence_score".into(), json!(1.5));
        }
        assert!(matches!(
            aligner.align_raw(raw),
            Err(AlignmentError::InvalidField { field: "confidence_score", .. })
        ));
    }

    #[test]
    fn test_payload_mismatch() {
        let aligner = DataAligner::new();
        let mut raw = sample_envelope().to_raw().unwrap();
        // Claims to be a task request, carries a fact payload.
        raw.message_type = Some("task_request".into());
        assert!(matches!(
            aligner.align_raw(raw),
            Err(AlignmentError::PayloadMismatch { expected: "task_request", .. })
        ));
    }

    #[test]
    fn test_task_request_round_trip() {
        let aligner = DataAligner::new();
        let payload = MessagePayload::TaskRequest(TaskRequestPayload {
            request_id: Uuid::new_v4(),
            capability_id_filter: Some("cap_add".into()),
            parameters: json!({"operand1": 1, "operand2": 2}),
            requester_ai_id: AiId::from("did:hsp:alpha"),
            callback_address: Some("hsp/results/did:hsp:alpha".into()),
        });
        let envelope = MessageEnvelope::new(AiId::from("did:hsp:alpha"), 5, payload);
        let aligned = aligner.align(&envelope.to_wire().unwrap()).unwrap();
        assert_eq!(aligned, envelope);
    }

    #[test]
    fn test_malformed_input_does_not_poison_later_messages() {
        let aligner = DataAligner::new();
        assert!(aligner.align(b"{\"protocol_version\": []}").is_err());
        // The same aligner still processes good traffic.
        let envelope = sample_envelope();
        assert_eq!(aligner.align(&envelope.to_wire().unwrap()).unwrap(), envelope);
    }
}
