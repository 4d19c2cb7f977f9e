//! # Alignment Errors
//!
//! Failures raised while validating and normalizing raw wire bytes into a
//! typed [`crate::MessageEnvelope`]. These never cross the bridge boundary:
//! a malformed message is reported and dropped, not fatal.

use thiserror::Error;

/// Why a raw message could not be aligned into a typed envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    /// The bytes are not a JSON envelope at all.
    #[error("Malformed message: {reason}")]
    Malformed { reason: String },

    /// Protocol version is not spoken by this implementation.
    #[error("Unsupported protocol version: received {received}, supported {supported}")]
    UnsupportedVersion { received: String, supported: u16 },

    /// The `message_type` tag is not in the closed set.
    #[error("Unknown message type: {received:?}")]
    UnknownMessageType { received: String },

    /// A required envelope field is absent.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// A field is present but unusable even after coercion.
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The payload does not decode as the type the envelope claims.
    #[error("Payload does not match message type {expected}: {reason}")]
    PayloadMismatch { expected: &'static str, reason: String },
}
