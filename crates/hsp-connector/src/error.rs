//! Error types for the connector subsystem.
//!
//! Transport and alignment failures are recovered locally (logged, retried
//! per policy, or the message dropped) and reach callers only through the
//! explicit variants below; caller control flow depends on
//! `CapabilityNotFound`, `TaskTimeout`, and `CircuitOpen`, so those are
//! always surfaced.

use thiserror::Error;
use uuid::Uuid;

use crate::ports::outbound::TransportError;
use hsp_types::AlignmentError;

/// Connector errors surfaced to callers.
#[derive(Debug, Error)]
pub enum HspError {
    /// Transport-level failure that a caller explicitly asked to observe.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The destination's circuit breaker is open; the transport was not
    /// invoked.
    #[error("Circuit open for destination {destination}")]
    CircuitOpen { destination: String },

    /// No advertised capability matches the request's filter.
    #[error("No capability matches filter {filter:?}")]
    CapabilityNotFound { filter: String },

    /// No task result arrived before the caller's deadline. The pending
    /// registration has been released.
    #[error("Task {request_id} timed out after {timeout_ms} ms")]
    TaskTimeout { request_id: Uuid, timeout_ms: u64 },

    /// No acknowledgement arrived before the deadline.
    #[error("No acknowledgement for message {message_id} within {timeout_ms} ms")]
    AckTimeout { message_id: Uuid, timeout_ms: u64 },

    /// The active health probe did not come back in time.
    #[error("Health probe timed out after {timeout_ms} ms")]
    HealthTimeout { timeout_ms: u64 },

    /// The retry budget was exhausted without reaching the broker. The
    /// connector is degraded, not disabled: a later `connect()` may recover.
    #[error("Connection failed after {attempts} attempts")]
    ConnectFailed { attempts: u32 },

    /// The offline queue is full and the overflow policy rejects new
    /// messages.
    #[error("Offline queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The operation requires an established connection.
    #[error("Connector is not connected")]
    NotConnected,

    /// A local message failed validation.
    #[error("Message alignment failed: {0}")]
    Alignment(#[from] AlignmentError),

    /// A local payload could not be encoded for the wire.
    #[error("Message encoding failed: {reason}")]
    Encoding { reason: String },
}

/// Result alias for connector operations.
pub type HspResult<T> = Result<T, HspError>;
