//! # Connector Configuration
//!
//! All recognized options for constructing a connector, with production
//! defaults, builder-style overrides, and TOML file loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::domain::offline_queue::OverflowPolicy;
use hsp_types::{AiId, QosLevel};

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for one [`crate::HspConnector`] instance.
///
/// There is no process-wide connector state: every connector is an explicit
/// instance built from one of these.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// This agent's identity on the mesh.
    pub ai_id: String,
    /// Broker host the transport should reach.
    pub broker_address: String,
    /// Broker port.
    pub broker_port: u16,
    /// Bypass the transport entirely; publishes loop straight back to this
    /// connector's own subscriptions.
    pub mock_mode: bool,
    /// Connection attempts per `connect()` call (and per reconnect cycle).
    pub retry_max_attempts: u32,
    /// First backoff delay between connection attempts.
    pub backoff_base_ms: u64,
    /// Upper bound on any backoff delay.
    pub backoff_cap_ms: u64,
    /// Growth factor between attempts.
    pub backoff_multiplier: f64,
    /// Jitter fraction applied to each delay (`0.0` disables jitter).
    pub backoff_jitter: f64,
    /// Consecutive failures to one destination before its circuit opens.
    pub circuit_failure_threshold: u32,
    /// How long an open circuit waits before admitting a probe.
    pub circuit_cooldown_ms: u64,
    /// Offline queue capacity.
    pub offline_queue_max_size: usize,
    /// What to do when the offline queue is full.
    pub offline_queue_policy: OverflowPolicy,
    /// Capabilities unseen for this long are purged from the registry.
    pub capability_staleness_ms: u64,
    /// How long a `requires_ack` publish waits for its acknowledgement.
    pub ack_timeout_ms: u64,
    /// QoS level attached to outbound protocol messages.
    pub default_qos: QosLevel,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            ai_id: String::new(),
            broker_address: "localhost".to_owned(),
            broker_port: 1883,
            mock_mode: false,
            retry_max_attempts: 5,
            backoff_base_ms: 250,
            backoff_cap_ms: 30_000,
            backoff_multiplier: 2.0,
            backoff_jitter: 0.1,
            circuit_failure_threshold: 5,
            circuit_cooldown_ms: 30_000,
            offline_queue_max_size: 256,
            offline_queue_policy: OverflowPolicy::DropOldest,
            capability_staleness_ms: 900_000,
            ack_timeout_ms: 10_000,
            default_qos: QosLevel::AtLeastOnce,
        }
    }
}

impl ConnectorConfig {
    /// Create a config with production defaults.
    #[must_use]
    pub fn new(ai_id: impl Into<String>, broker_address: impl Into<String>, broker_port: u16) -> Self {
        Self {
            ai_id: ai_id.into(),
            broker_address: broker_address.into(),
            broker_port,
            ..Self::default()
        }
    }

    /// The agent identity as a typed id.
    #[must_use]
    pub fn ai_id(&self) -> AiId {
        AiId::from(self.ai_id.clone())
    }

    /// Enable or disable mock mode.
    #[must_use]
    pub fn with_mock_mode(mut self, mock_mode: bool) -> Self {
        self.mock_mode = mock_mode;
        self
    }

    /// Override the reconnect retry budget.
    #[must_use]
    pub fn with_retry_max_attempts(mut self, attempts: u32) -> Self {
        self.retry_max_attempts = attempts;
        self
    }

    /// Override the backoff shape.
    #[must_use]
    pub fn with_backoff(mut self, base_ms: u64, cap_ms: u64, multiplier: f64, jitter: f64) -> Self {
        self.backoff_base_ms = base_ms;
        self.backoff_cap_ms = cap_ms;
        self.backoff_multiplier = multiplier;
        self.backoff_jitter = jitter;
        self
    }

    /// Override the circuit breaker parameters.
    #[must_use]
    pub fn with_circuit(mut self, failure_threshold: u32, cooldown_ms: u64) -> Self {
        self.circuit_failure_threshold = failure_threshold;
        self.circuit_cooldown_ms = cooldown_ms;
        self
    }

    /// Override the offline queue bound and overflow policy.
    #[must_use]
    pub fn with_offline_queue(mut self, max_size: usize, policy: OverflowPolicy) -> Self {
        self.offline_queue_max_size = max_size;
        self.offline_queue_policy = policy;
        self
    }

    /// Override the capability staleness window.
    #[must_use]
    pub fn with_capability_staleness_ms(mut self, staleness_ms: u64) -> Self {
        self.capability_staleness_ms = staleness_ms;
        self
    }

    /// Load from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Load from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] on malformed TOML.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
