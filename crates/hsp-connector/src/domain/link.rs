//! Connection link state machine.
//!
//! ```text
//! [DISCONNECTED] ──connect──→ [CONNECTING] ──ok──→ [CONNECTED]
//!       ↑                         │                     │
//!       │                   retries exhausted     connection lost
//!       │                         ▼                     ▼
//!  disconnect               [FAILED] ←─exhausted─ [RECONNECTING {n}]
//! ```
//!
//! Transitions are a pure function of (state, event); events that make no
//! sense in the current state leave it unchanged.

/// Connection state of the external link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No connection and none requested.
    #[default]
    Disconnected,
    /// Initial connection attempt in progress.
    Connecting,
    /// Link established.
    Connected,
    /// Lost link; automatic reconnection in progress.
    Reconnecting { attempt: u32 },
    /// Retry budget exhausted; outbound traffic goes to the offline queue
    /// until a manual `connect()` recovers the link.
    Failed,
}

impl LinkState {
    /// Whether the link is usable for publishing.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Short name for status snapshots and log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

/// Events that drive link transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A caller invoked `connect()`.
    ConnectRequested,
    /// The transport reported a successful connection.
    ConnectSucceeded,
    /// One connection attempt failed; more remain in the budget.
    ConnectFailed,
    /// The transport reported the established link lost.
    ConnectionLost,
    /// The retry budget ran out.
    RetriesExhausted,
    /// A caller invoked `disconnect()`.
    DisconnectRequested,
}

/// Deterministic link state machine.
#[derive(Debug, Clone, Default)]
pub struct LinkStateMachine {
    state: LinkState,
}

impl LinkStateMachine {
    /// Start disconnected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Whether the link is usable for publishing.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Apply an event and return the new state.
    pub fn process_event(&mut self, event: LinkEvent) -> LinkState {
        self.state = Self::next_state(self.state, event);
        self.state
    }

    /// Pure transition function.
    #[must_use]
    pub fn next_state(state: LinkState, event: LinkEvent) -> LinkState {
        match (state, event) {
            (LinkState::Disconnected | LinkState::Failed, LinkEvent::ConnectRequested) => {
                LinkState::Connecting
            }

            (LinkState::Connecting, LinkEvent::ConnectSucceeded) => LinkState::Connected,
            (LinkState::Connecting, LinkEvent::ConnectFailed) => LinkState::Connecting,
            (LinkState::Connecting, LinkEvent::RetriesExhausted) => LinkState::Failed,

            (LinkState::Connected, LinkEvent::ConnectionLost) => {
                LinkState::Reconnecting { attempt: 1 }
            }

            (LinkState::Reconnecting { .. }, LinkEvent::ConnectSucceeded) => LinkState::Connected,
            (LinkState::Reconnecting { attempt }, LinkEvent::ConnectFailed) => {
                LinkState::Reconnecting {
                    attempt: attempt.saturating_add(1),
                }
            }
            (LinkState::Reconnecting { .. }, LinkEvent::RetriesExhausted) => LinkState::Failed,

            (_, LinkEvent::DisconnectRequested) => LinkState::Disconnected,

            // No-op transitions (stay in current state)
            (state, _) => state,
        }
    }
}
