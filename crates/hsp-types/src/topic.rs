//! # Topic Grammar
//!
//! Wire topics are hierarchical `/`-separated strings
//! (`hsp/knowledge/facts/<ai_id>`); internal bus topics use `.` separators
//! (`hsp.external.fact`). Subscriptions may use MQTT-style wildcards:
//! `+` matches exactly one level, a trailing `#` matches any remainder.

use crate::envelope::AiId;

/// Bus topic carrying outbound frames awaiting transport publication.
pub const BUS_INTERNAL_MESSAGE: &str = "hsp.internal.message";

/// Builders for the well-known wire topics.
pub struct Topics;

impl Topics {
    /// Facts published by one agent.
    #[must_use]
    pub fn facts(ai_id: &AiId) -> String {
        format!("hsp/knowledge/facts/{ai_id}")
    }

    /// Wildcard over every agent's facts.
    #[must_use]
    pub fn all_facts() -> String {
        "hsp/knowledge/facts/#".to_owned()
    }

    /// Opinions published by one agent.
    #[must_use]
    pub fn opinions(ai_id: &AiId) -> String {
        format!("hsp/knowledge/opinions/{ai_id}")
    }

    /// Wildcard over every agent's opinions.
    #[must_use]
    pub fn all_opinions() -> String {
        "hsp/knowledge/opinions/#".to_owned()
    }

    /// Capability advertisements from one agent.
    #[must_use]
    pub fn capability_advertisements(ai_id: &AiId) -> String {
        format!("hsp/capabilities/advertisements/{ai_id}")
    }

    /// Wildcard over every agent's capability advertisements.
    #[must_use]
    pub fn all_capability_advertisements() -> String {
        "hsp/capabilities/advertisements/#".to_owned()
    }

    /// Task requests addressed to one agent.
    #[must_use]
    pub fn requests(ai_id: &AiId) -> String {
        format!("hsp/requests/{ai_id}")
    }

    /// Task results addressed to one agent.
    #[must_use]
    pub fn results(ai_id: &AiId) -> String {
        format!("hsp/results/{ai_id}")
    }

    /// Acknowledgements addressed to one agent.
    #[must_use]
    pub fn acks(ai_id: &AiId) -> String {
        format!("hsp/acks/{ai_id}")
    }

    /// Health-probe loopback topic for one agent.
    #[must_use]
    pub fn health(ai_id: &AiId) -> String {
        format!("hsp/health/{ai_id}")
    }
}

/// Check whether `topic` matches `pattern`.
///
/// Works for both wire topics (`/` separator) and bus topics (`.`
/// separator); the separator is inferred from the pattern. A pattern
/// without wildcards matches only the identical topic.
#[must_use]
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let separator = if pattern.contains('/') || topic.contains('/') {
        '/'
    } else {
        '.'
    };
    let mut pattern_levels = pattern.split(separator);
    let mut topic_levels = topic.split(separator);

    loop {
        match (pattern_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
