//! Registry of capabilities learned from peer advertisements.
//!
//! Entries are refreshed on re-advertisement and purged once unseen for
//! the staleness window. Purging is lazy (applied during lookups) plus an
//! explicit sweep for maintenance callers.

use std::collections::HashMap;

use hsp_types::{AiId, CapabilityPayload};

#[derive(Debug, Clone)]
struct CapabilityEntry {
    payload: CapabilityPayload,
    last_seen_ms: u64,
}

/// Time-bounded registry of remote capabilities.
#[derive(Debug)]
pub struct CapabilityRegistry {
    entries: HashMap<(AiId, String), CapabilityEntry>,
    staleness_window_ms: u64,
}

impl CapabilityRegistry {
    /// Create an empty registry with the given staleness window.
    #[must_use]
    pub fn new(staleness_window_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            staleness_window_ms,
        }
    }

    fn is_fresh(&self, entry: &CapabilityEntry, now_ms: u64) -> bool {
        now_ms.saturating_sub(entry.last_seen_ms) < self.staleness_window_ms
    }

    /// Insert or refresh an advertisement. Returns `true` when the
    /// capability was not previously known (or had gone stale).
    pub fn upsert(&mut self, payload: CapabilityPayload, now_ms: u64) -> bool {
        let key = (payload.ai_id.clone(), payload.capability_id.clone());
        let was_fresh = self
            .entries
            .get(&key)
            .is_some_and(|entry| self.is_fresh(entry, now_ms));
        self.entries.insert(
            key,
            CapabilityEntry {
                payload,
                last_seen_ms: now_ms,
            },
        );
        !was_fresh
    }

    /// Capabilities matching `filter` by id or name, stale entries excluded.
    pub fn find(&mut self, filter: &str, now_ms: u64) -> Vec<CapabilityPayload> {
        self.purge_stale(now_ms);
        self.entries
            .values()
            .filter(|entry| {
                entry.payload.capability_id == filter || entry.payload.name == filter
            })
            .map(|entry| entry.payload.clone())
            .collect()
    }

    /// Look up one capability by owner and id.
    pub fn get(&mut self, ai_id: &AiId, capability_id: &str, now_ms: u64) -> Option<CapabilityPayload> {
        let key = (ai_id.clone(), capability_id.to_owned());
        let fresh = match self.entries.get(&key) {
            Some(entry) if self.is_fresh(entry, now_ms) => Some(entry.payload.clone()),
            Some(_) => None,
            None => return None,
        };
        if fresh.is_none() {
            self.entries.remove(&key);
        }
        fresh
    }

    /// All fresh capabilities.
    pub fn all(&mut self, now_ms: u64) -> Vec<CapabilityPayload> {
        self.purge_stale(now_ms);
        self.entries
            .values()
            .map(|entry| entry.payload.clone())
            .collect()
    }

    /// Remove every stale entry; returns how many were purged.
    pub fn purge_stale(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        let window = self.staleness_window_ms;
        self.entries
            .retain(|_, entry| now_ms.saturating_sub(entry.last_seen_ms) < window);
        before - self.entries.len()
    }

    /// Entries currently held, stale ones included until the next purge.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
