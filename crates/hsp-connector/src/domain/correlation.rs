//! Correlation of async responses back to their originating requests.
//!
//! Each pending wait is a oneshot channel keyed by id. Resolution removes
//! the entry before sending, so a given id resolves at most once; timed-out
//! waits release their entry so nothing leaks.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Table of pending waiters keyed by correlation id.
#[derive(Debug)]
pub struct CorrelationTable<T> {
    waiters: Mutex<HashMap<Uuid, oneshot::Sender<T>>>,
}

impl<T: Send> CorrelationTable<T> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Register a waiter for `id`. A previous registration under the same
    /// id is dropped (its receiver resolves as closed).
    pub fn register(&self, id: Uuid) -> oneshot::Receiver<T> {
        let (sender, receiver) = oneshot::channel();
        self.waiters.lock().insert(id, sender);
        receiver
    }

    /// Resolve the waiter for `id` with `value`.
    ///
    /// Returns `true` when a live waiter consumed the value. Duplicate
    /// resolutions of the same id return `false`.
    pub fn resolve(&self, id: Uuid, value: T) -> bool {
        let Some(sender) = self.waiters.lock().remove(&id) else {
            return false;
        };
        sender.send(value).is_ok()
    }

    /// Drop the registration for `id` without resolving it.
    pub fn release(&self, id: Uuid) -> bool {
        self.waiters.lock().remove(&id).is_some()
    }

    /// Number of pending registrations.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl<T: Send> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
