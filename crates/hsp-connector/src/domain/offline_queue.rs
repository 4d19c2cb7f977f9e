//! Bounded offline queue for outbound traffic while the link is down.
//!
//! FIFO order is preserved across enqueue and flush.

use serde::Deserialize;
use std::collections::VecDeque;

use hsp_types::OutboundMessage;

/// What to do when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued message to make room for the new one.
    #[default]
    DropOldest,
    /// Keep the queue as-is and reject the new message.
    RejectNew,
}

/// Result of an enqueue attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// The message was queued.
    Enqueued,
    /// The message was queued; the returned oldest message was evicted.
    DroppedOldest(OutboundMessage),
    /// The queue is full and the policy rejected the new message.
    Rejected(OutboundMessage),
}

/// Bounded FIFO buffer of outbound messages held while the transport is
/// unreachable.
#[derive(Debug)]
pub struct OfflineQueue {
    queue: VecDeque<OutboundMessage>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl OfflineQueue {
    /// Create an empty queue. A zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Queue a message, applying the overflow policy at capacity.
    pub fn push(&mut self, message: OutboundMessage) -> EnqueueOutcome {
        if self.queue.len() < self.capacity {
            self.queue.push_back(message);
            return EnqueueOutcome::Enqueued;
        }
        match self.policy {
            OverflowPolicy::DropOldest => {
                let dropped = self.queue.pop_front();
                self.queue.push_back(message);
                match dropped {
                    Some(dropped) => EnqueueOutcome::DroppedOldest(dropped),
                    None => EnqueueOutcome::Enqueued,
                }
            }
            OverflowPolicy::RejectNew => EnqueueOutcome::Rejected(message),
        }
    }

    /// Remove and return every queued message in FIFO order.
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        self.queue.drain(..).collect()
    }

    /// Re-queue messages at the front, preserving their order.
    ///
    /// Used when a flush is interrupted mid-way; the unflushed remainder
    /// goes back ahead of anything queued since.
    pub fn requeue_front(&mut self, messages: Vec<OutboundMessage>) {
        for message in messages.into_iter().rev() {
            if self.queue.len() >= self.capacity {
                self.queue.pop_back();
            }
            self.queue.push_front(message);
        }
    }

    /// Messages currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
