//! Test utilities: a manual clock and a counting transport wrapper.
//!
//! Available to this crate's tests and, via the `test-utils` feature, to
//! downstream test suites.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::ports::outbound::{Clock, TransportError, TransportEventHandler, WireTransport};
use hsp_types::QosLevel;

/// Deterministic clock for driving backoff ladders and staleness windows.
///
/// `sleep` returns immediately, advances the clock by the requested
/// duration, and records the request so tests can assert on the schedule.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock starting at a given timestamp.
    #[must_use]
    pub fn starting_at(now_ms: u64) -> Self {
        let clock = Self::new();
        clock.now_ms.store(now_ms, Ordering::SeqCst);
        clock
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: Duration) {
        self.now_ms
            .fetch_add(delta.as_millis() as u64, Ordering::SeqCst);
    }

    /// Every sleep requested so far, in order.
    #[must_use]
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Transport decorator that counts calls and can inject failures.
pub struct CountingTransport {
    inner: Arc<dyn WireTransport>,
    connect_calls: AtomicU64,
    publish_calls: AtomicU64,
    /// Remaining connect attempts to fail before delegating again.
    fail_connects_remaining: AtomicU64,
    fail_all_publishes: Mutex<bool>,
}

impl CountingTransport {
    /// Wrap a transport.
    #[must_use]
    pub fn new(inner: Arc<dyn WireTransport>) -> Self {
        Self {
            inner,
            connect_calls: AtomicU64::new(0),
            publish_calls: AtomicU64::new(0),
            fail_connects_remaining: AtomicU64::new(0),
            fail_all_publishes: Mutex::new(false),
        }
    }

    /// Fail the next `count` connect attempts.
    pub fn fail_next_connects(&self, count: u64) {
        self.fail_connects_remaining.store(count, Ordering::SeqCst);
    }

    /// Fail every publish until turned off again.
    pub fn fail_publishes(&self, fail: bool) {
        *self.fail_all_publishes.lock() = fail;
    }

    /// Connect attempts observed.
    #[must_use]
    pub fn connect_calls(&self) -> u64 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Publish attempts observed.
    #[must_use]
    pub fn publish_calls(&self) -> u64 {
        self.publish_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WireTransport for CountingTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_connects_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connects_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::ConnectionFailed {
                reason: "injected connect failure".into(),
            });
        }
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QosLevel,
    ) -> Result<(), TransportError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_all_publishes.lock() {
            return Err(TransportError::PublishRejected {
                topic: topic.to_owned(),
                reason: "injected publish failure".into(),
            });
        }
        self.inner.publish(topic, payload, qos).await
    }

    async fn subscribe(&self, topic: &str, qos: QosLevel) -> Result<(), TransportError> {
        self.inner.subscribe(topic, qos).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.inner.unsubscribe(topic).await
    }

    fn set_event_handler(&self, handler: TransportEventHandler) {
        self.inner.set_event_handler(handler);
    }
}
