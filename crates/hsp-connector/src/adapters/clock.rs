//! Production clock backed by the system time and the tokio timer.

use async_trait::async_trait;
use std::time::Duration;

use crate::ports::outbound::Clock;

/// Production time source.
///
/// `sleep` goes through the tokio timer, so tests running under
/// `tokio::time::pause` can still fast-forward it. For a fully manual
/// clock, use the one in [`crate::testing`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_now_is_past_2023() {
        let clock = SystemClock::new();
        assert!(clock.now_ms() > 1_672_531_200_000);
    }
}
