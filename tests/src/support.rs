//! Shared fixtures for the integration suite.

use std::time::Duration;

use hsp_connector::{ConnectorConfig, HspConnector, InMemoryBroker};
use hsp_types::{AiId, AssertionPayload, Statement};
use uuid::Uuid;

/// Install the test logger once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Config with fast, jitter-free backoff so resilience tests finish quickly.
pub fn fast_config(ai_id: &str) -> ConnectorConfig {
    init_tracing();
    ConnectorConfig::new(ai_id, "localhost", 1883)
        .with_retry_max_attempts(3)
        .with_backoff(10, 100, 2.0, 0.0)
        .with_circuit(3, 100)
}

/// A connector attached to the shared broker, already connected.
pub async fn connected(broker: &InMemoryBroker, ai_id: &str) -> HspConnector {
    let connector = HspConnector::in_memory(fast_config(ai_id), broker);
    connector.connect().await.expect("connect");
    connector
}

/// A natural-language fact payload.
pub fn fact(source: &str, text: &str) -> AssertionPayload {
    AssertionPayload {
        id: Uuid::new_v4(),
        statement: Statement::NaturalLanguage { text: text.into() },
        source_ai_id: AiId::from(source),
        timestamp_created: 1_700_000_000_000,
        confidence_score: 0.95,
        reasoning_chain: None,
        tags: vec!["test".into()],
    }
}

/// Poll `cond` until it holds or `timeout` elapses. Returns the final
/// evaluation.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
