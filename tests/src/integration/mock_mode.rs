//! Mock-mode behavior: no network, immediate loopback.

#[cfg(test)]
mod tests {
    use crate::support::{fact, fast_config, wait_until};
    use hsp_connector::{HspConnector, LinkState, PublishOutcome};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mock_connect_touches_no_shared_broker() {
        // A broker exists in the process, but the mock connector must never
        // reach it.
        let bystander = hsp_connector::InMemoryBroker::new();

        let connector = HspConnector::mock(fast_config("did:hsp:alpha"));
        connector.connect().await.unwrap();

        let status = connector.get_connector_status();
        assert!(status.is_connected);
        assert!(status.mock_mode);
        assert_eq!(status.link, LinkState::Connected);
        assert_eq!(bystander.total_publishes(), 0);
        assert_eq!(bystander.connected_clients(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mock_publish_fact_triggers_registered_callback_with_same_payload() {
        let connector = HspConnector::mock(fast_config("did:hsp:alpha"));
        connector.connect().await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        connector.subscribe_to_facts(Arc::new(move |payload, _, _| {
            sink.lock().push(payload.clone());
        }));

        let payload = fact("did:hsp:alpha", "mock loopback");
        let outcome = connector.publish_fact(payload.clone(), None).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Published);

        let sink = Arc::clone(&seen);
        assert!(wait_until(Duration::from_secs(2), move || !sink.lock().is_empty()).await);
        assert_eq!(seen.lock()[0], payload);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mock_health_check_round_trips() {
        let connector = HspConnector::mock(fast_config("did:hsp:alpha"));
        connector.connect().await.unwrap();

        let report = connector
            .health_check(Duration::from_secs(1))
            .await
            .unwrap();
        assert!(report.healthy);
    }
}
