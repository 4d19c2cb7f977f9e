//! Reconnect ladders, circuit breakers, and the offline queue under a
//! misbehaving broker.

#[cfg(test)]
mod tests {
    use crate::support::{connected, fact, fast_config, wait_until};
    use hsp_connector::testing::{CountingTransport, ManualClock};
    use hsp_connector::{
        CircuitState, Clock, HspConnector, HspError, InMemoryBroker, LinkState, PublishOutcome,
        WireTransport,
    };
    use hsp_types::Statement;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connect_retries_with_increasing_capped_delay_then_fails() {
        let broker = InMemoryBroker::new();
        broker.set_available(false);

        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(CountingTransport::new(Arc::new(broker.client())));
        let config = fast_config("did:hsp:alpha")
            .with_retry_max_attempts(4)
            .with_backoff(10, 40, 2.0, 0.0);
        let connector =
            HspConnector::with_transport(
                config,
                Arc::clone(&transport) as Arc<dyn WireTransport>,
                Arc::clone(&clock) as Arc<dyn Clock>,
            );

        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, HspError::ConnectFailed { attempts: 4 }));
        assert_eq!(transport.connect_calls(), 4);

        // Three inter-attempt delays: strictly increasing until the cap.
        let sleeps = clock.recorded_sleeps();
        assert_eq!(
            sleeps,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
            ]
        );

        let status = connector.get_connector_status();
        assert_eq!(status.link, LinkState::Failed);
        assert!(!status.is_connected);

        // Degraded, not disabled: a manual reconnect recovers.
        broker.set_available(true);
        connector.connect().await.unwrap();
        assert!(connector.get_connector_status().is_connected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_connector_queues_and_flushes_fifo_on_recovery() {
        let broker = InMemoryBroker::new();
        let receiver = connected(&broker, "did:hsp:beta").await;
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        receiver.subscribe_to_facts(Arc::new(move |payload, _, _| {
            if let Statement::NaturalLanguage { text } = &payload.statement {
                sink.lock().push(text.clone());
            }
        }));

        broker.set_available(false);
        let sender = HspConnector::in_memory(fast_config("did:hsp:alpha"), &broker);
        assert!(sender.connect().await.is_err());

        // Publishes while FAILED are queued, not lost and not panicking.
        for i in 0..3 {
            let outcome = sender
                .publish_fact(fact("did:hsp:alpha", &format!("queued-{i}")), None)
                .await
                .unwrap();
            assert_eq!(outcome, PublishOutcome::Queued);
        }
        assert_eq!(sender.get_connector_status().offline_queue_depth, 3);

        // Recovery flushes the queue FIFO.
        broker.set_available(true);
        // The receiver's link also dropped when the broker went down.
        receiver.connect().await.unwrap();
        sender.connect().await.unwrap();

        let sink = Arc::clone(&seen);
        assert!(wait_until(Duration::from_secs(2), move || sink.lock().len() == 3).await);
        assert_eq!(
            *seen.lock(),
            vec!["queued-0".to_owned(), "queued-1".into(), "queued-2".into()]
        );
        assert_eq!(sender.get_connector_status().offline_queue_depth, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lost_connection_reconnects_automatically() {
        let broker = InMemoryBroker::new();
        // A generous retry budget keeps the ladder alive while the broker
        // is down.
        let config = fast_config("did:hsp:alpha").with_retry_max_attempts(20);
        let alpha = HspConnector::in_memory(config, &broker);
        alpha.connect().await.unwrap();

        broker.set_available(false);
        let observer = alpha.clone();
        assert!(
            wait_until(Duration::from_secs(2), move || {
                matches!(
                    observer.get_connector_status().link,
                    LinkState::Reconnecting { .. } | LinkState::Failed
                )
            })
            .await
        );

        broker.set_available(true);
        let observer = alpha.clone();
        assert!(
            wait_until(Duration::from_secs(2), move || {
                observer.get_connector_status().is_connected
            })
            .await,
            "connector never recovered"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_circuit_opens_fails_fast_and_recovers_after_cooldown() {
        let broker = InMemoryBroker::new();
        let alpha = connected(&broker, "did:hsp:alpha").await;
        let destination = "hsp/requests/did:hsp:beta";

        broker.fail_topic(destination);
        for _ in 0..3 {
            let outcome = alpha
                .publish_fact(fact("did:hsp:alpha", "x"), Some(destination.into()))
                .await
                .unwrap();
            assert_eq!(outcome, PublishOutcome::Failed);
        }
        assert_eq!(broker.publish_attempts(destination), 3);
        assert_eq!(
            alpha.get_connector_status().circuit_states[destination],
            CircuitState::Open
        );

        // Open circuit: fail fast, no transport invocation.
        let err = alpha
            .publish_fact(fact("did:hsp:alpha", "x"), Some(destination.into()))
            .await
            .unwrap_err();
        assert!(matches!(err, HspError::CircuitOpen { .. }));
        assert_eq!(broker.publish_attempts(destination), 3);

        // Other destinations keep flowing.
        alpha
            .publish_fact(fact("did:hsp:alpha", "elsewhere"), None)
            .await
            .unwrap();

        // After the cool-down, one successful probe closes the circuit.
        broker.restore_topic(destination);
        tokio::time::sleep(Duration::from_millis(150)).await;
        let outcome = alpha
            .publish_fact(fact("did:hsp:alpha", "probe"), Some(destination.into()))
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Published);
        assert_eq!(
            alpha.get_connector_status().circuit_states[destination],
            CircuitState::Closed
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_snapshot_reports_queue_and_counters() {
        let broker = InMemoryBroker::new();
        let alpha = connected(&broker, "did:hsp:alpha").await;

        alpha
            .publish_fact(fact("did:hsp:alpha", "counted"), None)
            .await
            .unwrap();

        let observer = alpha.clone();
        assert!(
            wait_until(Duration::from_secs(2), move || {
                observer.get_connector_status().messages_received >= 1
            })
            .await
        );

        let status = alpha.get_connector_status();
        assert!(status.is_connected);
        assert!(status.messages_published >= 1);
        assert_eq!(status.offline_queue_depth, 0);
        assert_eq!(status.offline_queue_capacity, 256);
        assert_eq!(status.ai_id, "did:hsp:alpha");
    }
}
