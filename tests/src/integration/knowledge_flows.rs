//! Facts and opinions flowing between live connectors over one broker.

#[cfg(test)]
mod tests {
    use crate::support::{connected, fact, wait_until};
    use hsp_connector::{InMemoryBroker, WireTransport};
    use hsp_types::{AssertionKind, Statement};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fact_reaches_peer_with_payload_intact() {
        let broker = InMemoryBroker::new();
        let alpha = connected(&broker, "did:hsp:alpha").await;
        let beta = connected(&broker, "did:hsp:beta").await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        beta.subscribe_to_facts(Arc::new(move |payload, _kind, envelope| {
            assert_eq!(envelope.sender_ai_id.as_str(), "did:hsp:alpha");
            sink.lock().push(payload.clone());
        }));

        let payload = fact("did:hsp:alpha", "alpha is online");
        alpha.publish_fact(payload.clone(), None).await.unwrap();

        assert!(
            wait_until(Duration::from_secs(2), || !seen.lock().is_empty()).await,
            "fact never arrived"
        );
        let received = seen.lock();
        assert_eq!(received.len(), 1);
        // The payload survived serialization, transport, and alignment.
        assert_eq!(received[0], payload);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_facts_arrive_in_send_order_at_every_subscriber() {
        const FACTS: usize = 20;
        const SUBSCRIBERS: usize = 3;

        let broker = InMemoryBroker::new();
        let alpha = connected(&broker, "did:hsp:alpha").await;

        let mut sinks = Vec::new();
        let mut receivers = Vec::new();
        for i in 0..SUBSCRIBERS {
            let receiver = connected(&broker, &format!("did:hsp:sub{i}")).await;
            let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            receiver.subscribe_to_facts(Arc::new(move |payload, _, _| {
                if let Statement::NaturalLanguage { text } = &payload.statement {
                    sink.lock().push(text.clone());
                }
            }));
            sinks.push(seen);
            receivers.push(receiver);
        }

        for i in 0..FACTS {
            alpha
                .publish_fact(fact("did:hsp:alpha", &format!("fact-{i}")), None)
                .await
                .unwrap();
        }

        let expected: Vec<String> = (0..FACTS).map(|i| format!("fact-{i}")).collect();
        for seen in &sinks {
            let seen = Arc::clone(seen);
            assert!(
                wait_until(Duration::from_secs(2), move || seen.lock().len() == FACTS).await,
                "subscriber did not receive all facts"
            );
        }
        for seen in &sinks {
            assert_eq!(*seen.lock(), expected, "facts arrived out of order");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_opinions_share_the_dispatch_path_but_not_the_filter() {
        let broker = InMemoryBroker::new();
        let alpha = connected(&broker, "did:hsp:alpha").await;
        let beta = connected(&broker, "did:hsp:beta").await;

        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        beta.subscribe_to_assertions(Arc::new(move |_, kind, _| sink.lock().push(kind)));

        let fact_count = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&fact_count);
        beta.subscribe_to_facts(Arc::new(move |_, _, _| *sink.lock() += 1));

        let mut opinion = fact("did:hsp:alpha", "alpha seems flaky");
        opinion.reasoning_chain = Some(vec!["missed two heartbeats".into()]);
        opinion.confidence_score = 0.4;
        alpha.publish_opinion(opinion, None).await.unwrap();
        alpha
            .publish_fact(fact("did:hsp:alpha", "alpha restarted"), None)
            .await
            .unwrap();

        let sink = Arc::clone(&kinds);
        assert!(wait_until(Duration::from_secs(2), move || sink.lock().len() == 2).await);
        assert_eq!(
            *kinds.lock(),
            vec![AssertionKind::Opinion, AssertionKind::Fact]
        );
        // The facts-only filter saw one message.
        assert_eq!(*fact_count.lock(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_wire_traffic_does_not_stall_the_stream() {
        let broker = InMemoryBroker::new();
        let alpha = connected(&broker, "did:hsp:alpha").await;
        let beta = connected(&broker, "did:hsp:beta").await;

        let seen = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&seen);
        beta.subscribe_to_facts(Arc::new(move |_, _, _| *sink.lock() += 1));

        // A rogue peer injects garbage on the facts topic.
        let rogue = broker.client();
        rogue.connect().await.unwrap();
        rogue
            .publish(
                "hsp/knowledge/facts/rogue",
                b"{\"not\": \"an envelope\"}",
                hsp_types::QosLevel::AtLeastOnce,
            )
            .await
            .unwrap();

        alpha
            .publish_fact(fact("did:hsp:alpha", "still flowing"), None)
            .await
            .unwrap();

        let sink = Arc::clone(&seen);
        assert!(wait_until(Duration::from_secs(2), move || *sink.lock() == 1).await);
        assert_eq!(beta.get_connector_status().alignment_rejects, 1);
    }
}
