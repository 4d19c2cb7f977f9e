//! Capability advertisement and task request/result round trips.

#[cfg(test)]
mod tests {
    use crate::support::{connected, wait_until};
    use hsp_connector::{HspError, InMemoryBroker, RequestTarget};
    use hsp_types::{AiId, CapabilityPayload, TaskRequestPayload, TaskResultPayload, TaskStatus};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn adder_capability() -> CapabilityPayload {
        CapabilityPayload {
            capability_id: "cap_add".into(),
            ai_id: AiId::from("did:hsp:calc"),
            name: "addition".into(),
            description: "adds two operands".into(),
            version: "1.0".into(),
            input_schema: Some(json!({"operand1": "number", "operand2": "number"})),
            output_schema: Some(json!({"sum": "number"})),
            availability: Default::default(),
        }
    }

    fn add_request(filter: Option<&str>, a: i64, b: i64) -> TaskRequestPayload {
        TaskRequestPayload {
            request_id: Uuid::new_v4(),
            capability_id_filter: filter.map(Into::into),
            parameters: json!({"operand1": a, "operand2": b}),
            requester_ai_id: AiId::from("placeholder"),
            callback_address: None,
        }
    }

    /// Wire the calc agent to answer addition requests.
    fn serve_additions(calc: &hsp_connector::HspConnector) {
        let responder = calc.clone();
        calc.register_on_task_request_callback(Arc::new(move |request, _envelope| {
            let responder = responder.clone();
            let request = request.clone();
            tokio::spawn(async move {
                let a = request.parameters["operand1"].as_i64();
                let b = request.parameters["operand2"].as_i64();
                let result = match (a, b) {
                    (Some(a), Some(b)) => TaskResultPayload::success(
                        request.request_id,
                        responder.ai_id().clone(),
                        json!({"sum": a + b}),
                    ),
                    _ => TaskResultPayload::failure(
                        request.request_id,
                        responder.ai_id().clone(),
                        "INVALID_OPERANDS",
                        "operands must be numbers",
                    ),
                };
                let callback = request
                    .callback_address
                    .clone()
                    .expect("requester sets a callback address");
                responder.send_task_result(result, callback).await.unwrap();
            });
        }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_task_request_resolves_with_success_result() {
        let broker = InMemoryBroker::new();
        let requester = connected(&broker, "did:hsp:alpha").await;
        let calc = connected(&broker, "did:hsp:calc").await;
        serve_additions(&calc);
        calc.advertise_capability(adder_capability()).await.unwrap();

        // The requester learns the capability from the advertisement.
        let observer = requester.clone();
        assert!(
            wait_until(Duration::from_secs(2), move || {
                !observer.find_capabilities("cap_add").is_empty()
            })
            .await,
            "advertisement never arrived"
        );

        let handle = requester
            .send_task_request(
                add_request(Some("cap_add"), 19, 23),
                RequestTarget::Agent(AiId::from("did:hsp:calc")),
            )
            .await
            .unwrap();
        let result = handle.await_result(Duration::from_secs(2)).await.unwrap();

        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.payload.unwrap()["sum"], 42);
        assert_eq!(result.executing_ai_id.as_str(), "did:hsp:calc");
        // The correlation entry is gone once resolved.
        assert_eq!(requester.get_connector_status().pending_task_requests, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_result_is_distinct_from_timeout() {
        let broker = InMemoryBroker::new();
        let requester = connected(&broker, "did:hsp:alpha").await;
        let calc = connected(&broker, "did:hsp:calc").await;
        serve_additions(&calc);

        let mut request = add_request(None, 0, 0);
        request.parameters = json!({"operand1": "one", "operand2": 2});
        let handle = requester
            .send_task_request(request, RequestTarget::Agent(AiId::from("did:hsp:calc")))
            .await
            .unwrap();
        let result = handle.await_result(Duration::from_secs(2)).await.unwrap();

        // An explicit failure result, not a TaskTimeout error.
        assert_eq!(result.status, TaskStatus::Failure);
        let error = result.error.unwrap();
        assert_eq!(error.error_code, "INVALID_OPERANDS");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_capability_fails_before_the_timeout() {
        let broker = InMemoryBroker::new();
        let requester = connected(&broker, "did:hsp:alpha").await;

        let started = std::time::Instant::now();
        let err = requester
            .send_task_request(
                add_request(Some("cap_translate"), 1, 2),
                RequestTarget::Agent(AiId::from("did:hsp:nobody")),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HspError::CapabilityNotFound { filter } if filter == "cap_translate"
        ));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unanswered_request_times_out_and_cleans_up() {
        let broker = InMemoryBroker::new();
        let requester = connected(&broker, "did:hsp:alpha").await;
        // The silent peer receives requests and never answers.
        let _silent = connected(&broker, "did:hsp:silent").await;

        let handle = requester
            .send_task_request(
                add_request(None, 1, 2),
                RequestTarget::Agent(AiId::from("did:hsp:silent")),
            )
            .await
            .unwrap();
        assert_eq!(requester.get_connector_status().pending_task_requests, 1);

        let err = handle.await_result(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, HspError::TaskTimeout { timeout_ms: 100, .. }));
        assert_eq!(requester.get_connector_status().pending_task_requests, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_result_resolves_only_once() {
        let broker = InMemoryBroker::new();
        let requester = connected(&broker, "did:hsp:alpha").await;
        let calc = connected(&broker, "did:hsp:calc").await;

        // Answer every request twice.
        let responder = calc.clone();
        calc.register_on_task_request_callback(Arc::new(move |request, _| {
            let responder = responder.clone();
            let request = request.clone();
            tokio::spawn(async move {
                for _ in 0..2 {
                    let result = TaskResultPayload::success(
                        request.request_id,
                        responder.ai_id().clone(),
                        json!({"sum": 3}),
                    );
                    let callback = request.callback_address.clone().unwrap();
                    responder.send_task_result(result, callback).await.unwrap();
                }
            });
        }));

        let results_seen = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&results_seen);
        requester.register_on_task_result_callback(Arc::new(move |_, _| *sink.lock() += 1));

        let handle = requester
            .send_task_request(
                add_request(None, 1, 2),
                RequestTarget::Agent(AiId::from("did:hsp:calc")),
            )
            .await
            .unwrap();
        let result = handle.await_result(Duration::from_secs(2)).await.unwrap();
        assert_eq!(result.status, TaskStatus::Success);

        // Both duplicates reached the callback layer, but the handle
        // resolved exactly once and nothing is left pending.
        let sink = Arc::clone(&results_seen);
        assert!(wait_until(Duration::from_secs(2), move || *sink.lock() == 2).await);
        assert_eq!(requester.get_connector_status().pending_task_requests, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_capability_staleness_purges_unrefreshed_entries() {
        let broker = InMemoryBroker::new();
        let requester = {
            let config = crate::support::fast_config("did:hsp:alpha")
                .with_capability_staleness_ms(50);
            let connector = hsp_connector::HspConnector::in_memory(config, &broker);
            connector.connect().await.unwrap();
            connector
        };
        let calc = connected(&broker, "did:hsp:calc").await;
        calc.advertise_capability(adder_capability()).await.unwrap();

        let observer = requester.clone();
        assert!(
            wait_until(Duration::from_secs(2), move || {
                !observer.find_capabilities("cap_add").is_empty()
            })
            .await
        );

        // No re-advertisement within the window: the entry goes stale.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(requester.find_capabilities("cap_add").is_empty());

        // A task request filtered on the stale capability now fails fast.
        let err = requester
            .send_task_request(
                add_request(Some("cap_add"), 1, 2),
                RequestTarget::Agent(AiId::from("did:hsp:calc")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HspError::CapabilityNotFound { .. }));
    }
}
