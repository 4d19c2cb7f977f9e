//! # Driving Ports (Inbound API)
//!
//! The surface host applications program against. Implemented by
//! [`crate::HspConnector`]; test doubles can implement it to exercise agent
//! logic without a connector.

use async_trait::async_trait;
use std::time::Duration;

use crate::bridge::PublishOutcome;
use crate::error::HspResult;
use crate::service::{ConnectorStatus, HealthReport, RequestTarget, TaskHandle};
use hsp_types::{AssertionPayload, CapabilityPayload, TaskRequestPayload, TaskResultPayload};

/// The connector operations agent/business logic depends on.
///
/// Every call is potentially async and potentially failing; publish
/// operations report failure as a value rather than tearing down the
/// caller.
#[async_trait]
pub trait ConnectorApi: Send + Sync {
    /// Drive the connection state machine toward CONNECTED.
    async fn connect(&self) -> HspResult<()>;

    /// Tear the connection down. Idempotent.
    async fn disconnect(&self) -> HspResult<()>;

    /// Publish a fact; `topic` defaults to this agent's facts topic.
    async fn publish_fact(
        &self,
        fact: AssertionPayload,
        topic: Option<String>,
    ) -> HspResult<PublishOutcome>;

    /// Publish an opinion; `topic` defaults to this agent's opinions topic.
    async fn publish_opinion(
        &self,
        opinion: AssertionPayload,
        topic: Option<String>,
    ) -> HspResult<PublishOutcome>;

    /// Advertise (or refresh) a capability owned by this agent.
    async fn advertise_capability(
        &self,
        capability: CapabilityPayload,
    ) -> HspResult<PublishOutcome>;

    /// Send a task request; the returned handle resolves exactly once.
    async fn send_task_request(
        &self,
        request: TaskRequestPayload,
        target: RequestTarget,
    ) -> HspResult<TaskHandle>;

    /// Publish a task result to the requester's callback topic.
    async fn send_task_result(
        &self,
        result: TaskResultPayload,
        callback_topic: String,
    ) -> HspResult<PublishOutcome>;

    /// Read-only snapshot of connectivity, circuit, and queue state.
    fn get_connector_status(&self) -> ConnectorStatus;

    /// Active round-trip probe with an explicit deadline.
    async fn health_check(&self, timeout: Duration) -> HspResult<HealthReport>;
}
