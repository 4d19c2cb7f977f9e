//! # Connector Facade
//!
//! [`HspConnector`] is the public API agents program against. One instance
//! owns all resilience and subscription state; there are no module-level
//! singletons. Inbound transport events are drained by a single dispatch
//! worker, so messages on one topic reach callbacks in arrival order while
//! callers awaiting task results suspend in their own tasks.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::clock::SystemClock;
use crate::adapters::memory::InMemoryBroker;
use crate::bridge::{MessageBridge, PublishOutcome};
use crate::config::ConnectorConfig;
use crate::domain::aligner::DataAligner;
use crate::domain::backoff::BackoffPolicy;
use crate::domain::capabilities::CapabilityRegistry;
use crate::domain::circuit::{CircuitRegistry, CircuitState};
use crate::domain::correlation::CorrelationTable;
use crate::domain::link::{LinkEvent, LinkState, LinkStateMachine};
use crate::domain::offline_queue::OfflineQueue;
use crate::error::{HspError, HspResult};
use crate::ports::outbound::{Clock, TransportEvent, WireTransport};
use hsp_bus::{boxed_callback, BusMessage, InternalBus};
use hsp_types::{
    AckPayload, AckStatus, AiId, AssertionKind, AssertionPayload, CapabilityPayload,
    MessageEnvelope, MessagePayload, MessageType, OutboundBody, OutboundMessage, QosLevel,
    TaskRequestPayload, TaskResultPayload, Topics,
};

/// Callback for facts and opinions (the shared assertion path).
pub type AssertionCallback =
    Arc<dyn Fn(&AssertionPayload, AssertionKind, &MessageEnvelope) + Send + Sync>;
/// Callback for capability advertisements.
pub type CapabilityCallback = Arc<dyn Fn(&CapabilityPayload, &MessageEnvelope) + Send + Sync>;
/// Callback for inbound task requests.
pub type TaskRequestCallback = Arc<dyn Fn(&TaskRequestPayload, &MessageEnvelope) + Send + Sync>;
/// Callback for inbound task results.
pub type TaskResultCallback = Arc<dyn Fn(&TaskResultPayload, &MessageEnvelope) + Send + Sync>;
/// Callback for inbound acknowledgements.
pub type AckCallback = Arc<dyn Fn(&AckPayload, &MessageEnvelope) + Send + Sync>;
/// Callback fired on connect/disconnect transitions.
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;
/// Supplies the agent's current capabilities for re-advertisement.
pub type CapabilityProvider = Arc<dyn Fn() -> Vec<CapabilityPayload> + Send + Sync>;

/// Where a task request should be sent.
#[derive(Debug, Clone)]
pub enum RequestTarget {
    /// The agent's well-known requests topic.
    Agent(AiId),
    /// An explicit topic.
    Topic(String),
}

/// Pending task-request correlation. Resolves exactly once: with the
/// result, or with a timeout that also releases the registration.
#[derive(Debug)]
pub struct TaskHandle {
    request_id: Uuid,
    receiver: oneshot::Receiver<TaskResultPayload>,
    waiters: Arc<CorrelationTable<TaskResultPayload>>,
}

impl TaskHandle {
    /// The caller-generated request id this handle tracks.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Wait for the task result under an explicit deadline.
    ///
    /// # Errors
    ///
    /// - [`HspError::TaskTimeout`] at the deadline; the pending-callback
    ///   entry is removed so nothing leaks
    /// - [`HspError::NotConnected`] if the connector shut down while
    ///   waiting
    pub async fn await_result(self, timeout: Duration) -> HspResult<TaskResultPayload> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(HspError::NotConnected),
            Err(_) => {
                self.waiters.release(self.request_id);
                Err(HspError::TaskTimeout {
                    request_id: self.request_id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Read-only snapshot of connector state. Taking one has no side effects.
#[derive(Debug, Clone)]
pub struct ConnectorStatus {
    pub ai_id: String,
    pub link: LinkState,
    pub is_connected: bool,
    pub mock_mode: bool,
    pub offline_queue_depth: usize,
    pub offline_queue_capacity: usize,
    pub circuit_states: HashMap<String, CircuitState>,
    /// Remote capability entries currently held (stale ones included until
    /// the next lookup purges them).
    pub known_capabilities: usize,
    pub pending_task_requests: usize,
    pub messages_published: u64,
    pub messages_received: u64,
    pub alignment_rejects: u64,
}

/// Result of an active health probe.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub healthy: bool,
    pub round_trip_ms: u64,
    pub link: LinkState,
}

struct ConnectorInner {
    config: ConnectorConfig,
    ai_id: AiId,
    mock_mode: bool,
    health_topic: String,
    bus: InternalBus,
    bridge: Arc<MessageBridge>,
    transport: Arc<dyn WireTransport>,
    clock: Arc<dyn Clock>,
    link: Arc<RwLock<LinkStateMachine>>,
    offline_capacity: usize,
    backoff: BackoffPolicy,
    remote_capabilities: Mutex<CapabilityRegistry>,
    local_capabilities: Mutex<HashMap<String, CapabilityPayload>>,
    capability_provider: Mutex<Option<CapabilityProvider>>,
    task_waiters: Arc<CorrelationTable<TaskResultPayload>>,
    ack_waiters: CorrelationTable<AckPayload>,
    health_waiters: CorrelationTable<u64>,
    assertion_callbacks: Mutex<Vec<(Option<AssertionKind>, AssertionCallback)>>,
    capability_callbacks: Mutex<Vec<CapabilityCallback>>,
    task_request_callbacks: Mutex<Vec<TaskRequestCallback>>,
    task_result_callbacks: Mutex<Vec<TaskResultCallback>>,
    ack_callbacks: Mutex<Vec<AckCallback>>,
    connect_callbacks: Mutex<Vec<LifecycleCallback>>,
    disconnect_callbacks: Mutex<Vec<LifecycleCallback>>,
    /// Serializes connect, reconnect, and disconnect cycles.
    connect_lock: tokio::sync::Mutex<()>,
    /// Keeps a private loopback broker alive in mock mode.
    _private_broker: Option<InMemoryBroker>,
}

/// The HSP protocol connector facade.
///
/// Cloning is cheap and shares the instance. Constructors must run inside
/// a tokio runtime: the connector spawns its inbound dispatch worker.
#[derive(Clone)]
pub struct HspConnector {
    inner: Arc<ConnectorInner>,
}

impl HspConnector {
    /// Mock-mode connector: a private in-memory broker loops publishes
    /// straight back to this connector's own subscriptions. `connect()`
    /// succeeds without any network activity.
    #[must_use]
    pub fn mock(mut config: ConnectorConfig) -> Self {
        config.mock_mode = true;
        let broker = InMemoryBroker::new();
        let transport: Arc<dyn WireTransport> = Arc::new(broker.client());
        Self::build(config, transport, Arc::new(SystemClock::new()), Some(broker))
    }

    /// Connector attached to a shared in-memory broker (several connectors
    /// on one broker form a process-local mesh).
    #[must_use]
    pub fn in_memory(config: ConnectorConfig, broker: &InMemoryBroker) -> Self {
        let transport: Arc<dyn WireTransport> = Arc::new(broker.client());
        Self::build(config, transport, Arc::new(SystemClock::new()), None)
    }

    /// Connector over an injected transport and clock.
    #[must_use]
    pub fn with_transport(
        config: ConnectorConfig,
        transport: Arc<dyn WireTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(config, transport, clock, None)
    }

    fn build(
        config: ConnectorConfig,
        transport: Arc<dyn WireTransport>,
        clock: Arc<dyn Clock>,
        private_broker: Option<InMemoryBroker>,
    ) -> Self {
        let ai_id = config.ai_id();
        let bus = InternalBus::new();
        let link = Arc::new(RwLock::new(LinkStateMachine::new()));
        let circuits = Arc::new(Mutex::new(CircuitRegistry::new(
            config.circuit_failure_threshold,
            config.circuit_cooldown_ms,
        )));
        let offline = Arc::new(Mutex::new(OfflineQueue::new(
            config.offline_queue_max_size,
            config.offline_queue_policy,
        )));
        let bridge = MessageBridge::new(
            Arc::clone(&transport),
            bus.clone(),
            DataAligner::new(),
            circuits,
            Arc::clone(&offline),
            Arc::clone(&link),
            Arc::clone(&clock),
        );
        bridge.register_bus_routes();

        let backoff = BackoffPolicy::new(
            config.backoff_base_ms,
            config.backoff_cap_ms,
            config.backoff_multiplier,
            config.backoff_jitter,
        );
        let offline_capacity = offline.lock().capacity();

        let inner = Arc::new(ConnectorInner {
            mock_mode: config.mock_mode,
            health_topic: Topics::health(&ai_id),
            ai_id,
            bus,
            bridge,
            transport,
            clock,
            link,
            offline_capacity,
            backoff,
            remote_capabilities: Mutex::new(CapabilityRegistry::new(
                config.capability_staleness_ms,
            )),
            local_capabilities: Mutex::new(HashMap::new()),
            capability_provider: Mutex::new(None),
            task_waiters: Arc::new(CorrelationTable::new()),
            ack_waiters: CorrelationTable::new(),
            health_waiters: CorrelationTable::new(),
            assertion_callbacks: Mutex::new(Vec::new()),
            capability_callbacks: Mutex::new(Vec::new()),
            task_request_callbacks: Mutex::new(Vec::new()),
            task_result_callbacks: Mutex::new(Vec::new()),
            ack_callbacks: Mutex::new(Vec::new()),
            connect_callbacks: Mutex::new(Vec::new()),
            disconnect_callbacks: Mutex::new(Vec::new()),
            connect_lock: tokio::sync::Mutex::new(()),
            _private_broker: private_broker,
            config,
        });

        ConnectorInner::wire_bus_dispatchers(&inner);

        // The transport handler only enqueues; the worker drains in order.
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        inner.transport.set_event_handler(Arc::new(move |event| {
            let _ = event_tx.send(event);
        }));
        tokio::spawn(ConnectorInner::run_dispatch(
            Arc::downgrade(&inner),
            event_rx,
        ));

        Self { inner }
    }

    /// This connector's agent id.
    #[must_use]
    pub fn ai_id(&self) -> &AiId {
        &self.inner.ai_id
    }

    /// The internal bus, for local components that want direct access.
    #[must_use]
    pub fn bus(&self) -> &InternalBus {
        &self.inner.bus
    }

    /// Drive the connection state machine toward CONNECTED.
    ///
    /// Retries with bounded exponential backoff up to the configured
    /// attempt budget; on exhaustion the connector degrades to FAILED
    /// (outbound traffic queues) and a later call can recover it.
    ///
    /// # Errors
    ///
    /// [`HspError::ConnectFailed`] when the budget is exhausted.
    pub async fn connect(&self) -> HspResult<()> {
        let inner = &self.inner;
        let _guard = inner.connect_lock.lock().await;
        if inner.link.read().is_connected() {
            return Ok(());
        }
        inner.link.write().process_event(LinkEvent::ConnectRequested);

        let attempts = inner.config.retry_max_attempts.max(1);
        for attempt in 0..attempts {
            match inner.transport.connect().await {
                Ok(()) => {
                    inner.link.write().process_event(LinkEvent::ConnectSucceeded);
                    info!(ai_id = %inner.ai_id, attempt = attempt + 1, "Connected");
                    inner.post_connect().await;
                    inner.fire_lifecycle(&inner.connect_callbacks);
                    return Ok(());
                }
                Err(error) => {
                    warn!(
                        ai_id = %inner.ai_id,
                        attempt = attempt + 1,
                        attempts,
                        error = %error,
                        "Connection attempt failed"
                    );
                    inner.link.write().process_event(LinkEvent::ConnectFailed);
                    if attempt + 1 < attempts {
                        let delay = {
                            let mut rng = rand::thread_rng();
                            inner.backoff.jittered_delay(attempt, &mut rng)
                        };
                        inner.clock.sleep(delay).await;
                    }
                }
            }
        }

        inner.link.write().process_event(LinkEvent::RetriesExhausted);
        warn!(ai_id = %inner.ai_id, "Retry budget exhausted; degrading to offline queue");
        Err(HspError::ConnectFailed { attempts })
    }

    /// Tear the connection down. Idempotent: disconnecting a disconnected
    /// connector is a successful no-op.
    pub async fn disconnect(&self) -> HspResult<()> {
        let inner = &self.inner;
        let _guard = inner.connect_lock.lock().await;
        if matches!(inner.link.read().state(), LinkState::Disconnected) {
            return Ok(());
        }
        if let Err(error) = inner.transport.disconnect().await {
            warn!(error = %error, "Transport disconnect reported an error");
        }
        inner
            .link
            .write()
            .process_event(LinkEvent::DisconnectRequested);
        inner.fire_lifecycle(&inner.disconnect_callbacks);
        info!(ai_id = %inner.ai_id, "Disconnected");
        Ok(())
    }

    /// Alias for [`HspConnector::disconnect`].
    pub async fn close(&self) -> HspResult<()> {
        self.disconnect().await
    }

    /// Publish a fact. `topic` defaults to this agent's facts topic.
    ///
    /// Ordinary network failure is reported in the outcome, never as a
    /// panic or a torn-down caller.
    pub async fn publish_fact(
        &self,
        fact: AssertionPayload,
        topic: Option<String>,
    ) -> HspResult<PublishOutcome> {
        let topic = topic.unwrap_or_else(|| Topics::facts(&self.inner.ai_id));
        self.publish_assertion(AssertionKind::Fact, fact, topic).await
    }

    /// Publish an opinion. `topic` defaults to this agent's opinions topic.
    pub async fn publish_opinion(
        &self,
        opinion: AssertionPayload,
        topic: Option<String>,
    ) -> HspResult<PublishOutcome> {
        let topic = topic.unwrap_or_else(|| Topics::opinions(&self.inner.ai_id));
        self.publish_assertion(AssertionKind::Opinion, opinion, topic)
            .await
    }

    async fn publish_assertion(
        &self,
        kind: AssertionKind,
        payload: AssertionPayload,
        topic: String,
    ) -> HspResult<PublishOutcome> {
        let message_payload = match kind {
            AssertionKind::Fact => MessagePayload::Fact(payload),
            AssertionKind::Opinion => MessagePayload::Opinion(payload),
        };
        let envelope = self.inner.new_envelope(message_payload);
        self.publish_envelope(topic, envelope).await
    }

    /// Publish a prepared envelope to an explicit topic.
    ///
    /// When the envelope requests an acknowledgement, this waits up to the
    /// configured ack timeout for the receiver's ack.
    ///
    /// # Errors
    ///
    /// [`HspError::CircuitOpen`], [`HspError::QueueFull`],
    /// [`HspError::AckTimeout`] per the resilience contracts.
    pub async fn publish_envelope(
        &self,
        topic: String,
        envelope: MessageEnvelope,
    ) -> HspResult<PublishOutcome> {
        let inner = &self.inner;
        let requires_ack = envelope.qos.requires_ack;
        let message_id = envelope.message_id;

        let ack_receiver = if requires_ack {
            Some(inner.ack_waiters.register(message_id))
        } else {
            None
        };

        let frame = OutboundMessage::envelope(topic, inner.config.default_qos, envelope);
        let outcome = match inner.bridge.publish_outbound(frame).await {
            Ok(outcome) => outcome,
            Err(error) => {
                if requires_ack {
                    inner.ack_waiters.release(message_id);
                }
                return Err(error);
            }
        };

        match (ack_receiver, outcome) {
            (Some(receiver), PublishOutcome::Published) => {
                let timeout = Duration::from_millis(inner.config.ack_timeout_ms);
                match tokio::time::timeout(timeout, receiver).await {
                    Ok(Ok(_ack)) => Ok(PublishOutcome::Published),
                    Ok(Err(_)) => Err(HspError::NotConnected),
                    Err(_) => {
                        inner.ack_waiters.release(message_id);
                        Err(HspError::AckTimeout {
                            message_id,
                            timeout_ms: inner.config.ack_timeout_ms,
                        })
                    }
                }
            }
            (maybe_receiver, outcome) => {
                // Queued or failed: an ack cannot arrive for this attempt.
                if maybe_receiver.is_some() {
                    inner.ack_waiters.release(message_id);
                }
                Ok(outcome)
            }
        }
    }

    /// Advertise (or refresh) a capability owned by this agent.
    ///
    /// Idempotent upsert: re-advertising the same capability refreshes it.
    /// The capability is also re-advertised automatically after every
    /// reconnect.
    pub async fn advertise_capability(
        &self,
        mut capability: CapabilityPayload,
    ) -> HspResult<PublishOutcome> {
        capability.ai_id = self.inner.ai_id.clone();
        self.inner
            .local_capabilities
            .lock()
            .insert(capability.capability_id.clone(), capability.clone());
        self.inner.publish_advertisement(capability).await
    }

    /// Send a task request toward a target. The returned handle resolves
    /// exactly once: with the result, or with a timeout.
    ///
    /// # Errors
    ///
    /// [`HspError::CapabilityNotFound`] immediately (not after the task
    /// timeout) when `capability_id_filter` matches nothing this connector
    /// has seen advertised.
    pub async fn send_task_request(
        &self,
        mut request: TaskRequestPayload,
        target: RequestTarget,
    ) -> HspResult<TaskHandle> {
        let inner = &self.inner;

        if let Some(filter) = request.capability_id_filter.clone() {
            let now = inner.clock.now_ms();
            if inner.remote_capabilities.lock().find(&filter, now).is_empty() {
                return Err(HspError::CapabilityNotFound { filter });
            }
        }

        request.requester_ai_id = inner.ai_id.clone();
        if request.callback_address.is_none() {
            request.callback_address = Some(Topics::results(&inner.ai_id));
        }
        let request_id = request.request_id;
        let receiver = inner.task_waiters.register(request_id);

        let (topic, recipient) = match target {
            RequestTarget::Agent(agent) => (Topics::requests(&agent), Some(agent)),
            RequestTarget::Topic(topic) => (topic, None),
        };
        let mut envelope = inner
            .new_envelope(MessagePayload::TaskRequest(request))
            .correlated_with(request_id);
        if let Some(recipient) = recipient {
            envelope = envelope.to_recipient(recipient);
        }

        let frame = OutboundMessage::envelope(topic, inner.config.default_qos, envelope);
        match inner.bridge.publish_outbound(frame).await {
            Ok(outcome) => {
                debug!(request_id = %request_id, ?outcome, "Task request dispatched");
                Ok(TaskHandle {
                    request_id,
                    receiver,
                    waiters: Arc::clone(&inner.task_waiters),
                })
            }
            Err(error) => {
                inner.task_waiters.release(request_id);
                Err(error)
            }
        }
    }

    /// Publish a task result to the requester's callback topic. Used by
    /// task executors as the complement of [`HspConnector::send_task_request`].
    pub async fn send_task_result(
        &self,
        result: TaskResultPayload,
        callback_topic: String,
    ) -> HspResult<PublishOutcome> {
        let request_id = result.request_id;
        let envelope = self
            .inner
            .new_envelope(MessagePayload::TaskResult(result))
            .correlated_with(request_id);
        self.publish_envelope(callback_topic, envelope).await
    }

    /// Register a callback for incoming facts.
    pub fn subscribe_to_facts(&self, callback: AssertionCallback) {
        self.inner
            .assertion_callbacks
            .lock()
            .push((Some(AssertionKind::Fact), callback));
    }

    /// Register a callback for incoming opinions.
    pub fn subscribe_to_opinions(&self, callback: AssertionCallback) {
        self.inner
            .assertion_callbacks
            .lock()
            .push((Some(AssertionKind::Opinion), callback));
    }

    /// Register a callback for both facts and opinions.
    pub fn subscribe_to_assertions(&self, callback: AssertionCallback) {
        self.inner.assertion_callbacks.lock().push((None, callback));
    }

    /// Register a callback for capability advertisements.
    pub fn register_on_capability_advertisement_callback(&self, callback: CapabilityCallback) {
        self.inner.capability_callbacks.lock().push(callback);
    }

    /// Register a callback for incoming task requests.
    pub fn register_on_task_request_callback(&self, callback: TaskRequestCallback) {
        self.inner.task_request_callbacks.lock().push(callback);
    }

    /// Register a callback for incoming task results.
    ///
    /// Results also resolve their pending [`TaskHandle`] regardless of any
    /// callbacks registered here.
    pub fn register_on_task_result_callback(&self, callback: TaskResultCallback) {
        self.inner.task_result_callbacks.lock().push(callback);
    }

    /// Register a callback for incoming acknowledgements.
    pub fn register_on_acknowledgement_callback(&self, callback: AckCallback) {
        self.inner.ack_callbacks.lock().push(callback);
    }

    /// Register a callback fired after every successful connect.
    pub fn register_on_connect_callback(&self, callback: LifecycleCallback) {
        self.inner.connect_callbacks.lock().push(callback);
    }

    /// Register a callback fired after every disconnect.
    pub fn register_on_disconnect_callback(&self, callback: LifecycleCallback) {
        self.inner.disconnect_callbacks.lock().push(callback);
    }

    /// Register a provider consulted for re-advertisement after reconnects,
    /// in addition to capabilities advertised through
    /// [`HspConnector::advertise_capability`].
    pub fn register_capability_provider(&self, provider: CapabilityProvider) {
        *self.inner.capability_provider.lock() = Some(provider);
    }

    /// Capabilities currently known from peer advertisements matching a
    /// filter (by capability id or name).
    #[must_use]
    pub fn find_capabilities(&self, filter: &str) -> Vec<CapabilityPayload> {
        let now = self.inner.clock.now_ms();
        self.inner.remote_capabilities.lock().find(filter, now)
    }

    /// Subscribe to an extra wire topic beyond the standard set.
    pub async fn subscribe_topic(&self, topic: &str) -> HspResult<()> {
        self.inner
            .transport
            .subscribe(topic, self.inner.config.default_qos)
            .await?;
        Ok(())
    }

    /// Remove a wire topic subscription.
    pub async fn unsubscribe_topic(&self, topic: &str) -> HspResult<()> {
        self.inner.transport.unsubscribe(topic).await?;
        Ok(())
    }

    /// Read-only snapshot of connectivity, circuit, and queue state.
    #[must_use]
    pub fn get_connector_status(&self) -> ConnectorStatus {
        let inner = &self.inner;
        let link = inner.link.read().state();
        ConnectorStatus {
            ai_id: inner.ai_id.to_string(),
            link,
            is_connected: link.is_connected(),
            mock_mode: inner.mock_mode,
            offline_queue_depth: inner.bridge.queue_depth(),
            offline_queue_capacity: inner.offline_capacity,
            circuit_states: inner.bridge.circuit_states(),
            known_capabilities: inner.remote_capabilities.lock().len(),
            pending_task_requests: inner.task_waiters.pending(),
            messages_published: inner.bridge.outbound_published(),
            messages_received: inner.bridge.inbound_forwarded(),
            alignment_rejects: inner.bridge.alignment_rejects(),
        }
    }

    /// Active health probe: publish a ping to this agent's health topic and
    /// wait for it to come back through the transport.
    ///
    /// Distinct from [`HspConnector::get_connector_status`], which is
    /// passive.
    ///
    /// # Errors
    ///
    /// [`HspError::HealthTimeout`] when the probe does not return within
    /// `timeout`; [`HspError::NotConnected`] when the probe cannot be sent.
    pub async fn health_check(&self, timeout: Duration) -> HspResult<HealthReport> {
        let inner = &self.inner;
        let probe_id = Uuid::new_v4();
        let receiver = inner.health_waiters.register(probe_id);
        let sent_ms = inner.clock.now_ms();

        let frame = OutboundMessage {
            topic: inner.health_topic.clone(),
            qos: QosLevel::AtMostOnce,
            body: OutboundBody::Json(serde_json::json!({
                "probe_id": probe_id.to_string(),
                "sent_ms": sent_ms,
            })),
        };
        match inner.bridge.publish_outbound(frame).await {
            Ok(PublishOutcome::Published) => {}
            Ok(_) => {
                inner.health_waiters.release(probe_id);
                return Err(HspError::NotConnected);
            }
            Err(error) => {
                inner.health_waiters.release(probe_id);
                return Err(error);
            }
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(received_ms)) => Ok(HealthReport {
                healthy: true,
                round_trip_ms: received_ms.saturating_sub(sent_ms),
                link: inner.link.read().state(),
            }),
            Ok(Err(_)) => Err(HspError::NotConnected),
            Err(_) => {
                inner.health_waiters.release(probe_id);
                Err(HspError::HealthTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl ConnectorInner {
    fn new_envelope(&self, payload: MessagePayload) -> MessageEnvelope {
        MessageEnvelope::new(self.ai_id.clone(), self.clock.now_ms(), payload)
    }

    /// Standard wire subscriptions plus queue flush and re-advertisement,
    /// run after every successful connect.
    async fn post_connect(&self) {
        let standard_topics = [
            Topics::all_facts(),
            Topics::all_opinions(),
            Topics::all_capability_advertisements(),
            Topics::requests(&self.ai_id),
            Topics::results(&self.ai_id),
            Topics::acks(&self.ai_id),
            self.health_topic.clone(),
        ];
        for topic in standard_topics {
            if let Err(error) = self
                .transport
                .subscribe(&topic, self.config.default_qos)
                .await
            {
                warn!(topic = %topic, error = %error, "Standard subscription failed");
            }
        }

        let flushed = self.bridge.flush_offline_queue().await;
        if flushed > 0 {
            info!(flushed, "Flushed offline queue after connect");
        }

        self.readvertise_capabilities().await;
    }

    async fn readvertise_capabilities(&self) {
        let mut capabilities: Vec<CapabilityPayload> =
            self.local_capabilities.lock().values().cloned().collect();
        let provider = self.capability_provider.lock().clone();
        if let Some(provider) = provider {
            capabilities.extend(provider());
        }
        if capabilities.is_empty() {
            return;
        }
        let count = capabilities.len();
        for mut capability in capabilities {
            capability.ai_id = self.ai_id.clone();
            if let Err(error) = self.publish_advertisement(capability).await {
                warn!(error = %error, "Capability re-advertisement failed");
            }
        }
        info!(count, "Re-advertised capabilities");
    }

    async fn publish_advertisement(
        &self,
        capability: CapabilityPayload,
    ) -> HspResult<PublishOutcome> {
        let envelope = self.new_envelope(MessagePayload::CapabilityAdvertisement(capability));
        let frame = OutboundMessage::envelope(
            Topics::capability_advertisements(&self.ai_id),
            self.config.default_qos,
            envelope,
        );
        self.bridge.publish_outbound(frame).await
    }

    fn fire_lifecycle(&self, callbacks: &Mutex<Vec<LifecycleCallback>>) {
        let callbacks: Vec<LifecycleCallback> = callbacks.lock().clone();
        for callback in callbacks {
            callback();
        }
    }

    /// Drain transport events in arrival order. Holds only a weak
    /// reference so dropping the last connector handle shuts the worker
    /// down (the channel closes with the transport's handler).
    async fn run_dispatch(
        inner: std::sync::Weak<ConnectorInner>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            match event {
                TransportEvent::Message { topic, payload } => {
                    if topic == inner.health_topic {
                        inner.handle_health_probe(&payload);
                    } else {
                        inner.bridge.handle_external_message(&topic, &payload).await;
                    }
                }
                TransportEvent::ConnectionLost { reason } => {
                    warn!(ai_id = %inner.ai_id, reason = %reason, "Connection lost");
                    let was_connected = inner.link.read().is_connected();
                    inner.link.write().process_event(LinkEvent::ConnectionLost);
                    if was_connected {
                        inner.fire_lifecycle(&inner.disconnect_callbacks);
                        tokio::spawn(ConnectorInner::run_reconnect(Arc::clone(&inner)));
                    }
                }
            }
        }
        debug!("Connector dispatch worker stopped");
    }

    /// Automatic reconnect ladder after a lost connection.
    async fn run_reconnect(inner: Arc<ConnectorInner>) {
        let _guard = inner.connect_lock.lock().await;
        // A competing connect() or disconnect() may have settled the link.
        if !matches!(inner.link.read().state(), LinkState::Reconnecting { .. }) {
            return;
        }

        let attempts = inner.config.retry_max_attempts.max(1);
        for attempt in 0..attempts {
            let delay = {
                let mut rng = rand::thread_rng();
                inner.backoff.jittered_delay(attempt, &mut rng)
            };
            inner.clock.sleep(delay).await;

            match inner.transport.connect().await {
                Ok(()) => {
                    inner.link.write().process_event(LinkEvent::ConnectSucceeded);
                    info!(ai_id = %inner.ai_id, attempt = attempt + 1, "Reconnected");
                    inner.post_connect().await;
                    inner.fire_lifecycle(&inner.connect_callbacks);
                    return;
                }
                Err(error) => {
                    warn!(
                        ai_id = %inner.ai_id,
                        attempt = attempt + 1,
                        attempts,
                        error = %error,
                        "Reconnect attempt failed"
                    );
                    inner.link.write().process_event(LinkEvent::ConnectFailed);
                }
            }
        }

        inner.link.write().process_event(LinkEvent::RetriesExhausted);
        warn!(
            ai_id = %inner.ai_id,
            "Reconnect budget exhausted; outbound traffic now queues offline"
        );
    }

    fn handle_health_probe(&self, payload: &[u8]) {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
            debug!("Ignoring malformed health probe");
            return;
        };
        let Some(probe_id) = value
            .get("probe_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            debug!("Ignoring health probe without id");
            return;
        };
        self.health_waiters.resolve(probe_id, self.clock.now_ms());
    }

    /// Route aligned inbound envelopes from the bus to registered
    /// callbacks.
    fn wire_bus_dispatchers(inner: &Arc<Self>) {
        for message_type in MessageType::ALL {
            let weak = Arc::downgrade(inner);
            inner.bus.subscribe(
                message_type.bus_topic(),
                boxed_callback(move |message| {
                    let weak = weak.clone();
                    async move {
                        let Some(inner) = weak.upgrade() else {
                            return Ok(());
                        };
                        if let BusMessage::Inbound(envelope) = message {
                            inner.dispatch_inbound(envelope).await;
                        }
                        Ok(())
                    }
                }),
            );
        }
    }

    async fn dispatch_inbound(&self, envelope: Arc<MessageEnvelope>) {
        match &envelope.payload {
            MessagePayload::Fact(_) | MessagePayload::Opinion(_) => {
                self.dispatch_assertion(&envelope).await;
            }
            MessagePayload::CapabilityAdvertisement(capability) => {
                let newly_known = self
                    .remote_capabilities
                    .lock()
                    .upsert(capability.clone(), self.clock.now_ms());
                debug!(
                    capability_id = %capability.capability_id,
                    owner = %capability.ai_id,
                    newly_known,
                    "Capability advertisement received"
                );
                let callbacks: Vec<CapabilityCallback> =
                    self.capability_callbacks.lock().clone();
                for callback in callbacks {
                    callback(capability, &envelope);
                }
                self.maybe_ack(&envelope).await;
            }
            MessagePayload::TaskRequest(request) => {
                let callbacks: Vec<TaskRequestCallback> =
                    self.task_request_callbacks.lock().clone();
                for callback in callbacks {
                    callback(request, &envelope);
                }
                self.maybe_ack(&envelope).await;
            }
            MessagePayload::TaskResult(result) => {
                let resolved = self.task_waiters.resolve(result.request_id, result.clone());
                if !resolved {
                    debug!(
                        request_id = %result.request_id,
                        "Task result without pending waiter (duplicate, late, or foreign)"
                    );
                }
                let callbacks: Vec<TaskResultCallback> =
                    self.task_result_callbacks.lock().clone();
                for callback in callbacks {
                    callback(result, &envelope);
                }
                self.maybe_ack(&envelope).await;
            }
            MessagePayload::Acknowledgement(ack) => {
                if !self.ack_waiters.resolve(ack.target_message_id, ack.clone()) {
                    debug!(
                        target_message_id = %ack.target_message_id,
                        "Acknowledgement without pending waiter"
                    );
                }
                let callbacks: Vec<AckCallback> = self.ack_callbacks.lock().clone();
                for callback in callbacks {
                    callback(ack, &envelope);
                }
            }
        }
    }

    async fn dispatch_assertion(&self, envelope: &Arc<MessageEnvelope>) {
        let Some((payload, kind)) = envelope.payload.as_assertion() else {
            return;
        };
        let callbacks: Vec<AssertionCallback> = self
            .assertion_callbacks
            .lock()
            .iter()
            .filter(|(filter, _)| filter.is_none() || *filter == Some(kind))
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        debug!(
            kind = ?kind,
            sender = %envelope.sender_ai_id,
            callbacks = callbacks.len(),
            "Dispatching assertion"
        );
        for callback in callbacks {
            callback(payload, kind, envelope);
        }
        self.maybe_ack(envelope).await;
    }

    /// Reply with an acknowledgement when the sender asked for one.
    ///
    /// Own messages are only acked in mock mode, where the loopback is the
    /// whole point; on a shared broker the publisher's own wildcard
    /// subscription must not satisfy a peer's ack.
    async fn maybe_ack(&self, envelope: &MessageEnvelope) {
        if !envelope.qos.requires_ack {
            return;
        }
        if envelope.sender_ai_id == self.ai_id && !self.mock_mode {
            return;
        }
        let ack = AckPayload {
            target_message_id: envelope.message_id,
            status: AckStatus::Received,
            ack_timestamp: self.clock.now_ms(),
        };
        let ack_envelope = self
            .new_envelope(MessagePayload::Acknowledgement(ack))
            .to_recipient(envelope.sender_ai_id.clone())
            .correlated_with(envelope.message_id);
        let frame = OutboundMessage::envelope(
            Topics::acks(&envelope.sender_ai_id),
            QosLevel::AtLeastOnce,
            ack_envelope,
        );
        if let Err(error) = self.bridge.publish_outbound(frame).await {
            warn!(error = %error, "Failed to publish acknowledgement");
        }
    }
}

#[async_trait::async_trait]
impl crate::ports::inbound::ConnectorApi for HspConnector {
    async fn connect(&self) -> HspResult<()> {
        HspConnector::connect(self).await
    }

    async fn disconnect(&self) -> HspResult<()> {
        HspConnector::disconnect(self).await
    }

    async fn publish_fact(
        &self,
        fact: AssertionPayload,
        topic: Option<String>,
    ) -> HspResult<PublishOutcome> {
        HspConnector::publish_fact(self, fact, topic).await
    }

    async fn publish_opinion(
        &self,
        opinion: AssertionPayload,
        topic: Option<String>,
    ) -> HspResult<PublishOutcome> {
        HspConnector::publish_opinion(self, opinion, topic).await
    }

    async fn advertise_capability(
        &self,
        capability: CapabilityPayload,
    ) -> HspResult<PublishOutcome> {
        HspConnector::advertise_capability(self, capability).await
    }

    async fn send_task_request(
        &self,
        request: TaskRequestPayload,
        target: RequestTarget,
    ) -> HspResult<TaskHandle> {
        HspConnector::send_task_request(self, request, target).await
    }

    async fn send_task_result(
        &self,
        result: TaskResultPayload,
        callback_topic: String,
    ) -> HspResult<PublishOutcome> {
        HspConnector::send_task_result(self, result, callback_topic).await
    }

    fn get_connector_status(&self) -> ConnectorStatus {
        HspConnector::get_connector_status(self)
    }

    async fn health_check(&self, timeout: Duration) -> HspResult<HealthReport> {
        HspConnector::health_check(self, timeout).await
    }
}
