//! # Message Bridge
//!
//! Routes envelopes bidirectionally between the internal bus and the
//! external transport.
//!
//! - **External → internal**: raw bytes go through the aligner; aligned
//!   envelopes are published on the bus under `hsp.external.<type>`;
//!   unalignable messages are logged and dropped. Nothing on this path can
//!   take the bridge down.
//! - **Internal → external**: outbound frames are encoded, checked against
//!   the destination's circuit breaker, and published via the transport.
//!   While the link is down the frame lands in the offline queue instead,
//!   to be flushed FIFO on reconnect.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::aligner::DataAligner;
use crate::domain::circuit::CircuitRegistry;
use crate::domain::link::LinkStateMachine;
use crate::domain::offline_queue::{EnqueueOutcome, OfflineQueue};
use crate::error::{HspError, HspResult};
use crate::ports::outbound::{Clock, WireTransport};
use crate::domain::circuit::CircuitState;
use hsp_bus::{boxed_callback, InternalBus};
use hsp_types::{BusMessage, OutboundMessage, BUS_INTERNAL_MESSAGE};

/// How an outbound publish ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The transport accepted the message.
    Published,
    /// The link is down; the message waits in the offline queue.
    Queued,
    /// The transport rejected the message; recorded against the
    /// destination's circuit breaker.
    Failed,
}

/// Bidirectional router between bus and transport.
pub struct MessageBridge {
    transport: Arc<dyn WireTransport>,
    bus: InternalBus,
    aligner: DataAligner,
    circuits: Arc<Mutex<CircuitRegistry>>,
    offline: Arc<Mutex<OfflineQueue>>,
    link: Arc<RwLock<LinkStateMachine>>,
    clock: Arc<dyn Clock>,
    alignment_rejects: AtomicU64,
    inbound_forwarded: AtomicU64,
    outbound_published: AtomicU64,
}

impl MessageBridge {
    /// Wire a bridge over shared resilience state.
    #[must_use]
    pub fn new(
        transport: Arc<dyn WireTransport>,
        bus: InternalBus,
        aligner: DataAligner,
        circuits: Arc<Mutex<CircuitRegistry>>,
        offline: Arc<Mutex<OfflineQueue>>,
        link: Arc<RwLock<LinkStateMachine>>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            bus,
            aligner,
            circuits,
            offline,
            link,
            clock,
            alignment_rejects: AtomicU64::new(0),
            inbound_forwarded: AtomicU64::new(0),
            outbound_published: AtomicU64::new(0),
        })
    }

    /// Subscribe the bridge to `hsp.internal.message` so bus-originated
    /// outbound frames reach the transport. Failures on this path are
    /// logged, never propagated.
    pub fn register_bus_routes(self: &Arc<Self>) {
        let bridge = Arc::clone(self);
        self.bus.subscribe(
            BUS_INTERNAL_MESSAGE,
            boxed_callback(move |message| {
                let bridge = Arc::clone(&bridge);
                async move {
                    if let BusMessage::Outbound(outbound) = message {
                        if let Err(error) = bridge.publish_outbound(outbound).await {
                            warn!(error = %error, "bus-originated publish failed");
                        }
                    }
                    Ok(())
                }
            }),
        );
    }

    /// Handle raw bytes arriving from the transport.
    ///
    /// Malformed input is logged and dropped; subsequent messages are
    /// unaffected.
    pub async fn handle_external_message(&self, topic: &str, payload: &[u8]) {
        match self.aligner.align(payload) {
            Ok(envelope) => {
                self.inbound_forwarded.fetch_add(1, Ordering::Relaxed);
                let bus_topic = envelope.message_type.bus_topic();
                debug!(
                    topic = %topic,
                    message_type = %envelope.message_type,
                    sender = %envelope.sender_ai_id,
                    "Inbound message aligned"
                );
                self.bus
                    .publish(bus_topic, BusMessage::Inbound(Arc::new(envelope)))
                    .await;
            }
            Err(error) => {
                self.alignment_rejects.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %topic, error = %error, "Dropping unalignable message");
            }
        }
    }

    /// Publish an outbound frame, or queue it while the link is down.
    ///
    /// # Errors
    ///
    /// - [`HspError::CircuitOpen`] when the destination's breaker is open
    ///   (the transport is not invoked)
    /// - [`HspError::QueueFull`] when the link is down and the overflow
    ///   policy rejects new messages
    /// - [`HspError::Encoding`] when the body cannot be serialized
    ///
    /// Ordinary transport failures are absorbed into
    /// [`PublishOutcome::Failed`] after being recorded on the breaker.
    pub async fn publish_outbound(&self, message: OutboundMessage) -> HspResult<PublishOutcome> {
        if !self.link.read().is_connected() {
            return self.enqueue_offline(message);
        }

        let bytes = message.body.encode().map_err(|e| HspError::Encoding {
            reason: e.to_string(),
        })?;

        let now = self.clock.now_ms();
        {
            let mut circuits = self.circuits.lock();
            if !circuits.try_acquire(&message.topic, now) {
                debug!(destination = %message.topic, "Circuit open; failing fast");
                return Err(HspError::CircuitOpen {
                    destination: message.topic,
                });
            }
        }

        match self
            .transport
            .publish(&message.topic, &bytes, message.qos)
            .await
        {
            Ok(()) => {
                self.circuits.lock().record_success(&message.topic);
                self.outbound_published.fetch_add(1, Ordering::Relaxed);
                Ok(PublishOutcome::Published)
            }
            Err(error) => {
                self.circuits
                    .lock()
                    .record_failure(&message.topic, self.clock.now_ms());
                warn!(destination = %message.topic, error = %error, "Publish failed");
                Ok(PublishOutcome::Failed)
            }
        }
    }

    fn enqueue_offline(&self, message: OutboundMessage) -> HspResult<PublishOutcome> {
        let topic = message.topic.clone();
        let (outcome, capacity) = {
            let mut offline = self.offline.lock();
            (offline.push(message), offline.capacity())
        };
        match outcome {
            EnqueueOutcome::Enqueued => {
                debug!(destination = %topic, "Link down; message queued");
                Ok(PublishOutcome::Queued)
            }
            EnqueueOutcome::DroppedOldest(dropped) => {
                warn!(
                    destination = %topic,
                    dropped_destination = %dropped.topic,
                    "Offline queue full; dropped oldest message"
                );
                Ok(PublishOutcome::Queued)
            }
            EnqueueOutcome::Rejected(_) => Err(HspError::QueueFull { capacity }),
        }
    }

    /// Flush the offline queue FIFO. Stops at the first transport failure
    /// and requeues the remainder in order.
    ///
    /// Returns the number of messages flushed.
    pub async fn flush_offline_queue(&self) -> usize {
        let mut remaining: std::collections::VecDeque<OutboundMessage> =
            self.offline.lock().drain().into();
        if remaining.is_empty() {
            return 0;
        }
        let total = remaining.len();
        let mut flushed = 0;

        while let Some(message) = remaining.pop_front() {
            let bytes = match message.body.encode() {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(destination = %message.topic, error = %error, "Dropping unencodable queued message");
                    continue;
                }
            };
            match self
                .transport
                .publish(&message.topic, &bytes, message.qos)
                .await
            {
                Ok(()) => {
                    self.circuits.lock().record_success(&message.topic);
                    self.outbound_published.fetch_add(1, Ordering::Relaxed);
                    flushed += 1;
                }
                Err(error) => {
                    warn!(
                        destination = %message.topic,
                        error = %error,
                        "Flush interrupted; requeueing remainder"
                    );
                    self.circuits
                        .lock()
                        .record_failure(&message.topic, self.clock.now_ms());
                    remaining.push_front(message);
                    let rest: Vec<OutboundMessage> = remaining.drain(..).collect();
                    self.offline.lock().requeue_front(rest);
                    break;
                }
            }
        }

        info!(flushed, total, "Offline queue flush finished");
        flushed
    }

    /// Messages currently parked in the offline queue.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.offline.lock().len()
    }

    /// Snapshot of per-destination circuit states.
    #[must_use]
    pub fn circuit_states(&self) -> std::collections::HashMap<String, CircuitState> {
        self.circuits.lock().states(self.clock.now_ms())
    }

    /// Messages dropped by the aligner.
    #[must_use]
    pub fn alignment_rejects(&self) -> u64 {
        self.alignment_rejects.load(Ordering::Relaxed)
    }

    /// Aligned inbound messages forwarded to the bus.
    #[must_use]
    pub fn inbound_forwarded(&self) -> u64 {
        self.inbound_forwarded.load(Ordering::Relaxed)
    }

    /// Outbound messages accepted by the transport.
    #[must_use]
    pub fn outbound_published(&self) -> u64 {
        self.outbound_published.load(Ordering::Relaxed)
    }
}
