//! # Stream Subscriptions
//!
//! A stream-style subscription handle for consumers that prefer pulling
//! messages over registering callbacks. Dropping the handle removes the
//! underlying registration.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hsp_types::BusMessage;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

use crate::bus::{boxed_callback, InternalBus, SubscriptionId};
use crate::DEFAULT_STREAM_CAPACITY;

/// A pull-based subscription over bus messages matching one pattern.
///
/// Backed by a bounded channel: if the consumer falls more than
/// [`DEFAULT_STREAM_CAPACITY`] messages behind, further messages are
/// counted as delivery failures and dropped for this subscriber only.
pub struct BusStream {
    receiver: mpsc::Receiver<BusMessage>,
    bus: InternalBus,
    pattern: String,
    id: SubscriptionId,
}

impl BusStream {
    /// Subscribe to `pattern` on `bus` and return the stream handle.
    #[must_use]
    pub fn subscribe(bus: &InternalBus, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let (sender, receiver) = mpsc::channel(DEFAULT_STREAM_CAPACITY);
        let sender = Arc::new(sender);
        let id = bus.subscribe(
            pattern.clone(),
            boxed_callback(move |message| {
                let sender = Arc::clone(&sender);
                async move {
                    sender
                        .try_send(message)
                        .map_err(|_| anyhow::anyhow!("stream subscriber lagging or closed"))
                }
            }),
        );
        Self {
            receiver,
            bus: bus.clone(),
            pattern,
            id,
        }
    }

    /// Receive the next message, waiting if necessary.
    ///
    /// Returns `None` once the handle has been detached from the bus.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }
}

impl Stream for BusStream {
    type Item = BusMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for BusStream {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.pattern, self.id);
        debug!(pattern = %self.pattern, "Bus stream dropped");
    }
}
