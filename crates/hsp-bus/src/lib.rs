//! # Internal Bus - In-Process Pub/Sub for Local Components
//!
//! Routes [`BusMessage`] frames between the components living inside one
//! connector: the bridge publishes aligned inbound envelopes under
//! `hsp.external.<type>` topics, and local components hand outbound frames
//! to the bridge via `hsp.internal.message`.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Component A │                    │  Component B │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │ Internal Bus │ ─────────┘
//!                  │              │  subscribe()
//!                  └──────────────┘
//! ```
//!
//! ## Delivery Rules
//!
//! - Subscribers on one topic are invoked in subscription order.
//! - A failing subscriber is logged and skipped; the rest still receive the
//!   message.
//! - Delivery is in-process and sequential per `publish` call, so messages
//!   from one caller to one topic arrive at every subscriber in send order.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bus;
pub mod stream;

// Re-export main types
pub use bus::{boxed_callback, BusCallback, InternalBus, SubscriptionId};
pub use stream::BusStream;

pub use hsp_types::BusMessage;

/// Buffered messages per stream subscriber before drops.
pub const DEFAULT_STREAM_CAPACITY: usize = 256;
