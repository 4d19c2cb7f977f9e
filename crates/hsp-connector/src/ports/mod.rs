//! Ports: the interfaces this subsystem exposes (inbound) and requires
//! from the host (outbound).

pub mod inbound;
pub mod outbound;

pub use inbound::ConnectorApi;
pub use outbound::{Clock, TransportError, TransportEvent, TransportEventHandler, WireTransport};
