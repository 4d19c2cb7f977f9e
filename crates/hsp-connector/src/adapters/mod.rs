//! Concrete implementations of the outbound ports.

pub mod clock;
pub mod memory;

pub use clock::SystemClock;
pub use memory::{InMemoryBroker, MemoryTransport};
