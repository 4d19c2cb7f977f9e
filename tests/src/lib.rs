//! # HSP Test Suite
//!
//! Unified test crate exercising the connector crates together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Shared fixtures (broker, configs, payloads)
//! └── integration/      # Cross-crate flows
//!     ├── knowledge_flows.rs   # Facts/opinions between live connectors
//!     ├── task_flows.rs        # Capability + task request/result round trips
//!     ├── resilience.rs        # Backoff ladders, circuit breakers, offline queue
//!     └── mock_mode.rs         # Transportless loopback behavior
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p hsp-tests
//!
//! # By category
//! cargo test -p hsp-tests integration::resilience::
//! ```

#![allow(dead_code)]

pub mod integration;
pub mod support;
