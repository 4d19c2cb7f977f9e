//! Pure domain logic: no I/O, time passed in, deterministic and
//! independently testable.

pub mod aligner;
pub mod backoff;
pub mod capabilities;
pub mod circuit;
pub mod correlation;
pub mod link;
pub mod offline_queue;
