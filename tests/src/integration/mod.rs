//! Cross-crate integration flows.

pub mod knowledge_flows;
pub mod mock_mode;
pub mod resilience;
pub mod task_flows;
