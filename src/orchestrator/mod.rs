//! End-to-end research workflow: outline → chapters → content → final report.

pub mod agents;
pub mod runner;

pub use agents::ResearchAgents;
pub use runner::{WorkflowOrchestrator, WorkflowOutput, WorkflowSettings};
