//! Production orchestrator for submitted jobs.
//!
//! The orchestrator drives jobs through the state machine automatically:
//! - **Admission**: sequential, single-flight (one job mid-setup at a time)
//! - **Production**: concurrent polling of remote generation operations,
//!   one loop per outstanding operation handle

mod config;
mod coordinator;
mod poller;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use coordinator::{plan_sub_tasks, AssetCoordinator, StartReport, SubTask};
pub use poller::PollingScheduler;
pub use runner::ProductionOrchestrator;
pub use types::{OrchestratorError, OrchestratorStatus};
