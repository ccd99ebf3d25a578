// src/scheduler/mod.rs

//! Orchestration core.
//!
//! - [`task_manager`] holds one instance's status, queue and kill switch.
//! - [`registry`] keeps one task manager per store instance plus the global
//!   scheduler flags.
//! - [`runner`] drives full runs, single-instance runs and stops.
//! - [`report`] aggregates per-instance outcomes.

pub mod registry;
pub mod report;
pub mod runner;
pub mod task_manager;

pub use registry::{CloseHook, ManagerSnapshot, Registry};
pub use report::{RunReport, RunResult};
pub use runner::{MANUALLY_STOPPED, Orchestrator, OrchestratorOptions, SchedulerCommand};
pub use task_manager::TaskManager;
