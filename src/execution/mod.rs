//! Workflow Execution Module
//!
//! Dispatches ready actions to a pluggable runner.
//!
//! # Architecture
//!
//! - [`engine`]: Scheduling loop and worker threads
//! - [`runner`]: The runner trait and the launcher/dry-run runners

pub mod engine;
pub mod runner;

pub use engine::{Engine, RunSummary};
pub use runner::{CommandRunner, DryRunRunner, TaskInvocation, TaskRunner};
