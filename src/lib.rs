//! actionflow - Action Workflow Dependency Graphs
//!
//! Loads `main.workflow` style manifests (named workflows triggered by an
//! event, resolving to actions that form a dependency graph), validates
//! them, computes a dependency-respecting order, and can dispatch actions
//! to an external runner.
//!
//! # Architecture
//!
//! - [`workflow`]: Data model, parsing, validation and ordering
//! - [`execution`]: Parallel dispatch engine and task runners
//! - [`monitoring`]: Execution timeline
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use actionflow::execution::{DryRunRunner, Engine};
//! use actionflow::load_workflow;
//! use actionflow::workflow::topological_order;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load and validate a manifest
//!     let graph = load_workflow(".github/main.workflow")?;
//!
//!     for action in topological_order(&graph)? {
//!         println!("{} -> {}", action.name, action.uses);
//!     }
//!
//!     // Walk the graph without running anything
//!     let runner = DryRunRunner;
//!     let mut engine = Engine::new(&graph, &runner);
//!     engine.set_max_parallel(4);
//!     engine.run()?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use error::{Error, Result};
pub use execution::engine::Engine;
pub use workflow::model::{Action, Workflow, WorkflowGraph};
pub use workflow::parser::{load_workflow, parse_workflow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "actionflow";

/// Manifest path used when none is given.
pub const DEFAULT_MANIFEST: &str = ".github/main.workflow";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "actionflow");
    }

    #[test]
    fn test_module_exports_action() {
        let action = Action::new("lint", "docker://python:3.7");
        assert_eq!(action.name, "lint");
        assert_eq!(action.uses, "docker://python:3.7");
    }

    #[test]
    fn test_module_exports_graph() {
        let graph = WorkflowGraph::default();
        assert!(graph.is_empty());
        assert!(parse_workflow("").unwrap().is_empty());
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
