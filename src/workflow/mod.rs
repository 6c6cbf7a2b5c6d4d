//! Workflow Definition Module
//!
//! Loading, validating and ordering action graphs.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Action, Workflow, WorkflowGraph)
//! - [`lexer`]: Tokenizer for the block syntax
//! - [`parser`]: Manifest parsing and file loading
//! - [`writer`]: Canonical block-syntax output
//! - [`validator`]: Reference and cycle checks, lint warnings
//! - [`order`]: Topological order and workflow closures
//! - [`planner`]: Execution planning and scheduling

pub mod lexer;
pub mod model;
pub mod order;
pub mod parser;
pub mod planner;
pub mod validator;
pub mod writer;

pub use model::{Action, Args, GraphDocument, Value, Workflow, WorkflowGraph};
pub use order::{topological_order, TopologicalOrder};
pub use parser::{
    load_workflow, parse_with_format, parse_workflow, save_workflow, serialize_with_format, Format,
};
pub use planner::{ActionMetrics, ActionStatus, ExecutionPlanner};
pub use validator::{lint, validate, Warning};
pub use writer::to_hcl;
