//! Monitoring Module
//!
//! - [`ExecutionTimeline`]: Action start/end timing for run summaries

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
