//! Execution Planner
//!
//! Manages action scheduling for a run:
//! - Dependency tracking over the planned action set
//! - Parallel limit
//! - Failure propagation (dependents of a failed action are skipped)
//! - Per-action status and timing

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use log::{debug, info};

use super::model::Action;

/// Status of an action during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionStatus {
    /// Waiting for prerequisites or a free slot
    Pending,
    /// Currently executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error message
    Failed(String),
    /// Never started: a prerequisite failed or the run was stopped
    Skipped,
}

/// Execution metrics for a single action.
#[derive(Debug, Clone)]
pub struct ActionMetrics {
    /// When the action started executing
    pub start_time: Option<Instant>,
    /// When the action finished
    pub end_time: Option<Instant>,
    /// Duration in milliseconds
    pub duration_ms: Option<u128>,
    /// Current status
    pub status: ActionStatus,
}

impl ActionMetrics {
    fn new() -> Self {
        Self {
            start_time: None,
            end_time: None,
            duration_ms: None,
            status: ActionStatus::Pending,
        }
    }

    fn finish(&mut self, status: ActionStatus) {
        let now = Instant::now();
        self.end_time = Some(now);
        if let Some(start) = self.start_time {
            self.duration_ms = Some(now.duration_since(start).as_millis());
        }
        self.status = status;
    }
}

/// Tracks which planned actions may start next.
///
/// The plan must be in topological order (see
/// [`topological_order`](super::order::topological_order)). Prerequisites
/// that are not part of the plan count as already satisfied.
pub struct ExecutionPlanner<'g> {
    /// Planned actions in topological order
    plan: Vec<&'g Action>,
    /// Names in the plan
    planned: HashSet<&'g str>,
    /// Actions currently running
    running: HashSet<String>,
    /// Maximum parallel actions allowed
    max_parallel: usize,
    /// Metrics for each planned action
    metrics: HashMap<String, ActionMetrics>,
}

impl<'g> ExecutionPlanner<'g> {
    /// Creates a planner for `plan`, running at most `max_parallel`
    /// actions at once (a limit of zero is treated as one).
    pub fn new(plan: Vec<&'g Action>, max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        info!(
            "Creating planner: {} actions, {} max parallel",
            plan.len(),
            max_parallel
        );

        let planned = plan.iter().map(|a| a.name.as_str()).collect();
        let metrics = plan
            .iter()
            .map(|a| (a.name.clone(), ActionMetrics::new()))
            .collect();

        Self {
            plan,
            planned,
            running: HashSet::new(),
            max_parallel,
            metrics,
        }
    }

    fn status(&self, name: &str) -> Option<&ActionStatus> {
        self.metrics.get(name).map(|m| &m.status)
    }

    fn is_satisfied(&self, need: &str) -> bool {
        !self.planned.contains(need) || self.status(need) == Some(&ActionStatus::Completed)
    }

    /// Returns actions that may start now, in plan order.
    ///
    /// An action is ready if it is still pending and every planned
    /// prerequisite has completed. At most `max_parallel` minus the running
    /// count are returned.
    pub fn ready_actions(&self) -> Vec<&'g Action> {
        let slots = self.max_parallel.saturating_sub(self.running.len());

        self.plan
            .iter()
            .copied()
            .filter(|a| self.status(&a.name) == Some(&ActionStatus::Pending))
            .filter(|a| a.needs.iter().all(|n| self.is_satisfied(n)))
            .take(slots)
            .collect()
    }

    /// Marks an action as running.
    pub fn mark_running(&mut self, name: &str) {
        self.running.insert(name.to_string());

        if let Some(metrics) = self.metrics.get_mut(name) {
            metrics.start_time = Some(Instant::now());
            metrics.status = ActionStatus::Running;
        }
        debug!(
            "Action '{}' started ({}/{} slots)",
            name,
            self.running.len(),
            self.max_parallel
        );
    }

    /// Marks an action as completed.
    pub fn mark_completed(&mut self, name: &str) {
        self.running.remove(name);

        if let Some(metrics) = self.metrics.get_mut(name) {
            metrics.finish(ActionStatus::Completed);
        }
        debug!("Action '{}' completed", name);
    }

    /// Marks an action as failed and skips every pending action that
    /// transitively needs it. Returns the names of the skipped actions.
    pub fn mark_failed(&mut self, name: &str, error: String) -> Vec<String> {
        self.running.remove(name);

        if let Some(metrics) = self.metrics.get_mut(name) {
            metrics.finish(ActionStatus::Failed(error));
        }

        // The plan is topological, so one pass reaches every transitive dependent
        let mut blocked: HashSet<&str> = HashSet::new();
        blocked.insert(name);
        let mut skipped = Vec::new();

        for action in &self.plan {
            let is_pending = self.metrics.get(&action.name).map(|m| &m.status)
                == Some(&ActionStatus::Pending);
            if is_pending && action.needs.iter().any(|n| blocked.contains(n.as_str())) {
                blocked.insert(action.name.as_str());
                skipped.push(action.name.clone());
            }
        }

        for skipped_name in &skipped {
            if let Some(metrics) = self.metrics.get_mut(skipped_name) {
                metrics.status = ActionStatus::Skipped;
            }
        }

        if !skipped.is_empty() {
            info!(
                "Skipping {} action(s) that need '{}': {}",
                skipped.len(),
                name,
                skipped.join(", ")
            );
        }
        skipped
    }

    /// Skips every pending action. Used to stop a run after a failure.
    pub fn skip_pending(&mut self) -> Vec<String> {
        let mut skipped = Vec::new();
        for action in &self.plan {
            if let Some(metrics) = self.metrics.get_mut(&action.name) {
                if metrics.status == ActionStatus::Pending {
                    metrics.status = ActionStatus::Skipped;
                    skipped.push(action.name.clone());
                }
            }
        }
        skipped
    }

    /// Returns true while any action is pending or running.
    pub fn has_work_remaining(&self) -> bool {
        !self.running.is_empty()
            || self
                .metrics
                .values()
                .any(|m| m.status == ActionStatus::Pending)
    }

    /// Number of running actions.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Returns the current progress as (completed, total).
    pub fn progress(&self) -> (usize, usize) {
        let completed = self
            .metrics
            .values()
            .filter(|m| m.status == ActionStatus::Completed)
            .count();
        (completed, self.plan.len())
    }

    /// Names with the given status, in plan order.
    pub fn names_with<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&ActionStatus) -> bool,
    {
        self.plan
            .iter()
            .filter(|a| self.status(&a.name).map_or(false, &predicate))
            .map(|a| a.name.clone())
            .collect()
    }

    /// Returns metrics for all planned actions.
    pub fn metrics(&self) -> &HashMap<String, ActionMetrics> {
        &self.metrics
    }
}
