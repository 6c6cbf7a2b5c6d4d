//! Topological Ordering
//!
//! Kahn's algorithm over `needs` edges, yielded lazily. Among actions that
//! are ready at the same time, the earliest declared comes first, so the
//! order is deterministic for a given manifest.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use log::debug;

use super::model::{Action, WorkflowGraph};
use super::validator::validate;
use crate::error::ValidationError;

/// Lazy topological iterator over a validated graph.
///
/// Yields each action exactly once, after all of its prerequisites.
pub struct TopologicalOrder<'g> {
    actions: &'g [Action],
    /// Distinct prerequisites still to be emitted, per action
    remaining: Vec<usize>,
    /// Distinct dependents, per action
    dependents: Vec<Vec<usize>>,
    ready: BinaryHeap<Reverse<usize>>,
}

impl<'g> TopologicalOrder<'g> {
    /// Assumes `graph` has passed validation.
    fn new(graph: &'g WorkflowGraph) -> Self {
        let actions = graph.actions();
        let mut remaining = vec![0; actions.len()];
        let mut dependents = vec![Vec::new(); actions.len()];

        for (index, action) in actions.iter().enumerate() {
            let needs: HashSet<usize> = action
                .needs
                .iter()
                .filter_map(|n| graph.action_position(n))
                .collect();
            remaining[index] = needs.len();
            for need in needs {
                dependents[need].push(index);
            }
        }

        let ready = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| Reverse(index))
            .collect();

        Self {
            actions,
            remaining,
            dependents,
            ready,
        }
    }
}

impl<'g> Iterator for TopologicalOrder<'g> {
    type Item = &'g Action;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(index) = self.ready.pop()?;
        for &dependent in &self.dependents[index] {
            self.remaining[dependent] -= 1;
            if self.remaining[dependent] == 0 {
                self.ready.push(Reverse(dependent));
            }
        }
        Some(&self.actions[index])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let pending = self.remaining.iter().filter(|&&c| c > 0).count();
        (self.ready.len(), Some(self.ready.len() + pending))
    }
}

/// Validates the graph and returns its actions in dependency order.
///
/// # Example
///
/// ```
/// use actionflow::workflow::{parse_workflow, topological_order};
///
/// let graph = parse_workflow(r#"
/// action "typing" {
///   uses = "x"
///   needs = "lint"
/// }
/// action "lint" {
///   uses = "x"
/// }
/// "#).unwrap();
///
/// let names: Vec<_> = topological_order(&graph)
///     .unwrap()
///     .map(|a| a.name.as_str())
///     .collect();
/// assert_eq!(names, vec!["lint", "typing"]);
/// ```
pub fn topological_order(graph: &WorkflowGraph) -> Result<TopologicalOrder<'_>, ValidationError> {
    validate(graph)?;
    Ok(TopologicalOrder::new(graph))
}

impl WorkflowGraph {
    /// Actions a workflow needs to finish: its `resolves` goals plus their
    /// transitive `needs`, in topological order.
    pub fn closure(&self, workflow: &str) -> Result<Vec<&Action>, ValidationError> {
        let target = self
            .workflow(workflow)
            .ok_or_else(|| ValidationError::UnknownWorkflow(workflow.to_string()))?;

        let order = topological_order(self)?;

        let mut members = HashSet::new();
        let mut pending: Vec<&str> = target.resolves.iter().map(String::as_str).collect();
        while let Some(name) = pending.pop() {
            if let Some(action) = self.action(name) {
                if members.insert(action.name.as_str()) {
                    pending.extend(action.needs.iter().map(String::as_str));
                }
            }
        }

        debug!(
            "Workflow '{}' closure has {} of {} actions",
            workflow,
            members.len(),
            self.len()
        );

        Ok(order
            .filter(|a| members.contains(a.name.as_str()))
            .collect())
    }
}
