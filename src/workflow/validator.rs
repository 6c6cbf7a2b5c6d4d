//! Workflow Validation
//!
//! Checks the two graph invariants:
//! - Reference integrity: every `needs` and `resolves` entry names a
//!   declared action
//! - Acyclicity: no action depends on itself, directly or transitively
//!
//! Also provides [`lint`], which reports suspicious but loadable manifests.

use std::collections::HashSet;
use std::fmt;

use log::{debug, info};

use super::model::WorkflowGraph;
use crate::error::{Referrer, ValidationError};

/// Maximum edit distance for a "did you mean" suggestion.
const SUGGESTION_DISTANCE: usize = 2;

/// Validates the graph invariants.
///
/// References are checked first, workflows before actions and each list in
/// order, so the first error reported is deterministic. Cycles are only
/// looked for once every reference resolves.
pub fn validate(graph: &WorkflowGraph) -> Result<(), ValidationError> {
    info!(
        "Validating {} workflows, {} actions",
        graph.workflows().len(),
        graph.actions().len()
    );

    check_references(graph)?;
    check_acyclic(graph)?;

    info!("Workflow graph validated");
    Ok(())
}

fn check_references(graph: &WorkflowGraph) -> Result<(), ValidationError> {
    for workflow in graph.workflows() {
        for name in &workflow.resolves {
            if !graph.contains_action(name) {
                return Err(unknown_reference(
                    graph,
                    Referrer::Workflow(workflow.name.clone()),
                    name,
                ));
            }
        }
    }

    for action in graph.actions() {
        for name in &action.needs {
            if !graph.contains_action(name) {
                return Err(unknown_reference(
                    graph,
                    Referrer::Action(action.name.clone()),
                    name,
                ));
            }
        }
    }

    Ok(())
}

fn unknown_reference(graph: &WorkflowGraph, referrer: Referrer, name: &str) -> ValidationError {
    ValidationError::UnknownReference {
        referrer,
        name: name.to_string(),
        suggestion: suggest(graph, name),
    }
}

/// Closest declared action name within [`SUGGESTION_DISTANCE`] edits;
/// ties go to the earliest declared.
fn suggest(graph: &WorkflowGraph, name: &str) -> Option<String> {
    graph
        .actions()
        .iter()
        .map(|a| (edit_distance(&a.name, name), &a.name))
        .filter(|(distance, _)| *distance <= SUGGESTION_DISTANCE)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate.clone())
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search over `needs` edges. Meeting an in-progress action
/// closes a cycle; the path is reported from that action back to itself.
///
/// Assumes every reference resolves.
fn check_acyclic(graph: &WorkflowGraph) -> Result<(), ValidationError> {
    let actions = graph.actions();
    let needs: Vec<Vec<usize>> = actions
        .iter()
        .map(|a| {
            a.needs
                .iter()
                .filter_map(|n| graph.action_position(n))
                .collect()
        })
        .collect();

    let mut marks = vec![Mark::Unvisited; actions.len()];

    for start in 0..actions.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }

        // (action, index of the next prerequisite to visit)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        marks[start] = Mark::InProgress;

        while let Some(&(node, next)) = stack.last() {
            if let Some(&dep) = needs[node].get(next) {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match marks[dep] {
                    Mark::Unvisited => {
                        marks[dep] = Mark::InProgress;
                        stack.push((dep, 0));
                    }
                    Mark::InProgress => {
                        let from = stack
                            .iter()
                            .position(|&(n, _)| n == dep)
                            .unwrap_or(0);
                        let mut path: Vec<String> = stack[from..]
                            .iter()
                            .map(|&(n, _)| actions[n].name.clone())
                            .collect();
                        path.push(actions[dep].name.clone());
                        debug!("Cycle found: {:?}", path);
                        return Err(ValidationError::Cycle { path });
                    }
                    Mark::Done => {}
                }
            } else {
                marks[node] = Mark::Done;
                stack.pop();
            }
        }
    }

    Ok(())
}

/// A non-fatal finding about a loadable graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// No workflow resolves to this action, directly or through `needs`
    Unreachable(String),
    /// Workflow with an empty `resolves`
    NoResolves(String),
    /// Workflow with an empty `on`
    EmptyEvent(String),
    /// Action with an empty `uses`
    EmptyUses(String),
    /// The same name listed twice in one `needs` or `resolves`
    DuplicateEntry { referrer: Referrer, name: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(name) => {
                write!(f, "Action \"{}\" is not resolved by any workflow", name)
            }
            Self::NoResolves(name) => write!(f, "Workflow \"{}\" resolves no actions", name),
            Self::EmptyEvent(name) => write!(f, "Workflow \"{}\" has an empty 'on' event", name),
            Self::EmptyUses(name) => write!(f, "Action \"{}\" has an empty 'uses'", name),
            Self::DuplicateEntry { referrer, name } => {
                write!(f, "{} \"{}\" more than once", referrer, name)
            }
        }
    }
}

/// Reports suspicious but valid constructs.
///
/// Useful as CLI feedback; nothing here stops a graph from loading.
pub fn lint(graph: &WorkflowGraph) -> Vec<Warning> {
    let mut warnings = Vec::new();

    for workflow in graph.workflows() {
        if workflow.on.trim().is_empty() {
            warnings.push(Warning::EmptyEvent(workflow.name.clone()));
        }
        if workflow.resolves.is_empty() {
            warnings.push(Warning::NoResolves(workflow.name.clone()));
        }
        for name in duplicates(&workflow.resolves) {
            warnings.push(Warning::DuplicateEntry {
                referrer: Referrer::Workflow(workflow.name.clone()),
                name,
            });
        }
    }

    for action in graph.actions() {
        if action.uses.trim().is_empty() {
            warnings.push(Warning::EmptyUses(action.name.clone()));
        }
        for name in duplicates(&action.needs) {
            warnings.push(Warning::DuplicateEntry {
                referrer: Referrer::Action(action.name.clone()),
                name,
            });
        }
    }

    if !graph.workflows().is_empty() {
        let reachable = reachable_from_workflows(graph);
        for action in graph.actions() {
            if !reachable.contains(action.name.as_str()) {
                warnings.push(Warning::Unreachable(action.name.clone()));
            }
        }
    }

    warnings
}

fn duplicates(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut repeated: Vec<String> = Vec::new();
    for name in names {
        if !seen.insert(name.as_str()) && !repeated.contains(name) {
            repeated.push(name.clone());
        }
    }
    repeated
}

fn reachable_from_workflows(graph: &WorkflowGraph) -> HashSet<&str> {
    let mut reachable = HashSet::new();
    let mut pending: Vec<&str> = graph
        .workflows()
        .iter()
        .flat_map(|w| w.resolves.iter().map(String::as_str))
        .collect();

    while let Some(name) = pending.pop() {
        let Some(action) = graph.action(name) else {
            continue;
        };
        if reachable.insert(action.name.as_str()) {
            pending.extend(action.needs.iter().map(String::as_str));
        }
    }

    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{Action, Workflow};

    fn graph(workflows: Vec<Workflow>, actions: Vec<Action>) -> WorkflowGraph {
        WorkflowGraph::new(workflows, actions).unwrap()
    }

    #[test]
    fn test_valid_chain() {
        let g = graph(
            vec![Workflow::new("ci", "push").resolves("typing")],
            vec![
                Action::new("tests", "x"),
                Action::new("lint", "x").depends_on("tests"),
                Action::new("typing", "x").depends_on("lint"),
            ],
        );
        assert!(validate(&g).is_ok());
    }

    #[test]
    fn test_empty_graph_is_valid() {
        assert!(validate(&WorkflowGraph::default()).is_ok());
    }

    #[test]
    fn test_two_node_cycle() {
        let g = graph(
            vec![],
            vec![
                Action::new("a", "x").depends_on("b"),
                Action::new("b", "x").depends_on("a"),
            ],
        );
        assert_eq!(
            validate(&g).unwrap_err(),
            ValidationError::Cycle {
                path: vec!["a".to_string(), "b".to_string(), "a".to_string()]
            }
        );
    }

    #[test]
    fn test_self_cycle() {
        let g = graph(vec![], vec![Action::new("a", "x").depends_on("a")]);
        assert_eq!(
            validate(&g).unwrap_err(),
            ValidationError::Cycle {
                path: vec!["a".to_string(), "a".to_string()]
            }
        );
    }

    #[test]
    fn test_cycle_path_excludes_lead_in() {
        let g = graph(
            vec![],
            vec![
                Action::new("entry", "x").depends_on("b"),
                Action::new("b", "x").depends_on("c"),
                Action::new("c", "x").depends_on("d"),
                Action::new("d", "x").depends_on("b"),
            ],
        );
        match validate(&g).unwrap_err() {
            ValidationError::Cycle { path } => {
                assert_eq!(path, vec!["b", "c", "d", "b"]);
            }
            other => panic!("Expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let g = graph(
            vec![],
            vec![
                Action::new("root", "x"),
                Action::new("left", "x").depends_on("root"),
                Action::new("right", "x").depends_on("root"),
                Action::new("join", "x").depends_on("left").depends_on("right"),
            ],
        );
        assert!(validate(&g).is_ok());
    }

    #[test]
    fn test_unknown_need() {
        let g = graph(vec![], vec![Action::new("a", "x").depends_on("ghost")]);
        assert_eq!(
            validate(&g).unwrap_err(),
            ValidationError::UnknownReference {
                referrer: Referrer::Action("a".to_string()),
                name: "ghost".to_string(),
                suggestion: None,
            }
        );
    }

    #[test]
    fn test_unknown_resolve_with_typo_suggestion() {
        let g = graph(
            vec![Workflow::new("Python 3.5", "push").resolves("Pyton 3.5 - typing")],
            vec![Action::new("Python 3.5 - typing", "x")],
        );
        assert_eq!(
            validate(&g).unwrap_err(),
            ValidationError::UnknownReference {
                referrer: Referrer::Workflow("Python 3.5".to_string()),
                name: "Pyton 3.5 - typing".to_string(),
                suggestion: Some("Python 3.5 - typing".to_string()),
            }
        );
    }

    #[test]
    fn test_references_checked_before_cycles() {
        let g = graph(
            vec![],
            vec![
                Action::new("a", "x").depends_on("b"),
                Action::new("b", "x").depends_on("a").depends_on("missing"),
            ],
        );
        assert!(matches!(
            validate(&g).unwrap_err(),
            ValidationError::UnknownReference { .. }
        ));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("lint", "lint"), 0);
        assert_eq!(edit_distance("lint", "lnt"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_lint_clean_graph() {
        let g = graph(
            vec![Workflow::new("ci", "push").resolves("lint")],
            vec![
                Action::new("tests", "x"),
                Action::new("lint", "x").depends_on("tests"),
            ],
        );
        assert!(lint(&g).is_empty());
    }

    #[test]
    fn test_lint_findings() {
        let g = graph(
            vec![
                Workflow::new("ci", "push").resolves("lint").resolves("lint"),
                Workflow::new("idle", ""),
            ],
            vec![
                Action::new("lint", "x"),
                Action::new("orphan", ""),
                Action::new("twice", "x").depends_on("lint").depends_on("lint"),
            ],
        );

        let warnings = lint(&g);
        assert!(warnings.contains(&Warning::EmptyEvent("idle".to_string())));
        assert!(warnings.contains(&Warning::NoResolves("idle".to_string())));
        assert!(warnings.contains(&Warning::EmptyUses("orphan".to_string())));
        assert!(warnings.contains(&Warning::Unreachable("orphan".to_string())));
        assert!(warnings.contains(&Warning::Unreachable("twice".to_string())));
        assert!(warnings.contains(&Warning::DuplicateEntry {
            referrer: Referrer::Workflow("ci".to_string()),
            name: "lint".to_string(),
        }));
        assert!(warnings.contains(&Warning::DuplicateEntry {
            referrer: Referrer::Action("twice".to_string()),
            name: "lint".to_string(),
        }));
        assert!(!warnings.contains(&Warning::Unreachable("lint".to_string())));
    }

    #[test]
    fn test_lint_without_workflows_skips_reachability() {
        let g = graph(vec![], vec![Action::new("solo", "x")]);
        assert!(lint(&g).is_empty());
    }

    #[test]
    fn test_warning_display() {
        let warning = Warning::DuplicateEntry {
            referrer: Referrer::Action("b".to_string()),
            name: "a".to_string(),
        };
        assert_eq!(warning.to_string(), "action \"b\" needs \"a\" more than once");
    }
}
