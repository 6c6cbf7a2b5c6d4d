//! Workflow Execution Engine
//!
//! Dispatches actions to a [`TaskRunner`] once their prerequisites have
//! completed:
//! - Parallel dispatch on scoped worker threads
//! - Completion reporting over a channel to a single scheduling loop
//! - Fail-fast or keep-going on failure
//! - Optional restriction to one workflow's actions

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::channel;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use super::runner::{TaskInvocation, TaskRunner};
use crate::error::{Error, Result, RunnerError};
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::{topological_order, Action, ActionStatus, ExecutionPlanner, WorkflowGraph};

/// Outcome of an engine run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Actions that finished successfully, in completion order
    pub completed: Vec<String>,
    /// Failed actions with their error messages, in plan order
    pub failed: Vec<(String, String)>,
    /// Actions that never started, in plan order
    pub skipped: Vec<String>,
    /// Wall time of the whole run
    pub duration: Duration,
    pub timeline: ExecutionTimeline,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Converts a run with failures into [`Error::ActionFailed`].
    pub fn ensure_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::ActionFailed {
                failed: self.failed.into_iter().map(|(name, _)| name).collect(),
            })
        }
    }
}

/// Workflow execution engine.
///
/// # Example
///
/// ```rust,no_run
/// use actionflow::execution::{CommandRunner, Engine};
/// use actionflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let graph = load_workflow(".github/main.workflow")?;
///     let runner = CommandRunner::new("act-runner");
///
///     let mut engine = Engine::new(&graph, &runner);
///     engine.set_max_parallel(4);
///     engine.set_workflow("Python 3.7");
///
///     engine.run()?;
///     Ok(())
/// }
/// ```
pub struct Engine<'a> {
    graph: &'a WorkflowGraph,
    runner: &'a dyn TaskRunner,
    max_parallel: usize,
    workflow: Option<String>,
    fail_fast: bool,
}

impl<'a> Engine<'a> {
    /// Creates an engine running every action of `graph`, one worker per
    /// CPU, stopping at the first failure.
    pub fn new(graph: &'a WorkflowGraph, runner: &'a dyn TaskRunner) -> Self {
        Self {
            graph,
            runner,
            max_parallel: num_cpus::get(),
            workflow: None,
            fail_fast: true,
        }
    }

    /// Sets the maximum number of actions running at once.
    pub fn set_max_parallel(&mut self, max: usize) {
        self.max_parallel = max.max(1);
    }

    /// Restricts the run to one workflow's closure.
    pub fn set_workflow(&mut self, name: impl Into<String>) {
        self.workflow = Some(name.into());
    }

    /// When enabled (the default), no new actions start after a failure.
    pub fn set_fail_fast(&mut self, fail_fast: bool) {
        self.fail_fast = fail_fast;
    }

    fn plan(&self) -> Result<Vec<&'a Action>> {
        let graph: &'a WorkflowGraph = self.graph;
        let plan = match &self.workflow {
            Some(name) => graph.closure(name)?,
            None => topological_order(graph)?.collect(),
        };
        Ok(plan)
    }

    /// Runs the planned actions and fails with [`Error::ActionFailed`] if
    /// any of them failed.
    pub fn run(&self) -> Result<RunSummary> {
        self.execute()?.ensure_success()
    }

    /// Runs the planned actions and reports what happened, failures
    /// included. Only planning errors (unknown workflow, invalid graph)
    /// are returned as `Err`.
    pub fn execute(&self) -> Result<RunSummary> {
        let start_time = Instant::now();
        let plan = self.plan()?;

        info!(
            "Starting execution of {} actions (max parallel: {}, fail fast: {})",
            plan.len(),
            self.max_parallel,
            self.fail_fast
        );

        let mut planner = ExecutionPlanner::new(plan, self.max_parallel);
        let mut timeline = ExecutionTimeline::new();
        let mut completed = Vec::new();
        let runner = self.runner;

        thread::scope(|scope| {
            let (tx, rx) = channel::<(String, std::result::Result<(), RunnerError>)>();
            let mut stopped = false;

            loop {
                if !stopped {
                    for action in planner.ready_actions() {
                        info!("Starting action: {}", action.name);
                        timeline.add_event(action.name.as_str(), EventType::Started);
                        planner.mark_running(&action.name);

                        let tx = tx.clone();
                        let task = TaskInvocation::from_action(action);
                        scope.spawn(move || {
                            let result = panic::catch_unwind(AssertUnwindSafe(|| runner.run(&task)))
                                .unwrap_or_else(|payload| {
                                    Err(RunnerError::Panicked(panic_message(payload)))
                                });
                            if let Err(e) = tx.send((task.name, result)) {
                                error!("Failed to send completion signal: {}", e);
                            }
                        });
                    }
                }

                if planner.running_count() == 0 {
                    if planner.has_work_remaining() {
                        // Nothing running and nothing ready: the rest can never start
                        let skipped = planner.skip_pending();
                        warn!("Unreachable actions skipped: {}", skipped.join(", "));
                    }
                    break;
                }

                let Ok((name, result)) = rx.recv() else {
                    break;
                };

                match result {
                    Ok(()) => {
                        info!("Action '{}' completed successfully", name);
                        planner.mark_completed(&name);
                        timeline.add_event(name.as_str(), EventType::Completed);
                        completed.push(name);
                    }
                    Err(e) => {
                        error!("Action '{}' failed: {}", name, e);
                        planner.mark_failed(&name, e.to_string());
                        timeline.add_event(name.as_str(), EventType::Failed);

                        if self.fail_fast && !stopped {
                            stopped = true;
                            let skipped = planner.skip_pending();
                            if !skipped.is_empty() {
                                warn!(
                                    "Stopping after failure; {} action(s) will not start",
                                    skipped.len()
                                );
                            }
                        }
                    }
                }
            }
        });

        let failed = planner
            .names_with(|s| matches!(s, ActionStatus::Failed(_)))
            .into_iter()
            .map(|name| {
                let message = match planner.metrics().get(&name).map(|m| &m.status) {
                    Some(ActionStatus::Failed(message)) => message.clone(),
                    _ => String::new(),
                };
                (name, message)
            })
            .collect();
        let skipped = planner.names_with(|s| *s == ActionStatus::Skipped);

        let summary = RunSummary {
            completed,
            failed,
            skipped,
            duration: start_time.elapsed(),
            timeline,
        };

        info!(
            "Execution finished in {:.2?}: {} completed, {} failed, {} skipped",
            summary.duration,
            summary.completed.len(),
            summary.failed.len(),
            summary.skipped.len()
        );

        Ok(summary)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::execution::runner::DryRunRunner;
    use crate::workflow::Workflow;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records invocation order and fails the named actions.
    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        failing: HashSet<String>,
    }

    impl RecordingRunner {
        fn failing(names: &[&str]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing: names.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TaskRunner for RecordingRunner {
        fn run(&self, task: &TaskInvocation) -> std::result::Result<(), RunnerError> {
            self.calls.lock().unwrap().push(task.name.clone());
            if self.failing.contains(&task.name) {
                Err(RunnerError::Exit {
                    code: Some(1),
                    stderr: format!("{} broke", task.name),
                })
            } else {
                Ok(())
            }
        }
    }

    fn python_graph() -> WorkflowGraph {
        WorkflowGraph::new(
            vec![
                Workflow::new("Python 3.6", "push").resolves("py36 - typing"),
                Workflow::new("Python 3.7", "push").resolves("py37 - lint"),
            ],
            vec![
                Action::new("py36 - tests", "tox").with_args("-e py36"),
                Action::new("py36 - typing", "tox")
                    .with_args("-e typing")
                    .depends_on("py36 - tests"),
                Action::new("py37 - tests", "tox").with_args("-e py37"),
                Action::new("py37 - lint", "tox")
                    .with_args("-e lint")
                    .depends_on("py37 - tests"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_engine_defaults() {
        let graph = python_graph();
        let runner = DryRunRunner;
        let engine = Engine::new(&graph, &runner);

        assert_eq!(engine.max_parallel, num_cpus::get());
        assert!(engine.fail_fast);
        assert!(engine.workflow.is_none());
    }

    #[test]
    fn test_engine_configuration() {
        let graph = python_graph();
        let runner = DryRunRunner;
        let mut engine = Engine::new(&graph, &runner);

        engine.set_max_parallel(0);
        engine.set_fail_fast(false);
        engine.set_workflow("Python 3.7");

        assert_eq!(engine.max_parallel, 1);
        assert!(!engine.fail_fast);
        assert_eq!(engine.workflow.as_deref(), Some("Python 3.7"));
    }

    #[test]
    fn test_dry_run_execution() {
        let graph = python_graph();
        let runner = DryRunRunner;
        let engine = Engine::new(&graph, &runner);

        let summary = engine.run().unwrap();
        assert_eq!(summary.completed.len(), 4);
        assert!(summary.skipped.is_empty());
        assert_eq!(summary.timeline.events().len(), 8);
    }

    #[test]
    fn test_serial_run_follows_topological_order() {
        let graph = python_graph();
        let runner = RecordingRunner::default();
        let mut engine = Engine::new(&graph, &runner);
        engine.set_max_parallel(1);

        let summary = engine.run().unwrap();
        let expected = vec!["py36 - tests", "py36 - typing", "py37 - tests", "py37 - lint"];
        assert_eq!(runner.calls(), expected);
        assert_eq!(summary.completed, expected);
    }

    #[test]
    fn test_parallel_run_respects_needs() {
        let graph = python_graph();
        let runner = RecordingRunner::default();
        let mut engine = Engine::new(&graph, &runner);
        engine.set_max_parallel(4);

        let summary = engine.run().unwrap();
        let position = |name: &str| summary.completed.iter().position(|n| n == name).unwrap();
        assert!(position("py36 - tests") < position("py36 - typing"));
        assert!(position("py37 - tests") < position("py37 - lint"));
    }

    #[test]
    fn test_workflow_selection_runs_closure_only() {
        let graph = python_graph();
        let runner = RecordingRunner::default();
        let mut engine = Engine::new(&graph, &runner);
        engine.set_workflow("Python 3.7");

        engine.run().unwrap();
        assert_eq!(runner.calls(), vec!["py37 - tests", "py37 - lint"]);
    }

    #[test]
    fn test_unknown_workflow_is_an_error() {
        let graph = python_graph();
        let runner = DryRunRunner;
        let mut engine = Engine::new(&graph, &runner);
        engine.set_workflow("Python 2.7");

        assert!(matches!(
            engine.run(),
            Err(Error::Validation(ValidationError::UnknownWorkflow(_)))
        ));
    }

    #[test]
    fn test_fail_fast_stops_dispatch() {
        let graph = python_graph();
        let runner = RecordingRunner::failing(&["py36 - tests"]);
        let mut engine = Engine::new(&graph, &runner);
        engine.set_max_parallel(1);

        let summary = engine.execute().unwrap();
        assert_eq!(runner.calls(), vec!["py36 - tests"]);
        assert_eq!(
            summary.failed,
            vec![("py36 - tests".to_string(), "Task exited with status 1: py36 - tests broke".to_string())]
        );
        assert_eq!(
            summary.skipped,
            vec!["py36 - typing", "py37 - tests", "py37 - lint"]
        );

        match summary.ensure_success() {
            Err(Error::ActionFailed { failed }) => assert_eq!(failed, vec!["py36 - tests"]),
            other => panic!("Expected ActionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_keep_going_runs_independent_actions() {
        let graph = python_graph();
        let runner = RecordingRunner::failing(&["py36 - tests"]);
        let mut engine = Engine::new(&graph, &runner);
        engine.set_max_parallel(1);
        engine.set_fail_fast(false);

        let summary = engine.execute().unwrap();
        assert_eq!(summary.completed, vec!["py37 - tests", "py37 - lint"]);
        assert_eq!(summary.skipped, vec!["py36 - typing"]);
        assert!(!summary.is_success());
        assert!(engine.run().is_err());
    }

    #[test]
    fn test_invalid_graph_is_rejected_before_running() {
        let graph = WorkflowGraph::new(
            vec![],
            vec![
                Action::new("a", "x").depends_on("b"),
                Action::new("b", "x").depends_on("a"),
            ],
        )
        .unwrap();
        let runner = RecordingRunner::default();
        let engine = Engine::new(&graph, &runner);

        assert!(matches!(
            engine.run(),
            Err(Error::Validation(ValidationError::Cycle { .. }))
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_parallel_limit_is_respected() {
        struct CountingRunner {
            current: AtomicUsize,
            peak: AtomicUsize,
        }

        impl TaskRunner for CountingRunner {
            fn run(&self, _task: &TaskInvocation) -> std::result::Result<(), RunnerError> {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let actions = (0..6).map(|i| Action::new(format!("a{}", i), "x")).collect();
        let graph = WorkflowGraph::new(vec![], actions).unwrap();
        let runner = CountingRunner {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let mut engine = Engine::new(&graph, &runner);
        engine.set_max_parallel(2);

        let summary = engine.run().unwrap();
        assert_eq!(summary.completed.len(), 6);
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_panicking_runner_marks_action_failed() {
        struct PanickingRunner;

        impl TaskRunner for PanickingRunner {
            fn run(&self, task: &TaskInvocation) -> std::result::Result<(), RunnerError> {
                if task.name == "py36 - tests" {
                    panic!("launcher crashed");
                }
                Ok(())
            }
        }

        let graph = python_graph();
        let runner = PanickingRunner;
        let mut engine = Engine::new(&graph, &runner);
        engine.set_fail_fast(false);

        let summary = engine.execute().unwrap();
        assert_eq!(
            summary.failed,
            vec![("py36 - tests".to_string(), "Runner panicked: launcher crashed".to_string())]
        );
        assert_eq!(summary.skipped, vec!["py36 - typing"]);
        assert_eq!(summary.completed.len(), 2);
    }

    #[test]
    fn test_empty_graph_runs_nothing() {
        let graph = WorkflowGraph::default();
        let runner = DryRunRunner;
        let summary = Engine::new(&graph, &runner).run().unwrap();
        assert!(summary.completed.is_empty());
        assert!(summary.is_success());
    }
}
