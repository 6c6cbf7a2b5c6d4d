//! Task Runners
//!
//! The engine hands each ready action to a [`TaskRunner`]. What an action
//! actually does is up to the runner; this crate only supplies the task
//! reference and argument list.

use std::path::PathBuf;
use std::process::Command;

use log::{debug, error, info};

use crate::error::RunnerError;
use crate::workflow::Action;

/// Maximum stderr characters kept in a failure.
const STDERR_TAIL: usize = 2000;

/// Everything a runner needs to execute one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInvocation {
    /// Action name
    pub name: String,
    /// Task reference from `uses`
    pub uses: String,
    /// Arguments as argv words
    pub args: Vec<String>,
}

impl TaskInvocation {
    pub fn from_action(action: &Action) -> Self {
        Self {
            name: action.name.clone(),
            uses: action.uses.clone(),
            args: action.argv(),
        }
    }
}

/// Executes a single action invocation.
///
/// Called from worker threads, one call per action.
pub trait TaskRunner: Send + Sync {
    fn run(&self, task: &TaskInvocation) -> Result<(), RunnerError>;
}

/// Runs each action as `<program> <uses> <args...>`.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    working_dir: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            working_dir: None,
        }
    }

    /// Sets the working directory for launched processes.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl TaskRunner for CommandRunner {
    fn run(&self, task: &TaskInvocation) -> Result<(), RunnerError> {
        let mut command = Command::new(&self.program);
        command.arg(&task.uses).args(&task.args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(
            "Action '{}': {} {} {}",
            task.name,
            self.program,
            task.uses,
            task.args.join(" ")
        );

        let output = command.output().map_err(|source| RunnerError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("Action '{}' output:\n{}", task.name, stdout);
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(
            "Action '{}' failed with exit code: {:?}",
            task.name,
            output.status.code()
        );
        if !stderr.trim().is_empty() {
            error!("stderr:\n{}", stderr);
        }

        Err(RunnerError::Exit {
            code: output.status.code(),
            stderr: tail(&stderr, STDERR_TAIL),
        })
    }
}

/// Keeps the last `limit` characters.
fn tail(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(limit)).collect()
}

/// Logs each invocation and reports success without running anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRunner;

impl TaskRunner for DryRunRunner {
    fn run(&self, task: &TaskInvocation) -> Result<(), RunnerError> {
        if task.args.is_empty() {
            info!("  [dry-run] {}: {}", task.name, task.uses);
        } else {
            info!(
                "  [dry-run] {}: {} {}",
                task.name,
                task.uses,
                task.args.join(" ")
            );
        }
        Ok(())
    }
}
