//! Workflow Data Model
//!
//! Core data structures representing workflows, actions and the registry
//! that holds them.
//!
//! # Example Manifest
//!
//! ```text
//! workflow "Python 3.7" {
//!   on = "push"
//!   resolves = ["Python 3.7 - typing"]
//! }
//!
//! action "Python 3.7 - tests" {
//!   uses = "home-assistant/actions/py37-tox@master"
//!   args = "-e py37"
//! }
//!
//! action "Python 3.7 - lint" {
//!   uses = "home-assistant/actions/py37-tox@master"
//!   args = "-e lint"
//!   needs = ["Python 3.7 - tests"]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{BlockKind, ParseErrorKind};

/// Opaque value of a key the loader does not interpret.
///
/// Kept so a manifest can carry keys meant for the external runner
/// (`env`, `secrets`, `runs`, ...) through a load/save cycle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Value {
    String(String),
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

/// Invocation arguments handed to the external runner.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Args {
    /// A single command line, e.g. `"-e lint"`.
    Line(String),
    /// Pre-split arguments, e.g. `["-e", "lint"]`.
    List(Vec<String>),
}

impl Args {
    /// Returns the arguments as argv words.
    ///
    /// The line form is split on whitespace, honouring single quotes,
    /// double quotes and backslash escapes the way a POSIX shell would.
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            Self::Line(line) => split_words(line),
            Self::List(words) => words.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Line(line) => line.trim().is_empty(),
            Self::List(words) => words.is_empty(),
        }
    }
}

/// Splits a command line into words. An unterminated quote runs to the end
/// of the line.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for quoted in chars.by_ref() {
                    if quoted == '\'' {
                        break;
                    }
                    current.push(quoted);
                }
            }
            '"' => {
                in_word = true;
                while let Some(quoted) = chars.next() {
                    match quoted {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some(escaped @ ('"' | '\\' | '$' | '`')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => current.push('\\'),
                        },
                        _ => current.push(quoted),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            _ => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    words
}

/// Deserializes either a single string or array of strings into Vec<String>
fn single_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = JsonValue::deserialize(deserializer)?;
    match val {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::String(s) if s.is_empty() => Ok(Vec::new()),
        JsonValue::String(s) => Ok(vec![s]),
        JsonValue::Array(arr) => arr
            .into_iter()
            .map(|v| match v {
                JsonValue::String(s) => Ok(s),
                _ => Err(de::Error::custom("Expected string in array")),
            })
            .collect(),
        _ => Err(de::Error::custom("Expected string or array of strings")),
    }
}

/// A single named unit of work.
///
/// The action itself is opaque to this crate: `uses` names an externally
/// defined task and `args` is passed to it verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Unique action name
    pub name: String,

    /// Task reference (e.g. "docker://python:3.7" or "owner/repo/path@ref")
    pub uses: String,

    /// Arguments for the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Args>,

    /// Names of actions that must complete before this one runs
    #[serde(deserialize_with = "single_or_vec", default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,

    /// Keys passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Action {
    /// Creates a new action.
    ///
    /// # Example
    ///
    /// ```
    /// use actionflow::workflow::Action;
    ///
    /// let lint = Action::new("lint", "docker://python:3.7")
    ///     .with_args("-m flake8")
    ///     .depends_on("tests");
    /// assert_eq!(lint.needs, vec!["tests"]);
    /// ```
    pub fn new(name: impl Into<String>, uses: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uses: uses.into(),
            args: None,
            needs: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Sets a single-line argument string.
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(Args::Line(args.into()));
        self
    }

    /// Sets pre-split arguments.
    pub fn with_arg_list(mut self, args: Vec<String>) -> Self {
        self.args = Some(Args::List(args));
        self
    }

    /// Adds a prerequisite action.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.needs.push(name.into());
        self
    }

    /// Adds an opaque pass-through key.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Arguments as argv words (empty when no `args` is set).
    pub fn argv(&self) -> Vec<String> {
        self.args.as_ref().map(Args::to_argv).unwrap_or_default()
    }
}

/// A named trigger binding an event to a set of goal actions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    /// Unique workflow name
    pub name: String,

    /// Triggering event (e.g. "push")
    pub on: String,

    /// Goal actions
    #[serde(deserialize_with = "single_or_vec", default, skip_serializing_if = "Vec::is_empty")]
    pub resolves: Vec<String>,

    /// Keys passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on: on.into(),
            resolves: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Adds a goal action.
    pub fn resolves(mut self, name: impl Into<String>) -> Self {
        self.resolves.push(name.into());
        self
    }

    /// Adds an opaque pass-through key.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Serialized document shape used for the YAML and JSON formats.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GraphDocument {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workflows: Vec<Workflow>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

/// Immutable registry of every declared workflow and action.
///
/// Built once by the loader and then only read: the validator, the
/// topological order, the planner and the engine all borrow it.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct WorkflowGraph {
    workflows: Vec<Workflow>,
    actions: Vec<Action>,
    action_index: HashMap<String, usize>,
    workflow_index: HashMap<String, usize>,
}

impl WorkflowGraph {
    /// Builds a registry from declared blocks.
    ///
    /// Fails when two workflows or two actions share a name.
    pub fn new(workflows: Vec<Workflow>, actions: Vec<Action>) -> Result<Self, ParseErrorKind> {
        let mut builder = GraphBuilder::default();
        for workflow in workflows {
            builder.add_workflow(workflow)?;
        }
        for action in actions {
            builder.add_action(action)?;
        }
        Ok(builder.finish())
    }

    /// All workflows in declaration order.
    pub fn workflows(&self) -> &[Workflow] {
        &self.workflows
    }

    /// All actions in declaration order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.action_index.get(name).map(|&i| &self.actions[i])
    }

    pub fn workflow(&self, name: &str) -> Option<&Workflow> {
        self.workflow_index.get(name).map(|&i| &self.workflows[i])
    }

    pub fn contains_action(&self, name: &str) -> bool {
        self.action_index.contains_key(name)
    }

    /// Declaration index of an action.
    pub(crate) fn action_position(&self, name: &str) -> Option<usize> {
        self.action_index.get(name).copied()
    }

    /// Actions that list `name` in their `needs`.
    pub fn dependents(&self, name: &str) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.needs.iter().any(|n| n == name))
            .collect()
    }

    /// Actions with no prerequisites (entry points).
    pub fn roots(&self) -> Vec<&Action> {
        self.actions.iter().filter(|a| a.needs.is_empty()).collect()
    }

    /// Actions nothing else needs (exit points).
    pub fn leaves(&self) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| !self.actions.iter().any(|other| other.needs.contains(&a.name)))
            .collect()
    }

    /// Workflows triggered by `event`.
    pub fn workflows_on(&self, event: &str) -> Vec<&Workflow> {
        self.workflows.iter().filter(|w| w.on == event).collect()
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.workflows.is_empty()
    }
}

impl PartialEq for WorkflowGraph {
    fn eq(&self, other: &Self) -> bool {
        self.workflows == other.workflows && self.actions == other.actions
    }
}

impl Eq for WorkflowGraph {}

impl TryFrom<GraphDocument> for WorkflowGraph {
    type Error = ParseErrorKind;

    fn try_from(document: GraphDocument) -> Result<Self, Self::Error> {
        Self::new(document.workflows, document.actions)
    }
}

impl From<WorkflowGraph> for GraphDocument {
    fn from(graph: WorkflowGraph) -> Self {
        Self {
            workflows: graph.workflows,
            actions: graph.actions,
        }
    }
}

/// Incremental registry construction with duplicate-name detection.
#[derive(Debug, Default)]
pub(crate) struct GraphBuilder {
    workflows: Vec<Workflow>,
    actions: Vec<Action>,
    action_index: HashMap<String, usize>,
    workflow_index: HashMap<String, usize>,
}

/// Pass-through keys that would shadow a struct field when flattened.
fn check_extra(
    kind: BlockKind,
    name: &str,
    extra: &BTreeMap<String, Value>,
    fields: &[&str],
) -> Result<(), ParseErrorKind> {
    match fields.iter().find(|field| extra.contains_key(**field)) {
        Some(field) => Err(ParseErrorKind::ReservedKey {
            block: format!("{} \"{}\"", kind, name),
            key: field.to_string(),
        }),
        None => Ok(()),
    }
}

impl GraphBuilder {
    pub(crate) fn add_workflow(&mut self, workflow: Workflow) -> Result<(), ParseErrorKind> {
        check_extra(
            BlockKind::Workflow,
            &workflow.name,
            &workflow.extra,
            &["name", "on", "resolves"],
        )?;
        if self.workflow_index.contains_key(&workflow.name) {
            return Err(ParseErrorKind::DuplicateName {
                kind: BlockKind::Workflow,
                name: workflow.name,
            });
        }
        self.workflow_index
            .insert(workflow.name.clone(), self.workflows.len());
        self.workflows.push(workflow);
        Ok(())
    }

    pub(crate) fn add_action(&mut self, action: Action) -> Result<(), ParseErrorKind> {
        check_extra(
            BlockKind::Action,
            &action.name,
            &action.extra,
            &["name", "uses", "args", "needs"],
        )?;
        if self.action_index.contains_key(&action.name) {
            return Err(ParseErrorKind::DuplicateName {
                kind: BlockKind::Action,
                name: action.name,
            });
        }
        self.action_index.insert(action.name.clone(), self.actions.len());
        self.actions.push(action);
        Ok(())
    }

    pub(crate) fn finish(self) -> WorkflowGraph {
        WorkflowGraph {
            workflows: self.workflows,
            actions: self.actions,
            action_index: self.action_index,
            workflow_index: self.workflow_index,
        }
    }
}
