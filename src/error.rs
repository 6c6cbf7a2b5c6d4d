//! Error Types
//!
//! Every fallible operation in the crate reports one of the errors below.
//! Load and validation failures are surfaced to the caller immediately;
//! nothing is retried internally.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read or write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid YAML workflow document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON workflow document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Workflow run failed: {}", .failed.join(", "))]
    ActionFailed { failed: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A malformed manifest, with the 1-based position where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at line {line}, column {column}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, column: usize, kind: ParseErrorKind) -> Self {
        Self { line, column, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("unterminated string")]
    UnterminatedString,

    #[error("unterminated block comment")]
    UnterminatedComment,

    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("unexpected end of input, expected {0}")]
    UnexpectedEof(String),

    #[error("unknown block kind '{0}' (expected 'workflow' or 'action')")]
    UnknownBlock(String),

    #[error("key '{key}' is set twice in {block}")]
    DuplicateKey { block: String, key: String },

    #[error("{kind} \"{name}\" is declared more than once")]
    DuplicateName { kind: BlockKind, name: String },

    #[error("key '{key}' is reserved in {block}")]
    ReservedKey { block: String, key: String },

    #[error("values nested more than {0} levels deep")]
    NestingTooDeep(usize),

    #[error("key '{key}' expects {expected}")]
    InvalidValue { key: String, expected: String },

    #[error("{kind} \"{name}\" is missing required key '{key}'")]
    MissingKey {
        kind: BlockKind,
        name: String,
        key: String,
    },
}

/// The two kinds of top-level block a manifest may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Workflow,
    Action,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workflow => write!(f, "workflow"),
            Self::Action => write!(f, "action"),
        }
    }
}

/// Who holds a dangling reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Referrer {
    /// A workflow's `resolves` list.
    Workflow(String),
    /// An action's `needs` list.
    Action(String),
}

impl fmt::Display for Referrer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workflow(name) => write!(f, "workflow \"{}\" resolves", name),
            Self::Action(name) => write!(f, "action \"{}\" needs", name),
        }
    }
}

/// Graph invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{referrer} unknown action \"{name}\"{}", suggestion_hint(.suggestion))]
    UnknownReference {
        referrer: Referrer,
        name: String,
        suggestion: Option<String>,
    },

    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Unknown workflow \"{0}\"")]
    UnknownWorkflow(String),
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean \"{}\"?)", name),
        None => String::new(),
    }
}

/// Failure reported by a task runner for a single action.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Task exited with {}{}", exit_label(.code), stderr_tail(.stderr))]
    Exit { code: Option<i32>, stderr: String },

    #[error("Runner panicked: {0}")]
    Panicked(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}
