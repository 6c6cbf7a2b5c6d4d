//! Workflow Parser
//!
//! Handles loading manifests from text or files. The block syntax is parsed
//! by hand from the lexer's token stream; the YAML and JSON document forms
//! go through serde.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};

use super::lexer::{tokenize, Spanned, Token};
use super::model::{Action, Args, GraphBuilder, Value, Workflow, WorkflowGraph};
use super::validator::validate;
use super::writer::to_hcl;
use crate::error::{BlockKind, Error, ParseError, ParseErrorKind, Result};

/// On-disk representation of a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `workflow "..." { ... }` block syntax
    Hcl,
    Yaml,
    Json,
}

impl Format {
    /// Picks the format from a file extension; anything unrecognised is
    /// treated as block syntax.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yml") | Some("yaml") => Self::Yaml,
            Some("json") => Self::Json,
            _ => Self::Hcl,
        }
    }

    /// Parses a format name as accepted on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hcl" | "workflow" => Some(Self::Hcl),
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parses manifest text in block syntax into a workflow graph.
///
/// Only structure is checked here; references and cycles are the
/// validator's job.
///
/// # Example
///
/// ```
/// use actionflow::workflow::parse_workflow;
///
/// let graph = parse_workflow(r#"
/// workflow "ci" {
///   on = "push"
///   resolves = ["lint"]
/// }
///
/// action "lint" {
///   uses = "docker://python:3.7"
///   args = "-m flake8"
/// }
/// "#).unwrap();
///
/// assert_eq!(graph.workflows().len(), 1);
/// assert_eq!(graph.action("lint").unwrap().uses, "docker://python:3.7");
/// ```
pub fn parse_workflow(source: &str) -> std::result::Result<WorkflowGraph, ParseError> {
    let tokens = tokenize(source)?;
    debug!("Tokenized manifest ({} tokens)", tokens.len());
    Parser::new(tokens).parse()
}

/// Parses text in the given format.
pub fn parse_with_format(source: &str, format: Format) -> Result<WorkflowGraph> {
    let graph = match format {
        Format::Hcl => parse_workflow(source)?,
        Format::Yaml => serde_yaml::from_str(source)?,
        Format::Json => serde_json::from_str(source)?,
    };
    Ok(graph)
}

/// Serializes a graph in the given format.
pub fn serialize_with_format(graph: &WorkflowGraph, format: Format) -> Result<String> {
    let text = match format {
        Format::Hcl => to_hcl(graph),
        Format::Yaml => serde_yaml::to_string(graph)?,
        Format::Json => serde_json::to_string_pretty(graph)?,
    };
    Ok(text)
}

/// Loads and validates a workflow graph from a file.
///
/// This function:
/// 1. Reads the file
/// 2. Parses it in the format implied by the extension
/// 3. Validates references and acyclicity
///
/// # Example
///
/// ```rust,no_run
/// use actionflow::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let graph = load_workflow(".github/main.workflow")?;
///     println!("Loaded {} actions", graph.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: impl AsRef<Path>) -> Result<WorkflowGraph> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    debug!("Manifest content loaded ({} bytes)", content.len());

    let graph = parse_with_format(&content, Format::from_path(path))?;

    info!(
        "Parsed {} workflows, {} actions",
        graph.workflows().len(),
        graph.actions().len()
    );

    validate(&graph)?;
    Ok(graph)
}

/// Saves a workflow graph in the format implied by the file extension.
pub fn save_workflow(graph: &WorkflowGraph, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let text = serialize_with_format(graph, Format::from_path(path))?;
    fs::write(path, text).map_err(|e| Error::io(path, e))?;
    info!("Workflow saved to: {}", path.display());
    Ok(())
}

/// Deepest `{ ... }` nesting accepted inside a block.
const MAX_NESTING: usize = 32;

/// Block keys that would collide with a field of the same name.
const RESERVED_KEYS: &[&str] = &["name"];

/// Recursive-descent parser over the token stream.
struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Current map nesting below the block body
    depth: usize,
}

/// Raw `key = value` entries of one block, in source order.
type Entries = Vec<(Spanned, RawValue)>;

/// A value before it is checked against what its key expects.
#[derive(Debug, Clone)]
enum RawValue {
    String(String),
    List(Vec<String>),
    Map(Entries),
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Spanned {
        // The lexer always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Spanned {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        unexpected_token(self.peek(), expected)
    }

    fn expect(&mut self, token: Token, expected: &str) -> std::result::Result<Spanned, ParseError> {
        if self.peek().token == token {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek().token == Token::Newline {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.peek().token,
            Token::Newline | Token::Semicolon | Token::Comma
        ) {
            self.advance();
        }
    }

    fn parse(mut self) -> std::result::Result<WorkflowGraph, ParseError> {
        let mut builder = GraphBuilder::default();

        loop {
            self.skip_newlines();
            let keyword = self.advance();
            let kind = match &keyword.token {
                Token::Eof => break,
                Token::Ident(word) if word == "workflow" => BlockKind::Workflow,
                Token::Ident(word) if word == "action" => BlockKind::Action,
                Token::Ident(word) => {
                    return Err(ParseError::new(
                        keyword.line,
                        keyword.column,
                        ParseErrorKind::UnknownBlock(word.clone()),
                    ))
                }
                _ => return Err(unexpected_token(&keyword, "'workflow' or 'action'")),
            };

            let name_token = self.advance();
            let name = match &name_token.token {
                Token::Str(name) => name.clone(),
                _ => {
                    return Err(unexpected_token(
                        &name_token,
                        &format!("quoted {} name", kind),
                    ))
                }
            };

            self.expect(Token::LBrace, "'{'")?;
            let entries = self.parse_body(&format!("{} \"{}\"", kind, name))?;

            let result = match kind {
                BlockKind::Workflow => {
                    let workflow = build_workflow(&keyword, name, entries)?;
                    debug!("Parsed workflow '{}'", workflow.name);
                    builder.add_workflow(workflow)
                }
                BlockKind::Action => {
                    let action = build_action(&keyword, name, entries)?;
                    debug!("Parsed action '{}'", action.name);
                    builder.add_action(action)
                }
            };
            result.map_err(|kind| ParseError::new(name_token.line, name_token.column, kind))?;
        }

        Ok(builder.finish())
    }

    /// Parses `key = value` entries up to and including the closing brace.
    fn parse_body(&mut self, block: &str) -> std::result::Result<Entries, ParseError> {
        let mut entries: Entries = Vec::new();

        loop {
            self.skip_separators();
            if self.peek().token == Token::RBrace {
                self.advance();
                return Ok(entries);
            }

            let key = self.advance();
            let key_name = match &key.token {
                Token::Ident(word) | Token::Str(word) => word.clone(),
                _ => return Err(unexpected_token(&key, "key or '}'")),
            };

            if self.depth == 0 && RESERVED_KEYS.contains(&key_name.as_str()) {
                return Err(ParseError::new(
                    key.line,
                    key.column,
                    ParseErrorKind::ReservedKey {
                        block: block.to_string(),
                        key: key_name,
                    },
                ));
            }

            if entries.iter().any(|(k, _)| key_text(k) == key_name) {
                return Err(ParseError::new(
                    key.line,
                    key.column,
                    ParseErrorKind::DuplicateKey {
                        block: block.to_string(),
                        key: key_name,
                    },
                ));
            }

            self.expect(Token::Equals, "'='")?;
            let value = self.parse_value(block)?;
            entries.push((key, value));

            match self.peek().token {
                Token::Newline | Token::Semicolon | Token::Comma | Token::RBrace => {}
                _ => return Err(self.unexpected("end of line, ';' or '}'")),
            }
        }
    }

    fn parse_value(&mut self, block: &str) -> std::result::Result<RawValue, ParseError> {
        let start = self.advance();
        match &start.token {
            Token::Str(text) => Ok(RawValue::String(text.clone())),
            Token::LBracket => self.parse_list().map(RawValue::List),
            Token::LBrace => {
                if self.depth >= MAX_NESTING {
                    return Err(ParseError::new(
                        start.line,
                        start.column,
                        ParseErrorKind::NestingTooDeep(MAX_NESTING),
                    ));
                }
                self.depth += 1;
                let body = self.parse_body(block);
                self.depth -= 1;
                body.map(RawValue::Map)
            }
            _ => Err(unexpected_token(&start, "string, '[' or '{'")),
        }
    }

    /// Parses list items after the opening bracket. Newlines are free-form
    /// inside a list and a trailing comma is allowed.
    fn parse_list(&mut self) -> std::result::Result<Vec<String>, ParseError> {
        let mut items = Vec::new();

        loop {
            self.skip_newlines();
            let token = self.advance();
            match &token.token {
                Token::RBracket => return Ok(items),
                Token::Str(text) => items.push(text.clone()),
                _ => return Err(unexpected_token(&token, "string or ']'")),
            }

            self.skip_newlines();
            match self.peek().token {
                Token::Comma => {
                    self.advance();
                }
                Token::RBracket => {}
                _ => return Err(self.unexpected("',' or ']'")),
            }
        }
    }
}

fn unexpected_token(current: &Spanned, expected: &str) -> ParseError {
    let kind = match &current.token {
        Token::Eof => ParseErrorKind::UnexpectedEof(expected.to_string()),
        found => ParseErrorKind::UnexpectedToken {
            expected: expected.to_string(),
            found: found.to_string(),
        },
    };
    ParseError::new(current.line, current.column, kind)
}

fn key_text(key: &Spanned) -> &str {
    match &key.token {
        Token::Ident(word) | Token::Str(word) => word,
        _ => "",
    }
}

fn invalid_value(key: &Spanned, expected: &str) -> ParseError {
    ParseError::new(
        key.line,
        key.column,
        ParseErrorKind::InvalidValue {
            key: key_text(key).to_string(),
            expected: expected.to_string(),
        },
    )
}

fn expect_string(key: &Spanned, value: RawValue) -> std::result::Result<String, ParseError> {
    match value {
        RawValue::String(text) => Ok(text),
        _ => Err(invalid_value(key, "a string")),
    }
}

/// `needs` and `resolves` take either one name or a list of names.
fn expect_names(key: &Spanned, value: RawValue) -> std::result::Result<Vec<String>, ParseError> {
    match value {
        RawValue::String(text) if text.is_empty() => Ok(Vec::new()),
        RawValue::String(text) => Ok(vec![text]),
        RawValue::List(items) => Ok(items),
        RawValue::Map(_) => Err(invalid_value(key, "a string or a list of strings")),
    }
}

fn into_value(value: RawValue) -> Value {
    match value {
        RawValue::String(text) => Value::String(text),
        RawValue::List(items) => Value::List(items),
        RawValue::Map(entries) => Value::Map(into_map(entries)),
    }
}

fn into_map(entries: Entries) -> BTreeMap<String, Value> {
    entries
        .into_iter()
        .map(|(key, value)| (key_text(&key).to_string(), into_value(value)))
        .collect()
}

fn missing_key(keyword: &Spanned, kind: BlockKind, name: &str, key: &str) -> ParseError {
    ParseError::new(
        keyword.line,
        keyword.column,
        ParseErrorKind::MissingKey {
            kind,
            name: name.to_string(),
            key: key.to_string(),
        },
    )
}

fn build_workflow(
    keyword: &Spanned,
    name: String,
    entries: Entries,
) -> std::result::Result<Workflow, ParseError> {
    let mut on = None;
    let mut workflow = Workflow::new(name, "");

    for (key, value) in entries {
        match key_text(&key) {
            "on" => on = Some(expect_string(&key, value)?),
            "resolves" => workflow.resolves = expect_names(&key, value)?,
            other => {
                debug!("Workflow '{}': passing through key '{}'", workflow.name, other);
                workflow.extra.insert(other.to_string(), into_value(value));
            }
        }
    }

    workflow.on = on.ok_or_else(|| missing_key(keyword, BlockKind::Workflow, &workflow.name, "on"))?;
    Ok(workflow)
}

fn build_action(
    keyword: &Spanned,
    name: String,
    entries: Entries,
) -> std::result::Result<Action, ParseError> {
    let mut uses = None;
    let mut action = Action::new(name, "");

    for (key, value) in entries {
        match key_text(&key) {
            "uses" => uses = Some(expect_string(&key, value)?),
            "args" => {
                action.args = Some(match value {
                    RawValue::String(text) => Args::Line(text),
                    RawValue::List(items) => Args::List(items),
                    RawValue::Map(_) => {
                        return Err(invalid_value(&key, "a string or a list of strings"))
                    }
                })
            }
            "needs" => action.needs = expect_names(&key, value)?,
            other => {
                debug!("Action '{}': passing through key '{}'", action.name, other);
                action.extra.insert(other.to_string(), into_value(value));
            }
        }
    }

    action.uses = uses.ok_or_else(|| missing_key(keyword, BlockKind::Action, &action.name, "uses"))?;
    Ok(action)
}
