//! Manifest Writer
//!
//! Renders a graph back to block syntax. Output is canonical: workflows
//! first, then actions, each in declaration order; recognised keys in a
//! fixed order followed by pass-through keys sorted by name. Reloading the
//! output yields an identical graph.

use std::collections::BTreeMap;

use super::lexer::is_identifier;
use super::model::{Action, Args, Value, Workflow, WorkflowGraph};

const INDENT: &str = "  ";

/// Renders the whole graph as manifest text.
pub fn to_hcl(graph: &WorkflowGraph) -> String {
    let mut blocks = Vec::new();

    for workflow in graph.workflows() {
        blocks.push(render_workflow(workflow));
    }
    for action in graph.actions() {
        blocks.push(render_action(action));
    }

    blocks.join("\n")
}

fn render_workflow(workflow: &Workflow) -> String {
    let mut out = format!("workflow {} {{\n", quote(&workflow.name));
    write_entry(&mut out, 1, "on", &Value::String(workflow.on.clone()));
    if !workflow.resolves.is_empty() {
        write_entry(&mut out, 1, "resolves", &Value::List(workflow.resolves.clone()));
    }
    write_extra(&mut out, 1, &workflow.extra);
    out.push_str("}\n");
    out
}

fn render_action(action: &Action) -> String {
    let mut out = format!("action {} {{\n", quote(&action.name));
    write_entry(&mut out, 1, "uses", &Value::String(action.uses.clone()));
    match &action.args {
        Some(Args::Line(line)) => write_entry(&mut out, 1, "args", &Value::String(line.clone())),
        Some(Args::List(words)) => write_entry(&mut out, 1, "args", &Value::List(words.clone())),
        None => {}
    }
    if !action.needs.is_empty() {
        write_entry(&mut out, 1, "needs", &Value::List(action.needs.clone()));
    }
    write_extra(&mut out, 1, &action.extra);
    out.push_str("}\n");
    out
}

fn write_extra(out: &mut String, depth: usize, extra: &BTreeMap<String, Value>) {
    for (key, value) in extra {
        write_entry(out, depth, key, value);
    }
}

fn write_entry(out: &mut String, depth: usize, key: &str, value: &Value) {
    let indent = INDENT.repeat(depth);
    let key = if is_identifier(key) {
        key.to_string()
    } else {
        quote(key)
    };

    match value {
        Value::String(text) => {
            out.push_str(&format!("{}{} = {}\n", indent, key, quote(text)));
        }
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(|item| quote(item)).collect();
            out.push_str(&format!("{}{} = [{}]\n", indent, key, items.join(", ")));
        }
        Value::Map(entries) => {
            out.push_str(&format!("{}{} = {{\n", indent, key));
            write_extra(out, depth + 1, entries);
            out.push_str(&format!("{}}}\n", indent));
        }
    }
}

/// Double-quotes a string, escaping what the lexer would otherwise reject.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
