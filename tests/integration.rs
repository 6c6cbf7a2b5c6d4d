use std::fs;

use actionflow::error::{Error, Referrer, ValidationError};
use actionflow::execution::{DryRunRunner, Engine};
use actionflow::workflow::{
    lint, load_workflow, parse_workflow, save_workflow, to_hcl, topological_order, validate,
};

/// Three Python versions, each with tests, lint and typing chained.
const MANIFEST: &str = r#"
workflow "Python 3.7" {
  on = "push"
  resolves = ["Python 3.7 - typing"]
}

action "Python 3.7 - tests" {
  uses = "home-assistant/actions/py37-tox@master"
  args = "-e py37"
}

action "Python 3.7 - lint" {
  uses = "home-assistant/actions/py37-tox@master"
  args = "-e lint"
  needs = ["Python 3.7 - tests"]
}

action "Python 3.7 - typing" {
  uses = "home-assistant/actions/py37-tox@master"
  args = "-e typing"
  needs = ["Python 3.7 - lint"]
}

workflow "Python 3.6" {
  on = "push"
  resolves = ["Python 3.6 - typing"]
}

action "Python 3.6 - tests" {
  uses = "home-assistant/actions/py36-tox@master"
  args = "-e py36"
}

action "Python 3.6 - lint" {
  uses = "home-assistant/actions/py36-tox@master"
  args = "-e lint"
  needs = ["Python 3.6 - tests"]
}

action "Python 3.6 - typing" {
  uses = "home-assistant/actions/py36-tox@master"
  args = "-e typing"
  needs = ["Python 3.6 - lint"]
}

workflow "Python 3.5" {
  on = "push"
  resolves = ["Python 3.5 - typing"]
}

action "Python 3.5 - tests" {
  uses = "home-assistant/actions/py35-tox@master"
  args = "-e py35"
}

action "Python 3.5 - lint" {
  uses = "home-assistant/actions/py35-tox@master"
  args = "-e lint"
  needs = ["Python 3.5 - tests"]
}

action "Python 3.5 - typing" {
  uses = "home-assistant/actions/py35-tox@master"
  args = "-e typing"
  needs = ["Python 3.5 - lint"]
}
"#;

fn names(actions: Vec<&actionflow::Action>) -> Vec<&str> {
    actions.into_iter().map(|a| a.name.as_str()).collect()
}

#[test]
fn test_manifest_loads_and_validates() {
    let graph = parse_workflow(MANIFEST).unwrap();
    assert_eq!(graph.workflows().len(), 3);
    assert_eq!(graph.len(), 9);
    assert!(validate(&graph).is_ok());
    assert!(lint(&graph).is_empty());
}

#[test]
fn test_each_workflow_orders_its_chain() {
    let graph = parse_workflow(MANIFEST).unwrap();

    for version in ["3.5", "3.6", "3.7"] {
        let closure = graph.closure(&format!("Python {}", version)).unwrap();
        let expected: Vec<String> = ["tests", "lint", "typing"]
            .iter()
            .map(|step| format!("Python {} - {}", version, step))
            .collect();
        assert_eq!(names(closure), expected);
    }
}

#[test]
fn test_full_order_respects_needs() {
    let graph = parse_workflow(MANIFEST).unwrap();
    let order: Vec<&str> = topological_order(&graph)
        .unwrap()
        .map(|a| a.name.as_str())
        .collect();

    assert_eq!(order.len(), 9);
    for action in graph.actions() {
        let at = order.iter().position(|n| *n == action.name).unwrap();
        for need in &action.needs {
            let need_at = order.iter().position(|n| *n == need.as_str()).unwrap();
            assert!(need_at < at);
        }
    }
}

#[test]
fn test_misspelled_goal_is_reported_with_suggestion() {
    let typo = MANIFEST.replacen(
        "resolves = [\"Python 3.5 - typing\"]",
        "resolves = [\"Pyton 3.5 - typing\"]",
        1,
    );
    let graph = parse_workflow(&typo).unwrap();

    let err = validate(&graph).unwrap_err();
    assert_eq!(
        err,
        ValidationError::UnknownReference {
            referrer: Referrer::Workflow("Python 3.5".to_string()),
            name: "Pyton 3.5 - typing".to_string(),
            suggestion: Some("Python 3.5 - typing".to_string()),
        }
    );
    assert!(err.to_string().contains("did you mean \"Python 3.5 - typing\""));
}

#[test]
fn test_cycle_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.workflow");
    let cyclic = MANIFEST.replacen(
        "args = \"-e py37\"",
        "args = \"-e py37\"\n  needs = [\"Python 3.7 - typing\"]",
        1,
    );
    fs::write(&path, cyclic).unwrap();

    match load_workflow(&path) {
        Err(Error::Validation(ValidationError::Cycle { path })) => {
            assert_eq!(path.first(), path.last());
            assert_eq!(path.len(), 4);
        }
        other => panic!("Expected a cycle error, got {:?}", other),
    }
}

#[test]
fn test_round_trip_through_every_format() {
    let graph = parse_workflow(MANIFEST).unwrap();
    let dir = tempfile::tempdir().unwrap();

    for file in ["main.workflow", "workflow.yaml", "workflow.json"] {
        let path = dir.path().join(file);
        save_workflow(&graph, &path).unwrap();
        let reloaded = load_workflow(&path).unwrap();
        assert_eq!(reloaded, graph, "round trip through {}", file);
    }

    assert_eq!(parse_workflow(&to_hcl(&graph)).unwrap(), graph);
}

#[test]
fn test_dry_run_of_one_workflow() {
    let graph = parse_workflow(MANIFEST).unwrap();
    let runner = DryRunRunner;
    let mut engine = Engine::new(&graph, &runner);
    engine.set_workflow("Python 3.6");
    engine.set_max_parallel(2);

    let summary = engine.run().unwrap();
    assert_eq!(
        summary.completed,
        vec!["Python 3.6 - tests", "Python 3.6 - lint", "Python 3.6 - typing"]
    );
    assert_eq!(summary.timeline.durations().len(), 3);
}
