//! actionflow CLI Entry Point
//!
//! Provides the command-line interface for checking, converting and running
//! workflow manifests.
//!
//! # Usage
//!
//! ```bash
//! # Validate .github/main.workflow and print the order per workflow
//! actionflow
//!
//! # Restrict to one workflow
//! actionflow .github/main.workflow --workflow "Python 3.7"
//!
//! # Convert to YAML
//! actionflow --emit yaml > workflow.yaml
//!
//! # Preview dispatch without running anything
//! actionflow --dry-run
//!
//! # Run every action through a launcher, four at a time
//! actionflow --run --runner ./run-action.sh --parallel 4
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use colored::Colorize;
use log::{error, info, warn};

use actionflow::error::Error;
use actionflow::execution::{CommandRunner, DryRunRunner, Engine, RunSummary, TaskRunner};
use actionflow::workflow::{
    lint, load_workflow, serialize_with_format, topological_order, Action, Format, WorkflowGraph,
};
use actionflow::{APP_NAME, DEFAULT_MANIFEST, VERSION};

/// Environment variable naming the launcher program.
const RUNNER_ENV: &str = "ACTIONFLOW_RUNNER";

/// What the CLI should do after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Print the order per workflow
    Check,
    /// Print the graph in another format
    Emit(Format),
    /// Dispatch to the launcher
    Run,
    /// Dispatch to the dry-run runner
    DryRun,
}

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    manifest_path: PathBuf,
    workflow: Option<String>,
    mode: Mode,
    runner: Option<String>,
    working_dir: Option<PathBuf>,
    max_parallel: usize,
    keep_going: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from(DEFAULT_MANIFEST),
            workflow: None,
            mode: Mode::Check,
            runner: env::var(RUNNER_ENV).ok().filter(|v| !v.is_empty()),
            working_dir: None,
            max_parallel: num_cpus::get(),
            keep_going: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Action workflow dependency graphs");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: actionflow [OPTIONS] [WORKFLOW_FILE]");
    println!();
    println!("Arguments:");
    println!("  [WORKFLOW_FILE]     Manifest to load (default: {})", DEFAULT_MANIFEST);
    println!("                      .yml/.yaml and .json are read as documents");
    println!();
    println!("Options:");
    println!("  --workflow NAME     Only consider the actions NAME resolves to");
    println!("  --emit FORMAT       Print the normalized graph (hcl, yaml, json)");
    println!("  --run               Dispatch actions to the launcher program");
    println!("  --dry-run           Walk the graph without running anything");
    println!("  --runner PROGRAM    Launcher program for --run (env: {})", RUNNER_ENV);
    println!("  --parallel N        Maximum concurrent actions (default: CPU count)");
    println!("  --working-dir PATH  Working directory for the launcher");
    println!("  --keep-going        Keep running independent actions after a failure");
    println!("  --verbose, -v       Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  actionflow");
    println!("  actionflow .github/main.workflow --workflow \"Python 3.7\"");
    println!("  actionflow --emit yaml");
    println!("  actionflow --run --runner ./run-action.sh --parallel 4");
}

/// Returns the value following an option.
fn option_value<'a>(args: &'a [String], i: &mut usize, option: &str, what: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires {} argument", option, what))
}

fn set_mode(config: &mut Config, mode: Mode) -> Result<(), String> {
    if config.mode != Mode::Check && config.mode != mode {
        return Err("--emit, --run and --dry-run are mutually exclusive".to_string());
    }
    config.mode = mode;
    Ok(())
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_seen = false;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--run" => set_mode(&mut config, Mode::Run)?,
            "--dry-run" => set_mode(&mut config, Mode::DryRun)?,
            "--keep-going" => {
                config.keep_going = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--emit" => {
                let name = option_value(args, &mut i, "--emit", "a format")?;
                let format = Format::from_name(name)
                    .ok_or_else(|| format!("Unknown format: {} (expected hcl, yaml or json)", name))?;
                set_mode(&mut config, Mode::Emit(format))?;
            }
            "--workflow" => {
                config.workflow = Some(option_value(args, &mut i, "--workflow", "a name")?.to_string());
            }
            "--runner" => {
                config.runner = Some(option_value(args, &mut i, "--runner", "a program")?.to_string());
            }
            "--working-dir" => {
                let path = option_value(args, &mut i, "--working-dir", "a path")?;
                config.working_dir = Some(PathBuf::from(path));
            }
            "--parallel" => {
                let value = option_value(args, &mut i, "--parallel", "a number")?;
                config.max_parallel = match value.parse() {
                    Ok(n) if n > 0 => n,
                    _ => return Err(format!("Invalid parallel value: {}", value)),
                };
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if positional_seen {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.manifest_path = PathBuf::from(arg);
                positional_seen = true;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Checks the launcher working directory.
fn check_working_directory(dir: &Path) -> Result<(), Error> {
    if !dir.exists() {
        return Err(Error::Config(format!(
            "Working directory does not exist: {}",
            dir.display()
        )));
    }
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "Path is not a directory: {}",
            dir.display()
        )));
    }
    info!("Working directory: {}", dir.display());
    Ok(())
}

/// Actions in order for the selected workflow, or the whole graph.
fn planned_actions<'g>(
    graph: &'g WorkflowGraph,
    workflow: Option<&str>,
) -> Result<Vec<&'g Action>, Error> {
    let actions = match workflow {
        Some(name) => graph.closure(name)?,
        None => topological_order(graph)?.collect(),
    };
    Ok(actions)
}

fn print_action_line(index: usize, action: &Action) {
    let args = action.argv();
    if args.is_empty() {
        println!("  {:>2}. {}  {}", index + 1, action.name, action.uses.dimmed());
    } else {
        println!(
            "  {:>2}. {}  {} {}",
            index + 1,
            action.name,
            action.uses.dimmed(),
            args.join(" ").dimmed()
        );
    }
}

/// Prints the execution order for each workflow (or the one selected).
fn print_orders(graph: &WorkflowGraph, selected: Option<&str>) -> Result<(), Error> {
    if selected.is_none() && graph.workflows().is_empty() {
        println!("{}", "All actions:".bold());
        for (index, action) in planned_actions(graph, None)?.into_iter().enumerate() {
            print_action_line(index, action);
        }
        return Ok(());
    }

    let names: Vec<&str> = match selected {
        Some(name) => vec![name],
        None => graph.workflows().iter().map(|w| w.name.as_str()).collect(),
    };

    for name in names {
        let actions = planned_actions(graph, Some(name))?;
        let on = graph.workflow(name).map(|w| w.on.as_str()).unwrap_or_default();
        println!("{} {} (on {})", "Workflow".bold(), name.cyan(), on);
        for (index, action) in actions.into_iter().enumerate() {
            print_action_line(index, action);
        }
        println!();
    }
    Ok(())
}

/// Serializes the graph, narrowed to one workflow when selected.
fn emit(graph: &WorkflowGraph, workflow: Option<&str>, format: Format) -> Result<String, Error> {
    let Some(name) = workflow else {
        return serialize_with_format(graph, format);
    };

    let actions: Vec<Action> = planned_actions(graph, Some(name))?
        .into_iter()
        .cloned()
        .collect();
    let workflows = graph.workflow(name).cloned().into_iter().collect();
    let narrowed = WorkflowGraph::new(workflows, actions).map_err(|kind| Error::Config(kind.to_string()))?;
    serialize_with_format(&narrowed, format)
}

/// Prints the run results.
fn print_summary(summary: &RunSummary) {
    println!("{}", summary.timeline.chart());

    for name in &summary.completed {
        println!("  {} {}", "ok".green(), name);
    }
    for (name, message) in &summary.failed {
        println!("  {} {}: {}", "failed".red().bold(), name, message);
    }
    for name in &summary.skipped {
        println!("  {} {}", "skipped".yellow(), name);
    }

    println!();
    let status = if summary.is_success() {
        "Run completed successfully".green().bold()
    } else {
        "Run failed".red().bold()
    };
    println!("{} in {:.2?}", status, summary.duration);
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Emitted documents go to stdout untouched
    if !matches!(config.mode, Mode::Emit(_)) {
        print_banner();
    }

    let graph = load_workflow(&config.manifest_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        e
    })?;

    for warning in lint(&graph) {
        warn!("{}", warning);
    }

    let selected = config.workflow.as_deref();

    match config.mode {
        Mode::Check => {
            print_orders(&graph, selected)?;
        }
        Mode::Emit(format) => {
            print!("{}", emit(&graph, selected, format)?);
        }
        Mode::Run | Mode::DryRun => {
            let command_runner;
            let dry_runner = DryRunRunner;

            let runner: &dyn TaskRunner = if config.mode == Mode::DryRun {
                info!("Mode: DRY RUN (actions will not execute)");
                &dry_runner
            } else {
                let program = config.runner.clone().ok_or_else(|| {
                    Error::Config(format!(
                        "--run needs a launcher: pass --runner PROGRAM or set {}",
                        RUNNER_ENV
                    ))
                })?;
                let mut launcher = CommandRunner::new(program);
                if let Some(dir) = &config.working_dir {
                    check_working_directory(dir)?;
                    launcher = launcher.with_working_dir(dir);
                }
                command_runner = launcher;
                &command_runner
            };

            let mut engine = Engine::new(&graph, runner);
            engine.set_max_parallel(config.max_parallel);
            engine.set_fail_fast(!config.keep_going);
            if let Some(name) = selected {
                engine.set_workflow(name);
            }

            let summary = engine.execute()?;
            print_summary(&summary);
            summary.ensure_success()?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
