//! Human-in-the-loop coding agent orchestrator.
//!
//! Keeps one session under `.backbrief/session/` and drives it through
//! planning, execution and review, one fresh agent process per step.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use backbrief::core::reputation::UpdateAction;
use backbrief::exit_codes;
use backbrief::io::init::{InitOptions, ProjectPaths, init_project};
use backbrief::io::invoker::ClaudeInvoker;
use backbrief::io::memory_store::{ReputationStore, StoreKind, UpdateOutcome};
use backbrief::io::operator::TerminalOperator;
use backbrief::logging;
use backbrief::session::{SessionOutcome, Workspace, run_session, status_report};
use backbrief::start::{archive_current, delete_current};
use backbrief::validate::{ConfigOverrides, ProjectCheck, check_project};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "backbrief",
    version,
    about = "Plan, execute and review coding-agent sessions with a human in the loop"
)]
struct Cli {
    /// Project root containing `.backbrief/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Create `.backbrief/` with default config, rules and stores.
    Init {
        /// Overwrite scaffolding files. Memory and pattern stores are kept.
        #[arg(short, long)]
        force: bool,
    },
    /// Start or resume a session (default).
    Run(RunArgs),
    /// Print the current session's phase, cursor and tasks.
    Status,
    /// Move the current session into `.backbrief/archive/`.
    Archive,
    /// Delete the current session.
    Delete,
    /// Inspect or adjust the memory and pattern stores.
    #[command(subcommand)]
    Memory(MemoryCommand),
}

#[derive(Args, Debug, Default, PartialEq)]
struct RunArgs {
    /// Model identifier passed to the agent for this run.
    #[arg(long)]
    model: Option<String>,
    /// Spending ceiling passed to the agent for this run.
    #[arg(long)]
    max_budget_usd: Option<f64>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum MemoryCommand {
    /// Print active memories and patterns as agents see them.
    List,
    /// Raise a record's confidence.
    Reinforce(UpdateArgs),
    /// Lower a record's confidence and mark it challenged.
    Contradict(UpdateArgs),
    /// Retire a record. It stays on file.
    Deprecate(UpdateArgs),
}

#[derive(Args, Debug, PartialEq)]
struct UpdateArgs {
    /// Record id, e.g. `mem-003` or `pat-001`.
    id: String,
    /// Why, appended to the record's confidence reasoning.
    #[arg(long, default_value = "operator update")]
    reason: String,
    /// Target the pattern store instead of memories.
    #[arg(long)]
    pattern: bool,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.root.as_path();
    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Init { force } => cmd_init(root, force),
        Command::Run(args) => cmd_run(root, args),
        Command::Status => cmd_status(root),
        Command::Archive => {
            let paths = checked_paths(root)?;
            let target = archive_current(&paths)?;
            println!("archived to {}", target.display());
            Ok(exit_codes::OK)
        }
        Command::Delete => {
            let paths = checked_paths(root)?;
            delete_current(&paths)?;
            println!("session deleted");
            Ok(exit_codes::OK)
        }
        Command::Memory(MemoryCommand::List) => cmd_memory_list(root),
        Command::Memory(MemoryCommand::Reinforce(args)) => {
            cmd_memory_update(root, UpdateAction::Reinforce, &args)
        }
        Command::Memory(MemoryCommand::Contradict(args)) => {
            cmd_memory_update(root, UpdateAction::Contradict, &args)
        }
        Command::Memory(MemoryCommand::Deprecate(args)) => {
            cmd_memory_update(root, UpdateAction::Deprecate, &args)
        }
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_project(root, &InitOptions { force })?;
    println!("initialized {}", paths.data_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, args: RunArgs) -> Result<i32> {
    let overrides = ConfigOverrides {
        model: args.model,
        max_budget_usd: args.max_budget_usd,
    };
    let config = match check_project(root, &overrides) {
        ProjectCheck::Ready(config) => config,
        ProjectCheck::Invalid(problems) => {
            for problem in problems {
                eprintln!("{problem}");
            }
            return Ok(exit_codes::INVALID);
        }
    };

    let invoker = ClaudeInvoker::new(config.agent.clone());
    let mut operator = TerminalOperator::new(config.operator.show_max_lines);
    let ws = Workspace::open(root, config)?;
    let code = match run_session(ws, &invoker, &mut operator)? {
        SessionOutcome::Completed => exit_codes::OK,
        SessionOutcome::Aborted | SessionOutcome::Quit => exit_codes::ABORTED,
    };
    Ok(code)
}

fn cmd_status(root: &Path) -> Result<i32> {
    let paths = checked_paths(root)?;
    print!("{}", status_report(&paths)?);
    Ok(exit_codes::OK)
}

fn cmd_memory_list(root: &Path) -> Result<i32> {
    let paths = checked_paths(root)?;
    let store = ReputationStore::open(&paths);
    for warning in store.warnings() {
        eprintln!("warning: {warning}");
    }
    println!("## Memories\n\n{}\n", store.memories_block().trim_end());
    println!("## Patterns\n\n{}", store.patterns_block().trim_end());
    Ok(exit_codes::OK)
}

fn cmd_memory_update(root: &Path, action: UpdateAction, args: &UpdateArgs) -> Result<i32> {
    let paths = checked_paths(root)?;
    let kind = if args.pattern {
        StoreKind::Pattern
    } else {
        StoreKind::Memory
    };
    let mut store = ReputationStore::open(&paths);
    let now = Utc::now().to_rfc3339();
    match store.update(kind, &args.id, action, &args.reason, &now) {
        UpdateOutcome::Applied => {
            store.save(&now)?;
            println!("{} updated", args.id);
            Ok(exit_codes::OK)
        }
        UpdateOutcome::Ignored => {
            println!("{} is deprecated; left unchanged", args.id);
            Ok(exit_codes::OK)
        }
        UpdateOutcome::UnknownId => Err(anyhow!("no record with id {}", args.id)),
        UpdateOutcome::StoreUnavailable => {
            Err(anyhow!("store file is malformed; fix it before updating"))
        }
    }
}

/// Project paths for commands that need an initialized project.
fn checked_paths(root: &Path) -> Result<ProjectPaths> {
    let paths = ProjectPaths::new(root);
    if !paths.data_dir.is_dir() {
        return Err(anyhow!(
            "missing project directory {} (run `backbrief init`)",
            paths.data_dir.display()
        ));
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("parse")
    }

    #[test]
    fn bare_invocation_defaults_to_run() {
        let cli = parse(&["backbrief"]);
        assert_eq!(cli.command, None);
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn run_accepts_overrides() {
        let cli = parse(&[
            "backbrief",
            "run",
            "--model",
            "opus",
            "--max-budget-usd",
            "2.5",
        ]);
        assert_eq!(
            cli.command,
            Some(Command::Run(RunArgs {
                model: Some("opus".to_string()),
                max_budget_usd: Some(2.5),
            }))
        );
    }

    #[test]
    fn root_is_global() {
        let cli = parse(&["backbrief", "status", "--root", "/tmp/project"]);
        assert_eq!(cli.root, PathBuf::from("/tmp/project"));
        assert_eq!(cli.command, Some(Command::Status));
    }

    #[test]
    fn memory_update_parses_target_store() {
        let cli = parse(&[
            "backbrief",
            "memory",
            "contradict",
            "pat-002",
            "--pattern",
            "--reason",
            "stayed in scope",
        ]);
        assert_eq!(
            cli.command,
            Some(Command::Memory(MemoryCommand::Contradict(UpdateArgs {
                id: "pat-002".to_string(),
                reason: "stayed in scope".to_string(),
                pattern: true,
            })))
        );
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["backbrief", "select"]).is_err());
    }
}
