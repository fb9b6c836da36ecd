//! Phase driver for one session.
//!
//! A session moves `planning → execution → review → complete`. The driver
//! dispatches to the phase modules, persists every transition and stops when
//! the session completes or the operator aborts. All continuity between agent
//! calls goes through files in the session directory.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::phase::{PhaseEvent, next_phase, outcome_counts};
use crate::core::types::{Phase, Session};
use crate::execution::run_execution;
use crate::io::config::BackbriefConfig;
use crate::io::init::{FrameworkPaths, ProjectPaths};
use crate::io::invoker::{AgentInvoker, InvokeRequest, Invocation, invoke_for_artifact};
use crate::io::memory_store::ReputationStore;
use crate::io::operator::Operator;
use crate::io::prompt::{OutputLocation, PhaseMaterial, ProjectDocs, PromptAssembler, PromptRole};
use crate::io::read_non_empty;
use crate::io::session_store::{SessionPaths, load_session, load_tasks, write_session};
use crate::planning::run_planning;
use crate::review::run_review;
use crate::start::{StartChoice, start_session};

/// Everything a session needs that does not change while it runs.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub paths: ProjectPaths,
    pub framework: FrameworkPaths,
    pub session: SessionPaths,
    pub config: BackbriefConfig,
    pub docs: ProjectDocs,
    pub assembler: PromptAssembler,
}

impl Workspace {
    /// Resolve paths and load rule documents. Call after the project check.
    pub fn open(root: &Path, config: BackbriefConfig) -> Result<Self> {
        let paths = ProjectPaths::new(root);
        let framework = FrameworkPaths::resolve(&paths, &config);
        let docs = ProjectDocs::load(&paths, &framework)?;
        let session = SessionPaths::new(&paths.session_dir);
        let assembler = PromptAssembler::new(config.prompt.budget_bytes);
        Ok(Self {
            paths,
            framework,
            session,
            config,
            docs,
            assembler,
        })
    }
}

/// How a phase handed control back to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Advanced,
    Aborted,
}

/// How a whole `run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Aborted,
    /// The operator quit at startup without starting or resuming.
    Quit,
}

/// A live session: workspace, store, collaborators and the session record.
pub struct SessionRun<'a, I: AgentInvoker, O: Operator> {
    pub ws: Workspace,
    pub store: ReputationStore,
    pub invoker: &'a I,
    pub operator: &'a mut O,
    pub state: Session,
}

impl<I: AgentInvoker, O: Operator> SessionRun<'_, I, O> {
    /// Assemble the role prompt, run the agent once and collect its output.
    ///
    /// The store is reloaded afterwards because the agent may have edited
    /// it.
    pub fn invoke(
        &mut self,
        role: PromptRole,
        label: &str,
        material: &PhaseMaterial,
        output: &OutputLocation,
    ) -> Result<Invocation> {
        let prompt = self
            .ws
            .assembler
            .build(role, &self.ws.docs, &self.store, material, output)?;
        let request = InvokeRequest {
            label: label.to_string(),
            workdir: self.ws.paths.root.clone(),
            add_dirs: vec![
                self.ws.framework.dir.clone(),
                self.ws.paths.data_dir.clone(),
                self.ws.session.dir.clone(),
            ],
            prompt: prompt.as_str().to_string(),
            output_path: output.path.clone(),
            log_path: self.ws.session.log_path(label),
        };
        let invocation = invoke_for_artifact(self.invoker, &request)?;
        self.store.reload();
        Ok(invocation)
    }

    /// Read a session document, treating blank files as absent.
    pub fn read_doc(&self, path: &Path) -> Result<Option<String>> {
        read_non_empty(path)
    }

    pub fn persist(&mut self) -> Result<()> {
        self.state.touch(Utc::now());
        write_session(&self.ws.session.state_path, &self.state)
    }

    /// Fire `event`, move to the next phase and persist.
    pub fn advance(&mut self, event: PhaseEvent) -> Result<()> {
        let from = self.state.phase;
        let to = next_phase(from, event).map_err(|err| anyhow!(err))?;
        self.state.phase = to;
        self.persist()?;
        info!(from = from.as_str(), to = to.as_str(), "phase transition");
        Ok(())
    }
}

/// Drive phases until the session completes or is aborted.
#[instrument(skip_all, fields(phase = run.state.phase.as_str()))]
pub fn drive<I: AgentInvoker, O: Operator>(
    run: &mut SessionRun<'_, I, O>,
) -> Result<SessionOutcome> {
    loop {
        let outcome = match run.state.phase {
            Phase::Planning => run_planning(run)?,
            Phase::Execution => run_execution(run)?,
            Phase::Review => run_review(run)?,
            Phase::Complete => return Ok(SessionOutcome::Completed),
        };
        if outcome == PhaseOutcome::Aborted {
            warn!(phase = run.state.phase.as_str(), "session aborted by operator");
            return Ok(SessionOutcome::Aborted);
        }
    }
}

/// Startup lifecycle followed by the phase machine.
pub fn run_session<I: AgentInvoker, O: Operator>(
    ws: Workspace,
    invoker: &I,
    operator: &mut O,
) -> Result<SessionOutcome> {
    let store = ReputationStore::open(&ws.paths);
    for warning in store.warnings() {
        warn!(%warning, "reputation store");
        operator.show("Warning", &warning, None)?;
    }

    let state = match start_session(&ws, operator)? {
        StartChoice::Quit => return Ok(SessionOutcome::Quit),
        StartChoice::Resume(state) | StartChoice::New(state) => state,
    };

    let mut run = SessionRun {
        ws,
        store,
        invoker,
        operator,
        state,
    };
    let outcome = drive(&mut run)?;
    if outcome == SessionOutcome::Completed {
        let tasks = load_tasks(&run.ws.session.tasks_path)?;
        let (completed, failed) = outcome_counts(&tasks);
        let summary = format!(
            "{completed} task(s) completed, {failed} failed. Final review: {}",
            run.ws.session.review_path.display()
        );
        run.operator.show("Session complete", &summary, None)?;
    }
    Ok(outcome)
}

/// Human-readable status of the current session, for `backbrief status`.
pub fn status_report(paths: &ProjectPaths) -> Result<String> {
    let session_paths = SessionPaths::new(&paths.session_dir);
    if !session_paths.exists() {
        return Ok("no session\n".to_string());
    }
    let state = load_session(&session_paths.state_path)?;
    let tasks = load_tasks(&session_paths.tasks_path)?;

    let mut report = String::new();
    let _ = writeln!(report, "phase: {}", state.phase.as_str());
    let _ = writeln!(report, "plan approved: {}", state.plan_approved);
    let _ = writeln!(report, "task cursor: {}/{}", state.task_index, state.total_tasks);
    let _ = writeln!(report, "started: {}", state.started_at.to_rfc3339());
    let _ = writeln!(report, "last updated: {}", state.last_updated.to_rfc3339());
    for task in &tasks {
        let _ = writeln!(
            report,
            "  [{}] {}. {}",
            task.status.as_str(),
            task.index + 1,
            task.title
        );
    }
    Ok(report)
}
