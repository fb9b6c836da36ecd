//! Startup lifecycle for `backbrief run`.
//!
//! If a session is on disk the operator may resume it (unless complete),
//! archive it, delete it or quit. Archive and delete go on to start a fresh
//! session. Sessions are never removed without an explicit choice.

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::types::Session;
use crate::io::init::ProjectPaths;
use crate::io::operator::Operator;
use crate::io::session_store::{
    SessionPaths, archive_session, create_session_dir, delete_session, load_session,
    write_session,
};
use crate::io::write_atomic;
use crate::session::Workspace;

const RESUME: &str = "Resume session";
const ARCHIVE: &str = "Archive it and start a new session";
const DELETE: &str = "Delete it and start a new session";
const QUIT: &str = "Quit";

/// What startup decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartChoice {
    Resume(Session),
    New(Session),
    Quit,
}

/// Offer the lifecycle choices for an existing session, or start a new one.
#[instrument(skip_all)]
pub fn start_session<O: Operator>(ws: &Workspace, operator: &mut O) -> Result<StartChoice> {
    let session_paths = &ws.session;
    if session_paths.dir.exists() {
        let existing = if session_paths.exists() {
            match load_session(&session_paths.state_path) {
                Ok(state) => Some(state),
                Err(err) => {
                    warn!(err = %err, "session record unreadable");
                    None
                }
            }
        } else {
            None
        };

        let mut options = Vec::new();
        let header = match &existing {
            Some(state) if !state.phase.is_terminal() => {
                options.push(RESUME);
                format!(
                    "A session in phase '{}' (task {}/{}) exists.",
                    state.phase.as_str(),
                    state.task_index,
                    state.total_tasks
                )
            }
            Some(_) => "A completed session exists.".to_string(),
            None => "An unreadable or unfinished session directory exists.".to_string(),
        };
        options.extend([ARCHIVE, DELETE, QUIT]);

        let picked = operator.choose(&header, &options)?;
        let choice = *options
            .get(picked)
            .ok_or_else(|| anyhow!("startup choice {picked} out of range"))?;
        match (choice, existing) {
            (RESUME, Some(state)) => {
                info!(phase = state.phase.as_str(), task_index = state.task_index, "resuming session");
                return Ok(StartChoice::Resume(state));
            }
            (ARCHIVE, _) => {
                let target = archive_session(session_paths, &ws.paths.archive_dir, Utc::now())?;
                operator.show("Archived", &target.display().to_string(), None)?;
            }
            (DELETE, _) => delete_session(session_paths)?,
            (QUIT, _) => return Ok(StartChoice::Quit),
            (other, _) => return Err(anyhow!("unexpected startup choice '{other}'")),
        }
    }

    new_session(ws, operator).map(StartChoice::New)
}

fn new_session<O: Operator>(ws: &Workspace, operator: &mut O) -> Result<Session> {
    let request = operator.ask(
        "What should the agent work on this session?",
        ws.config.operator.min_feedback_chars,
    )?;
    let session_paths = &ws.session;
    create_session_dir(session_paths)?;
    write_atomic(&session_paths.request_path, &format!("{}\n", request.trim()))?;
    let state = Session::new(Utc::now());
    write_session(&session_paths.state_path, &state)?;
    info!(dir = %session_paths.dir.display(), "new session started");
    Ok(state)
}

/// Non-interactive archive for `backbrief archive`.
pub fn archive_current(paths: &ProjectPaths) -> Result<std::path::PathBuf> {
    archive_session(
        &SessionPaths::new(&paths.session_dir),
        &paths.archive_dir,
        Utc::now(),
    )
}

/// Non-interactive delete for `backbrief delete`.
pub fn delete_current(paths: &ProjectPaths) -> Result<()> {
    delete_session(&SessionPaths::new(&paths.session_dir))
}
