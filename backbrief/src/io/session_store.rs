//! Session directory layout and persistence.
//!
//! One session lives in `.backbrief/session/`. Every write replaces a whole
//! file atomically so an interrupted run leaves the last consistent state.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::write_json_atomic;
use crate::core::types::{Session, Task};

/// Canonical paths inside a session directory.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub state_path: PathBuf,
    pub tasks_path: PathBuf,
    pub request_path: PathBuf,
    pub backbrief_path: PathBuf,
    pub clarifications_path: PathBuf,
    pub feedback_path: PathBuf,
    pub plan_path: PathBuf,
    pub cross_check_path: PathBuf,
    pub review_path: PathBuf,
    pub decision_log_path: PathBuf,
    pub updates_path: PathBuf,
    pub logs_dir: PathBuf,
}

impl SessionPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            state_path: dir.join("state.json"),
            tasks_path: dir.join("tasks.json"),
            request_path: dir.join("request.md"),
            backbrief_path: dir.join("backbrief.md"),
            clarifications_path: dir.join("clarifications.md"),
            feedback_path: dir.join("feedback.md"),
            plan_path: dir.join("plan.md"),
            cross_check_path: dir.join("cross-check.md"),
            review_path: dir.join("review.md"),
            decision_log_path: dir.join("decision-log.md"),
            updates_path: dir.join("reputation-updates.json"),
            logs_dir: dir.join("logs"),
            dir,
        }
    }

    /// Completion signal file for the task at `index`.
    pub fn task_complete_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("task-{index}-complete.md"))
    }

    /// Per-invocation stdout/stderr log.
    pub fn log_path(&self, label: &str) -> PathBuf {
        self.logs_dir.join(format!("{label}.log"))
    }

    /// A session exists once its state record has been written.
    pub fn exists(&self) -> bool {
        self.state_path.is_file()
    }
}

pub fn load_session(path: &Path) -> Result<Session> {
    debug!(path = %path.display(), "loading session");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read session {}", path.display()))?;
    let session: Session = serde_json::from_str(&contents)
        .with_context(|| format!("parse session {}", path.display()))?;
    debug!(phase = session.phase.as_str(), task_index = session.task_index, "session loaded");
    Ok(session)
}

pub fn write_session(path: &Path, session: &Session) -> Result<()> {
    debug!(path = %path.display(), phase = session.phase.as_str(), task_index = session.task_index, "writing session");
    write_json_atomic(path, session)
}

/// Load the task sequence. A missing file means no tasks yet.
///
/// Indices are reset to file order, whatever was recorded.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read tasks {}", path.display()))?;
    let mut tasks: Vec<Task> = serde_json::from_str(&contents)
        .with_context(|| format!("parse tasks {}", path.display()))?;
    for (position, task) in tasks.iter_mut().enumerate() {
        if task.index != position {
            warn!(recorded = task.index, position, "task index out of order; renumbering");
            task.index = position;
        }
    }
    debug!(count = tasks.len(), "tasks loaded");
    Ok(tasks)
}

pub fn write_tasks(path: &Path, tasks: &[Task]) -> Result<()> {
    debug!(path = %path.display(), count = tasks.len(), "writing tasks");
    write_json_atomic(path, &tasks)
}

/// Create the session directory and its logs directory.
pub fn create_session_dir(paths: &SessionPaths) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("create session dir {}", paths.logs_dir.display()))
}

/// Remove agent artifacts so a fresh invocation cannot be confused with a
/// stale one. Missing files are ignored.
pub fn discard_artifacts<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    for path in paths {
        let path = path.as_ref();
        if path.exists() {
            fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
            debug!(path = %path.display(), "discarded artifact");
        }
    }
    Ok(())
}

/// Move the whole session directory under `archive_dir/session-<timestamp>`.
pub fn archive_session(
    paths: &SessionPaths,
    archive_dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    if !paths.dir.exists() {
        return Err(anyhow!("no session to archive at {}", paths.dir.display()));
    }
    fs::create_dir_all(archive_dir)
        .with_context(|| format!("create archive dir {}", archive_dir.display()))?;

    let stamp = now.format("%Y%m%d_%H%M%S").to_string();
    let mut target = archive_dir.join(format!("session-{stamp}"));
    let mut suffix = 2;
    while target.exists() {
        target = archive_dir.join(format!("session-{stamp}-{suffix}"));
        suffix += 1;
    }
    fs::rename(&paths.dir, &target).with_context(|| {
        format!(
            "archive {} to {}",
            paths.dir.display(),
            target.display()
        )
    })?;
    info!(archive = %target.display(), "session archived");
    Ok(target)
}

/// Remove the session directory outright.
pub fn delete_session(paths: &SessionPaths) -> Result<()> {
    if !paths.dir.exists() {
        return Err(anyhow!("no session to delete at {}", paths.dir.display()));
    }
    fs::remove_dir_all(&paths.dir)
        .with_context(|| format!("delete session {}", paths.dir.display()))?;
    info!(dir = %paths.dir.display(), "session deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::core::types::{Phase, TaskStatus};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("timestamp")
    }

    /// Verifies load → save → load yields an identical session.
    #[test]
    fn session_round_trip_is_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path().join("session"));
        let mut session = Session::new(at(1_700_000_000));
        session.phase = Phase::Execution;
        session.task_index = 2;
        session.total_tasks = 4;
        session.plan_approved = true;
        session.touch(at(1_700_000_100));

        write_session(&paths.state_path, &session).expect("write");
        let first = load_session(&paths.state_path).expect("load");
        let first_bytes = fs::read(&paths.state_path).expect("read");
        write_session(&paths.state_path, &first).expect("rewrite");
        let second = load_session(&paths.state_path).expect("reload");

        assert_eq!(first, session);
        assert_eq!(second, first);
        assert_eq!(fs::read(&paths.state_path).expect("read"), first_bytes);
    }

    /// Verifies tasks keep status and completion time across writes.
    #[test]
    fn tasks_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        let mut done = Task::new(0, "Set up database", "Create schema.");
        done.status = TaskStatus::Completed;
        done.completed_at = Some(at(1_700_000_000));
        let tasks = vec![done, Task::new(1, "Write API", "Endpoints.")];

        write_tasks(&path, &tasks).expect("write");
        assert_eq!(load_tasks(&path).expect("load"), tasks);
    }

    /// Verifies recorded indices that disagree with file order are renumbered.
    #[test]
    fn loaded_tasks_are_renumbered_by_position() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        let tasks = vec![
            Task::new(5, "Set up database", "Create schema."),
            Task::new(usize::MAX, "Write API", "Endpoints."),
        ];
        write_tasks(&path, &tasks).expect("write");

        let loaded = load_tasks(&path).expect("load");
        let indices: Vec<usize> = loaded.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(loaded[1].title, "Write API");
    }

    #[test]
    fn missing_tasks_file_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(
            load_tasks(&temp.path().join("tasks.json"))
                .expect("load")
                .is_empty()
        );
    }

    /// Verifies archive moves the whole directory under a timestamped name
    /// and never clobbers an earlier archive.
    #[test]
    fn archive_uses_timestamp_and_avoids_collisions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let archive_dir = temp.path().join("archive");
        let now = at(1_700_000_000);

        for expected in ["session-20231114_221320", "session-20231114_221320-2"] {
            let paths = SessionPaths::new(temp.path().join("session"));
            create_session_dir(&paths).expect("create");
            write_session(&paths.state_path, &Session::new(now)).expect("write");

            let target = archive_session(&paths, &archive_dir, now).expect("archive");
            assert_eq!(target, archive_dir.join(expected));
            assert!(target.join("state.json").is_file());
            assert!(!paths.dir.exists());
        }
    }

    #[test]
    fn delete_removes_session_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path().join("session"));
        create_session_dir(&paths).expect("create");
        fs::write(&paths.plan_path, "plan").expect("write");

        delete_session(&paths).expect("delete");
        assert!(!paths.dir.exists());
        assert!(delete_session(&paths).is_err());
    }

    #[test]
    fn discard_ignores_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path());
        fs::write(&paths.plan_path, "old plan").expect("write");

        discard_artifacts(&[&paths.plan_path, &paths.cross_check_path]).expect("discard");
        assert!(!paths.plan_path.exists());
    }
}
