//! Shared deterministic types for session orchestration.
//!
//! These types define the persisted contracts for `state.json` and
//! `tasks.json`. They carry no I/O and serialize to a stable shape so that a
//! load → save → load cycle yields identical values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Execution,
    Review,
    Complete,
}

impl Phase {
    /// `complete` is the only terminal phase.
    pub fn is_terminal(self) -> bool {
        self == Phase::Complete
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Execution => "execution",
            Phase::Review => "review",
            Phase::Complete => "complete",
        }
    }
}

/// Lifecycle status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// `completed` and `failed` both end a task; failures do not block review.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// One independently executable unit of an approved plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Position in document order, assigned at parse time and never renumbered.
    pub index: usize,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(index: usize, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            completed_at: None,
        }
    }
}

/// Persisted session record (`session/state.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub phase: Phase,
    /// Cursor into the task list; the next task to execute on resume.
    pub task_index: usize,
    pub total_tasks: usize,
    pub plan_approved: bool,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Session {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Planning,
            task_index: 0,
            total_tasks: 0,
            plan_approved: false,
            started_at: now,
            last_updated: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_snake_case() {
        let json = serde_json::to_string(&Phase::Execution).expect("serialize");
        assert_eq!(json, "\"execution\"");
    }

    #[test]
    fn task_status_in_progress_uses_underscore() {
        let json = serde_json::to_string(&TaskStatus::InProgress).expect("serialize");
        assert_eq!(json, "\"in_progress\"");
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn session_uses_camel_case_keys() {
        let session = Session::new(Utc::now());
        let value = serde_json::to_value(&session).expect("serialize");
        assert!(value.get("taskIndex").is_some());
        assert!(value.get("planApproved").is_some());
        assert!(value.get("lastUpdated").is_some());
    }

    #[test]
    fn task_without_completed_at_deserializes() {
        let raw = r#"{"index":0,"title":"t","description":"d","status":"pending"}"#;
        let task: Task = serde_json::from_str(raw).expect("parse");
        assert_eq!(task.completed_at, None);
    }
}
