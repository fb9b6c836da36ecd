//! Phase transition rules for the session pipeline.
//!
//! `planning → execution → review → complete`. Each edge fires on exactly one
//! event; anything else is a programming error reported as a string, matching
//! the other core validators.

use crate::core::types::{Phase, Task, TaskStatus};

/// Event that may advance a session to its next phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// The operator approved a plan and its task list was persisted.
    PlanApproved,
    /// Every task reached `completed` or `failed`.
    TasksSettled,
    /// The final review invocation finished.
    ReviewFinished,
}

/// Compute the phase that follows `current` on `event`.
pub fn next_phase(current: Phase, event: PhaseEvent) -> Result<Phase, String> {
    match (current, event) {
        (Phase::Planning, PhaseEvent::PlanApproved) => Ok(Phase::Execution),
        (Phase::Execution, PhaseEvent::TasksSettled) => Ok(Phase::Review),
        (Phase::Review, PhaseEvent::ReviewFinished) => Ok(Phase::Complete),
        (phase, event) => Err(format!(
            "invalid transition: {event:?} in phase {}",
            phase.as_str()
        )),
    }
}

/// True once every task is terminal. An empty list is trivially settled.
pub fn tasks_settled(tasks: &[Task]) -> bool {
    tasks.iter().all(|task| task.status.is_terminal())
}

/// Position of the first non-terminal task at or after `cursor`.
///
/// Tasks before the cursor are never revisited on resume. The result is a
/// slice position, not the task's recorded `index`.
pub fn next_open_task(tasks: &[Task], cursor: usize) -> Option<usize> {
    tasks
        .iter()
        .enumerate()
        .skip(cursor)
        .find(|(_, task)| !task.status.is_terminal())
        .map(|(position, _)| position)
}

/// Counts of `(completed, failed)` tasks.
pub fn outcome_counts(tasks: &[Task]) -> (usize, usize) {
    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let failed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .count();
    (completed, failed)
}
