//! Execution phase: one fresh agent invocation per task, in order.
//!
//! Continuity between tasks is carried only by the decision log. A task
//! whose completion file never appears is turned into an operator decision;
//! failures are recorded and execution moves on.

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::phase::{PhaseEvent, next_open_task, tasks_settled};
use crate::core::types::TaskStatus;
use crate::io::decision_log::append_entry;
use crate::io::invoker::AgentInvoker;
use crate::io::operator::Operator;
use crate::io::prompt::{OutputLocation, PhaseMaterial, PromptRole, TaskBrief};
use crate::io::session_store::{load_tasks, write_tasks};
use crate::session::{PhaseOutcome, SessionRun};

const RETRY: &str = "Retry task";
const MARK_FAILED: &str = "Mark task failed and continue";
const ABORT: &str = "Abort session";

#[instrument(skip_all, fields(cursor = run.state.task_index))]
pub fn run_execution<I: AgentInvoker, O: Operator>(
    run: &mut SessionRun<'_, I, O>,
) -> Result<PhaseOutcome> {
    let paths = run.ws.session.clone();
    let mut tasks = load_tasks(&paths.tasks_path)?;
    let total = tasks.len();

    while let Some(index) = next_open_task(&tasks, run.state.task_index) {
        let mut attempt = 1;
        let summary = loop {
            tasks[index].status = TaskStatus::InProgress;
            write_tasks(&paths.tasks_path, &tasks)?;
            run.state.task_index = index;
            run.persist()?;

            let material = PhaseMaterial {
                plan: run.read_doc(&paths.plan_path)?,
                decision_log: run.read_doc(&paths.decision_log_path)?,
                task: Some(TaskBrief::from_task(&tasks[index], total)),
                ..PhaseMaterial::default()
            };
            let output = OutputLocation::file(paths.task_complete_path(index));
            let label = format!("task-{index}-{attempt}");
            let invocation = run.invoke(PromptRole::Task, &label, &material, &output)?;
            if let Some(text) = invocation.text() {
                break Some(text.to_string());
            }

            warn!(index, attempt, "task produced no completion summary");
            let options = [RETRY, MARK_FAILED, ABORT];
            let picked = run.operator.choose(
                &format!(
                    "Task {} ({}) produced no completion summary.",
                    index + 1,
                    tasks[index].title
                ),
                &options,
            )?;
            match options.get(picked).copied() {
                Some(RETRY) => attempt += 1,
                Some(MARK_FAILED) => break None,
                Some(ABORT) => return Ok(PhaseOutcome::Aborted),
                _ => return Err(anyhow!("task choice {picked} out of range")),
            }
        };

        let task = &mut tasks[index];
        match summary {
            Some(summary) => {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
                append_entry(&paths.decision_log_path, task, &summary)?;
                info!(index, title = %task.title, "task completed");
                run.operator.show(
                    &format!("Task {} of {total} complete: {}", index + 1, task.title),
                    &summary,
                    Some(&paths.task_complete_path(index)),
                )?;
            }
            None => {
                task.status = TaskStatus::Failed;
                warn!(index, title = %task.title, "task marked failed");
            }
        }
        write_tasks(&paths.tasks_path, &tasks)?;
        run.state.task_index = index + 1;
        run.persist()?;
    }

    if !tasks_settled(&tasks) {
        return Err(anyhow!(
            "tasks before cursor {} are not settled; session record is inconsistent",
            run.state.task_index
        ));
    }
    run.advance(PhaseEvent::TasksSettled)?;
    Ok(PhaseOutcome::Advanced)
}
