//! Final review: an independent reviewer compares what was executed against
//! the plan and may update reputation scores. The phase always completes.

use std::fmt::Write as _;

use anyhow::Result;
use chrono::Utc;
use tracing::{instrument, warn};

use crate::core::phase::PhaseEvent;
use crate::core::types::Task;
use crate::io::invoker::AgentInvoker;
use crate::io::operator::Operator;
use crate::io::prompt::{OutputLocation, PhaseMaterial, PromptRole};
use crate::io::reputation_updates::apply_updates_file;
use crate::io::session_store::load_tasks;
use crate::session::{PhaseOutcome, SessionRun};

const REVIEW_LABEL: &str = "final-review";

/// One line per task: `- [status] Task N: title`.
pub fn format_outcomes(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        let _ = writeln!(
            out,
            "- [{}] Task {}: {}",
            task.status.as_str(),
            task.index + 1,
            task.title
        );
    }
    out
}

#[instrument(skip_all)]
pub fn run_review<I: AgentInvoker, O: Operator>(
    run: &mut SessionRun<'_, I, O>,
) -> Result<PhaseOutcome> {
    let paths = run.ws.session.clone();
    let tasks = load_tasks(&paths.tasks_path)?;
    let material = PhaseMaterial {
        request: run.read_doc(&paths.request_path)?,
        plan: run.read_doc(&paths.plan_path)?,
        outcomes: Some(format_outcomes(&tasks)),
        decision_log: run.read_doc(&paths.decision_log_path)?,
        ..PhaseMaterial::default()
    };
    let output = OutputLocation::file(&paths.review_path).with_updates(&paths.updates_path);
    let invocation = run.invoke(PromptRole::FinalReview, REVIEW_LABEL, &material, &output)?;

    match invocation.text() {
        Some(review) => run
            .operator
            .show("Final review", review, Some(&paths.review_path))?,
        None => {
            warn!("no final review produced");
            run.operator
                .show("Final review", "The reviewer produced no final review.", None)?;
        }
    }

    let now = Utc::now().to_rfc3339();
    if let Some(summary) =
        apply_updates_file(&mut run.store, &paths.updates_path, REVIEW_LABEL, &now)?
    {
        run.operator
            .show("Reputation updates", &summary.describe(), None)?;
    }

    run.advance(PhaseEvent::ReviewFinished)?;
    Ok(PhaseOutcome::Advanced)
}
