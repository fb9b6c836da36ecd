//! Planning phase: backbrief, then plan / cross-check revision cycles until
//! the operator approves a plan.
//!
//! Each revision discards the previous plan and cross-check and folds the
//! operator's feedback into the next plan prompt. The loop has no cap; only
//! the operator ends it.

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::phase::PhaseEvent;
use crate::core::task_parser::extract_tasks;
use crate::core::types::Task;
use crate::io::invoker::AgentInvoker;
use crate::io::operator::Operator;
use crate::io::prompt::{OutputLocation, PhaseMaterial, PromptRole};
use crate::io::reputation_updates::apply_updates_file;
use crate::io::session_store::{discard_artifacts, write_tasks};
use crate::io::write_atomic;
use crate::session::{PhaseOutcome, SessionRun};

const APPROVE: &str = "Approve plan";
const REVISE: &str = "Revise with feedback";
const RETRY: &str = "Retry";
const ABORT: &str = "Abort session";

/// Title of the single task used when a plan has no recognizable tasks.
pub const FALLBACK_TASK_TITLE: &str = "Execute full plan";

/// Heading prefix for each block of revision feedback.
const REVISION_HEADING: &str = "## Revision";

#[instrument(skip_all)]
pub fn run_planning<I: AgentInvoker, O: Operator>(
    run: &mut SessionRun<'_, I, O>,
) -> Result<PhaseOutcome> {
    if run.read_doc(&run.ws.session.backbrief_path)?.is_none() {
        run_backbrief(run)?;
    }

    let Some(plan) = revise_until_approved(run)? else {
        return Ok(PhaseOutcome::Aborted);
    };

    let extraction = extract_tasks(&plan);
    let tasks = match extraction.strategy {
        Some(strategy) => {
            info!(
                strategy = strategy.as_str(),
                count = extraction.tasks.len(),
                "tasks extracted from plan"
            );
            extraction.tasks
        }
        None => {
            warn!("approved plan has no recognizable tasks");
            let proceed = run.operator.confirm(
                &format!(
                    "No tasks could be read from the plan. Proceed with a single '{FALLBACK_TASK_TITLE}' task?"
                ),
                true,
            )?;
            if !proceed {
                return Ok(PhaseOutcome::Aborted);
            }
            vec![Task::new(0, FALLBACK_TASK_TITLE, plan.trim())]
        }
    };

    write_tasks(&run.ws.session.tasks_path, &tasks)?;
    run.state.total_tasks = tasks.len();
    run.state.task_index = 0;
    run.state.plan_approved = true;
    run.advance(PhaseEvent::PlanApproved)?;
    Ok(PhaseOutcome::Advanced)
}

/// One backbrief invocation, then the operator's answers.
///
/// A missing backbrief is a warning; planning goes ahead without it.
fn run_backbrief<I: AgentInvoker, O: Operator>(run: &mut SessionRun<'_, I, O>) -> Result<()> {
    let material = PhaseMaterial {
        request: run.read_doc(&run.ws.session.request_path)?,
        ..PhaseMaterial::default()
    };
    let output = OutputLocation::file(&run.ws.session.backbrief_path);
    let invocation = run.invoke(PromptRole::Backbrief, "backbrief", &material, &output)?;

    let Some(backbrief) = invocation.text() else {
        warn!("no backbrief produced; planning without it");
        run.operator.show(
            "Backbrief",
            "The agent produced no backbrief. Planning continues without it.",
            None,
        )?;
        return Ok(());
    };
    run.operator
        .show("Backbrief", backbrief, Some(&run.ws.session.backbrief_path))?;

    let answers = run.operator.ask(
        "Answer the agent's questions (leave empty to skip)",
        0,
    )?;
    if !answers.trim().is_empty() {
        write_atomic(
            &run.ws.session.clarifications_path,
            &format!("{}\n", answers.trim()),
        )?;
    }
    Ok(())
}

/// Number of revisions already recorded in `feedback`.
fn revisions_recorded(feedback: Option<&str>) -> usize {
    feedback.map_or(0, |text| {
        text.lines()
            .filter(|line| line.starts_with(REVISION_HEADING))
            .count()
    })
}

/// Run plan and cross-check cycles. Returns the approved plan, or `None`
/// when the operator aborts.
fn revise_until_approved<I: AgentInvoker, O: Operator>(
    run: &mut SessionRun<'_, I, O>,
) -> Result<Option<String>> {
    let paths = run.ws.session.clone();
    let mut iteration = revisions_recorded(run.read_doc(&paths.feedback_path)?.as_deref()) + 1;
    // A plan left on disk by an interrupted run is reviewed, not regenerated.
    let mut carried_plan = run.read_doc(&paths.plan_path)?;

    loop {
        let plan = match carried_plan.take() {
            Some(plan) => {
                info!(iteration, "reusing plan from previous run");
                plan
            }
            None => {
                let material = PhaseMaterial {
                    request: run.read_doc(&paths.request_path)?,
                    backbrief: run.read_doc(&paths.backbrief_path)?,
                    clarifications: run.read_doc(&paths.clarifications_path)?,
                    feedback: run.read_doc(&paths.feedback_path)?,
                    ..PhaseMaterial::default()
                };
                let output = OutputLocation::file(&paths.plan_path);
                let label = format!("plan-{iteration}");
                let invocation = run.invoke(PromptRole::Plan, &label, &material, &output)?;
                match invocation.text() {
                    Some(plan) => plan.to_string(),
                    None => {
                        let picked = run
                            .operator
                            .choose("The agent produced no plan.", &[RETRY, ABORT])?;
                        if picked == 0 {
                            continue;
                        }
                        return Ok(None);
                    }
                }
            }
        };

        let label = format!("cross-check-{iteration}");
        let material = PhaseMaterial {
            request: run.read_doc(&paths.request_path)?,
            backbrief: run.read_doc(&paths.backbrief_path)?,
            clarifications: run.read_doc(&paths.clarifications_path)?,
            plan: Some(plan.clone()),
            ..PhaseMaterial::default()
        };
        let output = OutputLocation::file(&paths.cross_check_path).with_updates(&paths.updates_path);
        let cross_check = run.invoke(PromptRole::CrossCheck, &label, &material, &output)?;
        let now = Utc::now().to_rfc3339();
        if let Some(summary) =
            apply_updates_file(&mut run.store, &paths.updates_path, &label, &now)?
        {
            run.operator
                .show("Reputation updates", &summary.describe(), None)?;
        }

        run.operator.show("Plan", &plan, Some(&paths.plan_path))?;
        match cross_check.text() {
            Some(text) => run
                .operator
                .show("Cross-check", text, Some(&paths.cross_check_path))?,
            None => {
                warn!(iteration, "no cross-check produced");
                run.operator.show(
                    "Cross-check",
                    "The reviewer produced no cross-check for this plan.",
                    None,
                )?;
            }
        }

        let options = [APPROVE, REVISE, ABORT];
        let picked = run
            .operator
            .choose(&format!("Plan revision {iteration}"), &options)?;
        match options.get(picked).copied() {
            Some(APPROVE) => {
                info!(iteration, "plan approved");
                return Ok(Some(plan));
            }
            Some(REVISE) => {
                let feedback = run.operator.ask(
                    "What should change in the plan?",
                    run.ws.config.operator.min_feedback_chars,
                )?;
                let mut all = run.read_doc(&paths.feedback_path)?.unwrap_or_default();
                if !all.is_empty() {
                    all.push_str("\n\n");
                }
                all.push_str(&format!("{REVISION_HEADING} {iteration}\n\n{}\n", feedback.trim()));
                write_atomic(&paths.feedback_path, &all)?;
                discard_artifacts(&[&paths.plan_path, &paths.cross_check_path])?;
                info!(iteration, "plan sent back for revision");
                iteration += 1;
            }
            Some(ABORT) => return Ok(None),
            _ => return Err(anyhow!("plan review choice {picked} out of range")),
        }
    }
}
