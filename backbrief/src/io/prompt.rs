//! Prompt assembly for each agent role.
//!
//! Every prompt is built in the same order: role rules, project intent,
//! memories, patterns, phase material, output location. Review roles receive
//! `REVIEW_RULES.md` only and never see the primary agent's operating rules.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use super::init::{FrameworkPaths, ProjectPaths};
use super::memory_store::ReputationStore;
use super::read_optional;
use crate::core::types::Task;

const CONTEXT_TEMPLATE: &str = include_str!("prompts/context.md");
const UPDATES_TEMPLATE: &str = include_str!("prompts/updates.md");
const BACKBRIEF_TEMPLATE: &str = include_str!("prompts/backbrief.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const CROSS_CHECK_TEMPLATE: &str = include_str!("prompts/cross_check.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const FINAL_REVIEW_TEMPLATE: &str = include_str!("prompts/final_review.md");

/// Order in which droppable sections are removed when over budget.
const DROP_ORDER: [&str; 7] = [
    "intent",
    "decision_log",
    "clarifications",
    "backbrief",
    "plan",
    "patterns",
    "memories",
];

/// Agent role a prompt is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    Backbrief,
    Plan,
    CrossCheck,
    Task,
    FinalReview,
}

impl PromptRole {
    fn template_name(self) -> &'static str {
        match self {
            PromptRole::Backbrief => "backbrief",
            PromptRole::Plan => "plan",
            PromptRole::CrossCheck => "cross_check",
            PromptRole::Task => "task",
            PromptRole::FinalReview => "final_review",
        }
    }

    /// Adversarial roles get their own mandate instead of the operating rules.
    pub fn is_review(self) -> bool {
        matches!(self, PromptRole::CrossCheck | PromptRole::FinalReview)
    }

    pub fn as_str(self) -> &'static str {
        self.template_name()
    }
}

/// Project-level documents shared by every prompt.
#[derive(Debug, Clone)]
pub struct ProjectDocs {
    pub agent_rules: String,
    pub review_rules: String,
    pub intent: String,
}

impl ProjectDocs {
    /// Load rules and intent. Rules documents must exist; intent is optional.
    pub fn load(paths: &ProjectPaths, framework: &FrameworkPaths) -> Result<Self> {
        let agent_rules = read_optional(&framework.agent_rules_path)?
            .ok_or_else(|| anyhow!("missing {}", framework.agent_rules_path.display()))?;
        let review_rules = read_optional(&framework.review_rules_path)?
            .ok_or_else(|| anyhow!("missing {}", framework.review_rules_path.display()))?;
        let intent = read_optional(&paths.intent_path)?.unwrap_or_default();
        Ok(Self {
            agent_rules,
            review_rules,
            intent,
        })
    }
}

/// The task a `Task` prompt targets.
#[derive(Debug, Clone, Serialize)]
pub struct TaskBrief {
    /// 1-based for display.
    pub number: usize,
    pub total: usize,
    pub title: String,
    pub description: String,
}

impl TaskBrief {
    pub fn from_task(task: &Task, total: usize) -> Self {
        Self {
            number: task.index + 1,
            total,
            title: task.title.clone(),
            description: task.description.clone(),
        }
    }
}

/// Phase-specific material. Unset fields are omitted from the prompt.
#[derive(Debug, Clone, Default)]
pub struct PhaseMaterial {
    pub request: Option<String>,
    pub backbrief: Option<String>,
    pub clarifications: Option<String>,
    pub feedback: Option<String>,
    pub plan: Option<String>,
    pub task: Option<TaskBrief>,
    pub outcomes: Option<String>,
    pub decision_log: Option<String>,
}

/// Where the agent must write its result.
#[derive(Debug, Clone)]
pub struct OutputLocation {
    pub path: PathBuf,
    /// Set for review roles that may record reputation updates.
    pub updates_path: Option<PathBuf>,
}

impl OutputLocation {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            updates_path: None,
        }
    }

    pub fn with_updates(mut self, path: impl Into<PathBuf>) -> Self {
        self.updates_path = Some(path.into());
        self
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("context", CONTEXT_TEMPLATE),
            ("updates", UPDATES_TEMPLATE),
            ("backbrief", BACKBRIEF_TEMPLATE),
            ("plan", PLAN_TEMPLATE),
            ("cross_check", CROSS_CHECK_TEMPLATE),
            ("task", TASK_TEMPLATE),
            ("final_review", FINAL_REVIEW_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self { env }
    }

    fn render(
        &self,
        role: PromptRole,
        docs: &ProjectDocs,
        store: &ReputationStore,
        material: &PhaseMaterial,
        output: &OutputLocation,
    ) -> Result<String> {
        let rules = if role.is_review() {
            &docs.review_rules
        } else {
            &docs.agent_rules
        };
        let template = self.env.get_template(role.template_name())?;
        let rendered = template
            .render(context! {
                review => role.is_review(),
                rules => rules.trim(),
                intent => non_empty(Some(docs.intent.as_str())),
                memories => store.memories_block(),
                patterns => store.patterns_block(),
                request => non_empty(material.request.as_deref()).unwrap_or("(no request recorded)"),
                backbrief => non_empty(material.backbrief.as_deref()),
                clarifications => non_empty(material.clarifications.as_deref()),
                feedback => non_empty(material.feedback.as_deref()),
                plan => non_empty(material.plan.as_deref()),
                task => material.task.clone(),
                outcomes => non_empty(material.outcomes.as_deref()),
                decision_log => non_empty(material.decision_log.as_deref()),
                output_path => display(&output.path),
                updates_path => output.updates_path.as_deref().map(display),
            })
            .with_context(|| format!("render {} prompt", role.as_str()))?;
        Ok(rendered)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->`
/// markers. Sections that render empty are skipped.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").unwrap()
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map(|(next_start, ..)| *next_start)
            .unwrap_or(rendered.len());
        let content = rendered[*start..end].trim().to_string();
        if !content.is_empty() {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections in [`DROP_ORDER`] until the prompt fits, then
/// truncate the largest remaining section other than the output location.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    if total_len(sections) <= budget {
        return;
    }

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(largest) = sections
        .iter_mut()
        .filter(|s| s.key != "output")
        .max_by_key(|s| s.content.len())
    else {
        return;
    };
    let excess = total - budget;
    let before_len = largest.content.len();
    let mut keep = before_len.saturating_sub(excess + 12);
    while keep > 0 && !largest.content.is_char_boundary(keep) {
        keep -= 1;
    }
    largest.content.truncate(keep);
    largest.content.push_str("\n[truncated]");
    debug!(
        section = largest.key,
        before_len,
        after_len = largest.content.len(),
        "truncated section for budget"
    );
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds role prompts within a byte budget, dropping less critical sections
/// first.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    budget_bytes: usize,
}

impl PromptAssembler {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    #[instrument(skip_all, fields(role = role.as_str(), budget = self.budget_bytes))]
    pub fn build(
        &self,
        role: PromptRole,
        docs: &ProjectDocs,
        store: &ReputationStore,
        material: &PhaseMaterial,
        output: &OutputLocation,
    ) -> Result<PromptPack> {
        let engine = PromptEngine::new();
        let rendered = engine.render(role, docs, store, material, output)?;

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        let content = render_sections(&sections);
        debug!(bytes = content.len(), "assembled prompt");
        Ok(PromptPack { content })
    }
}

/// A rendered prompt ready to pipe to the agent.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    pub fn as_str(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> ProjectDocs {
        ProjectDocs {
            agent_rules: "AGENT RULES BODY".to_string(),
            review_rules: "REVIEW MANDATE BODY".to_string(),
            intent: "Build a ledger tool".to_string(),
        }
    }

    fn store(temp: &tempfile::TempDir) -> ReputationStore {
        ReputationStore::open_at(
            "demo".to_string(),
            temp.path().join("memories.json"),
            temp.path().join("patterns.json"),
        )
    }

    fn material() -> PhaseMaterial {
        PhaseMaterial {
            request: Some("Add CSV export".to_string()),
            backbrief: Some("I understand you want CSV".to_string()),
            clarifications: Some("Only the ledger table".to_string()),
            feedback: Some("Split task two".to_string()),
            ..PhaseMaterial::default()
        }
    }

    fn position(content: &str, needle: &str) -> usize {
        content
            .find(needle)
            .unwrap_or_else(|| panic!("missing {needle}"))
    }

    /// Verifies the fixed order: rules, intent, memories, patterns, phase
    /// material, output.
    #[test]
    fn plan_prompt_ordering_is_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pack = PromptAssembler::new(100_000)
            .build(
                PromptRole::Plan,
                &docs(),
                &store(&temp),
                &material(),
                &OutputLocation::file("/s/plan.md"),
            )
            .expect("build");
        let content = pack.as_str();

        let order = [
            "### Operating Rules",
            "### Project Intent",
            "### Project Memories",
            "### Known Patterns",
            "### Request",
            "### Your Backbrief",
            "### Operator Clarifications",
            "### Revision Feedback",
            "### Output",
        ];
        let positions: Vec<usize> = order.iter().map(|n| position(content, n)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
        assert!(content.contains("`/s/plan.md`"));
        assert!(content.contains("## Tasks"));
    }

    /// Verifies review roles get only the review mandate.
    #[test]
    fn review_prompt_omits_operating_rules() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut material = material();
        material.plan = Some("## Tasks\n### 1. Do it".to_string());
        let output = OutputLocation::file("/s/cross-check.md").with_updates("/s/updates.json");
        let pack = PromptAssembler::new(100_000)
            .build(
                PromptRole::CrossCheck,
                &docs(),
                &store(&temp),
                &material,
                &output,
            )
            .expect("build");
        let content = pack.as_str();

        assert!(content.contains("REVIEW MANDATE BODY"));
        assert!(!content.contains("AGENT RULES BODY"));
        assert!(content.contains("### Plan Under Review"));
        assert!(content.contains("`/s/updates.json`"));
    }

    /// Verifies the primary role never sees the review mandate.
    #[test]
    fn primary_prompt_omits_review_mandate() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pack = PromptAssembler::new(100_000)
            .build(
                PromptRole::Backbrief,
                &docs(),
                &store(&temp),
                &material(),
                &OutputLocation::file("/s/backbrief.md"),
            )
            .expect("build");
        assert!(pack.as_str().contains("AGENT RULES BODY"));
        assert!(!pack.as_str().contains("REVIEW MANDATE BODY"));
        assert!(!pack.as_str().contains("reputation"));
    }

    /// Verifies the task prompt carries the task and prior summaries.
    #[test]
    fn task_prompt_includes_task_and_decision_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let task = Task::new(1, "Write API", "Expose the endpoints.");
        let material = PhaseMaterial {
            plan: Some("the plan".to_string()),
            task: Some(TaskBrief::from_task(&task, 3)),
            decision_log: Some("### Task 1: Set up database\n\nDone.".to_string()),
            ..PhaseMaterial::default()
        };
        let pack = PromptAssembler::new(100_000)
            .build(
                PromptRole::Task,
                &docs(),
                &store(&temp),
                &material,
                &OutputLocation::file("/s/task-1-complete.md"),
            )
            .expect("build");
        let content = pack.as_str();
        assert!(content.contains("### Current Task (2 of 3)"));
        assert!(content.contains("Expose the endpoints."));
        assert!(position(content, "### Decision Log") < position(content, "### Current Task"));
    }

    /// Verifies empty optional material is omitted.
    #[test]
    fn empty_material_is_omitted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut docs = docs();
        docs.intent = "  ".to_string();
        let pack = PromptAssembler::new(100_000)
            .build(
                PromptRole::Plan,
                &docs,
                &store(&temp),
                &PhaseMaterial::default(),
                &OutputLocation::file("/s/plan.md"),
            )
            .expect("build");
        let content = pack.as_str();
        assert!(!content.contains("### Project Intent"));
        assert!(!content.contains("### Revision Feedback"));
        assert!(content.contains("No memories on file."));
    }

    /// Verifies budget enforcement drops intent and clarifications before
    /// memories, and never drops required sections.
    #[test]
    fn budget_drops_less_critical_sections_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut docs = docs();
        docs.intent = "intent ".repeat(200);
        let mut material = material();
        material.clarifications = Some("clar ".repeat(200));

        let full = PromptAssembler::new(100_000)
            .build(
                PromptRole::Plan,
                &docs,
                &store(&temp),
                &material,
                &OutputLocation::file("/s/plan.md"),
            )
            .expect("build");
        let budget = full.as_str().len() - 2000;
        let pack = PromptAssembler::new(budget)
            .build(
                PromptRole::Plan,
                &docs,
                &store(&temp),
                &material,
                &OutputLocation::file("/s/plan.md"),
            )
            .expect("build");
        let content = pack.as_str();

        assert!(!content.contains("### Project Intent"));
        assert!(!content.contains("### Operator Clarifications"));
        assert!(content.contains("### Project Memories"));
        assert!(content.contains("### Revision Feedback"));
        assert!(content.contains("### Output"));
    }

    /// Verifies a prompt still over budget after dropping is truncated
    /// without losing the output location.
    #[test]
    fn oversized_required_section_is_truncated() {
        let mut sections = vec![
            ParsedSection {
                key: "request".to_string(),
                required: true,
                content: "r".repeat(500),
            },
            ParsedSection {
                key: "output".to_string(),
                required: true,
                content: "write to x".to_string(),
            },
        ];
        apply_budget_to_sections(&mut sections, 200);
        assert!(total_len(&sections) <= 200);
        assert!(sections[0].content.ends_with("[truncated]"));
        assert_eq!(sections[1].content, "write to x");
    }
}
