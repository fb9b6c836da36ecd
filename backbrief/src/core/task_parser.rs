//! Task extraction from agent-written markdown plans.
//!
//! Agent output is free-form, so extraction is best-effort. Three strategies
//! are tried in order and the first one that yields at least one task wins;
//! results are never merged:
//!
//! 1. [`heading_tasks`]: `### 1. Title` sub-headings, description is the body
//!    until the next heading of the same or shallower level.
//! 2. [`inline_tasks`]: `1. Title — description` list items, continuing until
//!    the next numbered item. Needs at least one item with a separator.
//! 3. [`bare_tasks`]: every `1. ...` line becomes a task on its own.
//!
//! Lines inside fenced code blocks are never read as headings or inline items.
//!
//! Source ordinals are ignored for indexing: tasks are numbered `0..n` in
//! document order because agents emit duplicated or skipped ordinals.
//! Extraction never fails; an empty result is the caller's to handle.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::Task;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}(#{1,6})\s+(.*?)(?:\s+#+)?\s*$").unwrap());
static TASK_HEADING_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\*\*|__)?(?:task\s+)?\d+[.:)]\s+(.+)$").unwrap()
});
static TASKS_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\W*(?:tasks?|task\s+list)\W*$").unwrap());
static INLINE_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}\d+\.\s+(.+)$").unwrap());
static BARE_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+\.\s+").unwrap());
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[—–]\s*|\s+-\s+|:\s+|:$").unwrap());
static MARKUP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*|__|\*|`").unwrap());

/// Which extraction strategy produced a task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Heading,
    Inline,
    Bare,
}

impl ExtractionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionStrategy::Heading => "heading",
            ExtractionStrategy::Inline => "inline",
            ExtractionStrategy::Bare => "bare",
        }
    }
}

/// Result of running the strategy chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// `None` when no strategy found anything.
    pub strategy: Option<ExtractionStrategy>,
    pub tasks: Vec<Task>,
}

type StrategyFn = fn(&str) -> Vec<Task>;

const STRATEGIES: [(ExtractionStrategy, StrategyFn); 3] = [
    (ExtractionStrategy::Heading, heading_tasks),
    (ExtractionStrategy::Inline, inline_tasks),
    (ExtractionStrategy::Bare, bare_tasks),
];

/// Extract the ordered task list from a plan document.
pub fn parse_tasks(plan: &str) -> Vec<Task> {
    extract_tasks(plan).tasks
}

/// Run the strategy chain against the plan's Tasks section.
///
/// When the document has a Tasks section the strategies only look inside it.
/// If that finds nothing, the whole chain runs again over the full document
/// so numbered content never yields an empty plan.
pub fn extract_tasks(plan: &str) -> Extraction {
    if let Some(scope) = tasks_section(plan)
        && let Some(extraction) = run_strategies(scope)
    {
        return extraction;
    }

    run_strategies(plan).unwrap_or(Extraction {
        strategy: None,
        tasks: Vec::new(),
    })
}

fn run_strategies(text: &str) -> Option<Extraction> {
    STRATEGIES.into_iter().find_map(|(strategy, extract)| {
        let tasks = extract(text);
        (!tasks.is_empty()).then_some(Extraction {
            strategy: Some(strategy),
            tasks,
        })
    })
}

/// Return the body of the first heading titled "Tasks" (any level), up to the
/// next heading of the same or shallower level.
///
/// Only a heading whose whole text is "Tasks" (or "Task list"), emphasis
/// aside, opens the section.
pub fn tasks_section(plan: &str) -> Option<&str> {
    let mut offset = 0usize;
    let mut start: Option<(usize, usize)> = None;
    let mut fences = Fences::default();

    for line in plan.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if fences.in_code(line) {
            continue;
        }
        let Some((level, text)) = heading(line) else {
            continue;
        };
        match start {
            None => {
                if TASKS_TITLE_RE.is_match(text) {
                    start = Some((level, offset));
                }
            }
            Some((section_level, body_start)) => {
                if level <= section_level {
                    return Some(&plan[body_start..line_start]);
                }
            }
        }
    }

    start.map(|(_, body_start)| &plan[body_start..])
}

/// Strategy 1: tasks bounded by `ordinal. Title` sub-headings.
pub fn heading_tasks(text: &str) -> Vec<Task> {
    let mut drafts: Vec<Draft> = Vec::new();
    let mut current: Option<(usize, Draft)> = None;
    let mut fences = Fences::default();

    for line in text.lines() {
        if !fences.in_code(line)
            && let Some((level, heading_text)) = heading(line)
        {
            if let Some(caps) = TASK_HEADING_TEXT_RE.captures(heading_text) {
                if let Some((_, draft)) = current.take() {
                    drafts.push(draft);
                }
                current = Some((level, Draft::new(strip_markup(&caps[1]))));
                continue;
            }
            if let Some((task_level, _)) = &current
                && level <= *task_level
            {
                if let Some((_, draft)) = current.take() {
                    drafts.push(draft);
                }
                continue;
            }
        }
        if let Some((_, draft)) = current.as_mut() {
            draft.lines.push(line.to_string());
        }
    }
    if let Some((_, draft)) = current {
        drafts.push(draft);
    }

    finish(drafts)
}

/// Strategy 2: `ordinal. Title — description` list items.
///
/// The list counts as inline-style when at least one item has a separator.
/// An item without one keeps its whole first line as the title and, lacking
/// continuation lines, as the description too.
pub fn inline_tasks(text: &str) -> Vec<Task> {
    let mut drafts: Vec<Draft> = Vec::new();
    let mut current: Option<Draft> = None;
    let mut fences = Fences::default();
    let mut any_split = false;

    for line in text.lines() {
        if fences.in_code(line) {
            if let Some(draft) = current.as_mut() {
                draft.lines.push(line.to_string());
            }
            continue;
        }
        if heading(line).is_some() {
            if let Some(draft) = current.take() {
                drafts.push(draft);
            }
            continue;
        }
        if let Some(caps) = INLINE_ITEM_RE.captures(line) {
            if let Some(draft) = current.take() {
                drafts.push(draft);
            }
            let first = strip_markup(&caps[1]);
            current = Some(match split_title(&first) {
                Some((title, rest)) => {
                    any_split = true;
                    let mut draft = Draft::new(title);
                    draft.lines.push(rest);
                    draft
                }
                None => Draft {
                    title_fills_description: true,
                    ..Draft::new(first)
                },
            });
            continue;
        }
        if let Some(draft) = current.as_mut() {
            draft.lines.push(line.to_string());
        }
    }
    if let Some(draft) = current {
        drafts.push(draft);
    }

    if !any_split {
        return Vec::new();
    }
    finish(drafts)
}

/// Strategy 3: every line starting with `ordinal.` is a task.
///
/// As the last resort this scans every line, fenced or not.
pub fn bare_tasks(text: &str) -> Vec<Task> {
    text.lines()
        .filter(|line| BARE_ITEM_RE.is_match(line))
        .enumerate()
        .map(|(index, line)| {
            let line = line.trim();
            Task::new(index, strip_markup(line), line)
        })
        .collect()
}

/// Remove emphasis and inline-code markup, collapsing whitespace.
pub fn strip_markup(text: &str) -> String {
    let stripped = MARKUP_RE.replace_all(text, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug)]
struct Draft {
    title: String,
    lines: Vec<String>,
    /// Use the title as the description when no body follows.
    title_fills_description: bool,
}

impl Draft {
    fn new(title: String) -> Self {
        Self {
            title,
            lines: Vec::new(),
            title_fills_description: false,
        }
    }
}

fn finish(drafts: Vec<Draft>) -> Vec<Task> {
    drafts
        .into_iter()
        .filter(|draft| !draft.title.is_empty())
        .enumerate()
        .map(|(index, draft)| {
            let mut description = draft.lines.join("\n").trim().to_string();
            if description.is_empty() && draft.title_fills_description {
                description = draft.title.clone();
            }
            Task::new(index, draft.title, description)
        })
        .collect()
}

/// Tracks fenced code blocks (backtick or tilde fences) across lines.
#[derive(Debug, Default)]
struct Fences {
    open: Option<char>,
}

impl Fences {
    /// Whether `line` is a fence delimiter or sits inside a fenced block.
    fn in_code(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        let marker = if trimmed.starts_with("```") {
            Some('`')
        } else if trimmed.starts_with("~~~") {
            Some('~')
        } else {
            None
        };
        match (self.open, marker) {
            (None, Some(marker)) => {
                self.open = Some(marker);
                true
            }
            (Some(open), Some(marker)) if open == marker => {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let caps = HEADING_RE.captures(line.trim_end_matches(['\n', '\r']))?;
    let level = caps.get(1)?.as_str().len();
    let text = caps.get(2)?.as_str();
    Some((level, text))
}

fn split_title(line: &str) -> Option<(String, String)> {
    let sep = SEPARATOR_RE.find(line)?;
    let title = line[..sep.start()].trim();
    if title.is_empty() {
        return None;
    }
    let rest = line[sep.end()..].trim();
    Some((title.to_string(), rest.to_string()))
}
