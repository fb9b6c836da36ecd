//! Orchestrator configuration stored under `.backbrief/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Orchestrator configuration (TOML).
///
/// Edited by humans. Missing fields fall back to defaults so an empty file is
/// a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackbriefConfig {
    /// Directory holding `AGENT_RULES.md` and `REVIEW_RULES.md`. Relative
    /// paths resolve against the project root. Defaults to
    /// `.backbrief/framework`.
    pub framework_dir: Option<PathBuf>,

    pub agent: AgentConfig,

    pub prompt: PromptConfig,

    pub operator: OperatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Program and fixed leading arguments (e.g. `["claude", "-p"]`).
    pub command: Vec<String>,

    /// Model identifier passed to the agent, if any.
    pub model: Option<String>,

    /// Spending ceiling per invocation, if any.
    pub max_budget_usd: Option<f64>,

    /// Bypass interactive permission prompts for non-interactive runs.
    pub skip_permissions: bool,

    /// Wall-clock limit per invocation. Unset waits until the agent exits.
    pub timeout_secs: Option<u64>,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// Maximum prompt size before droppable sections are removed.
    pub budget_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OperatorConfig {
    /// Minimum length for revision feedback.
    pub min_feedback_chars: usize,

    /// Lines shown before a displayed document is truncated.
    pub show_max_lines: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "-p".to_string()],
            model: None,
            max_budget_usd: None,
            skip_permissions: true,
            timeout_secs: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 400_000,
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            min_feedback_chars: 10,
            show_max_lines: 60,
        }
    }
}

impl Default for BackbriefConfig {
    fn default() -> Self {
        Self {
            framework_dir: None,
            agent: AgentConfig::default(),
            prompt: PromptConfig::default(),
            operator: OperatorConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl BackbriefConfig {
    /// Collect every invariant violation instead of stopping at the first.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            problems.push("agent.command must be a non-empty array".to_string());
        }
        if self.agent.output_limit_bytes == 0 {
            problems.push("agent.output_limit_bytes must be > 0".to_string());
        }
        if self.agent.timeout_secs == Some(0) {
            problems.push("agent.timeout_secs must be > 0 when set".to_string());
        }
        if let Some(budget) = self.agent.max_budget_usd
            && !(budget.is_finite() && budget > 0.0)
        {
            problems.push("agent.max_budget_usd must be a positive number".to_string());
        }
        if self.prompt.budget_bytes == 0 {
            problems.push("prompt.budget_bytes must be > 0".to_string());
        }
        problems
    }

    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            return Ok(());
        }
        Err(anyhow!("invalid config:\n- {}", problems.join("\n- ")))
    }

    /// Resolve the framework directory against the project root.
    pub fn framework_dir(&self, root: &Path, data_dir: &Path) -> PathBuf {
        match &self.framework_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => data_dir.join("framework"),
        }
    }
}

/// Parse config from a TOML file without checking invariants.
///
/// If the file is missing, returns `BackbriefConfig::default()`.
pub fn read_config(path: &Path) -> Result<BackbriefConfig> {
    if !path.exists() {
        return Ok(BackbriefConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BackbriefConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Load config from a TOML file and validate it.
pub fn load_config(path: &Path) -> Result<BackbriefConfig> {
    let cfg = read_config(path)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BackbriefConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
