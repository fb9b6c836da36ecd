//! Initialization helpers for `.backbrief/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;

use super::config::{BackbriefConfig, write_config};
use super::memory_store::{write_memory_file, write_pattern_file};
use crate::core::reputation::{
    Confidence, MemoryFile, Pattern, PatternFile, RecordStatus,
};

/// All canonical project-level paths for a project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub intent_path: PathBuf,
    pub memories_path: PathBuf,
    pub patterns_path: PathBuf,
    pub session_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub default_framework_dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let data_dir = root.join(".backbrief");
        Self {
            root: root.clone(),
            data_dir: data_dir.clone(),
            config_path: data_dir.join("config.toml"),
            intent_path: data_dir.join("INTENT.md"),
            memories_path: data_dir.join("memories.json"),
            patterns_path: data_dir.join("patterns.json"),
            session_dir: data_dir.join("session"),
            archive_dir: data_dir.join("archive"),
            default_framework_dir: data_dir.join("framework"),
        }
    }

    /// Project name used in a fresh `memories.json`.
    ///
    /// Taken from the resolved root so `.` and `..` name the real directory.
    pub fn project_name(&self) -> String {
        fs::canonicalize(&self.root)
            .unwrap_or_else(|_| self.root.clone())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }
}

/// Framework rule documents, resolved from config.
#[derive(Debug, Clone)]
pub struct FrameworkPaths {
    pub dir: PathBuf,
    pub agent_rules_path: PathBuf,
    pub review_rules_path: PathBuf,
}

impl FrameworkPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            agent_rules_path: dir.join("AGENT_RULES.md"),
            review_rules_path: dir.join("REVIEW_RULES.md"),
            dir,
        }
    }

    pub fn resolve(paths: &ProjectPaths, cfg: &BackbriefConfig) -> Self {
        Self::new(cfg.framework_dir(&paths.root, &paths.data_dir))
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing scaffolding files. Stores are never reset.
    pub force: bool,
}

/// Create `.backbrief/` scaffolding in `root`.
///
/// Fails if `.backbrief/` already exists unless `options.force` is set. Even
/// with `force`, existing `memories.json` and `patterns.json` are kept because
/// they carry history across sessions.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<ProjectPaths> {
    let paths = ProjectPaths::new(root);
    if paths.data_dir.exists() && !options.force {
        return Err(anyhow!(
            "backbrief init: .backbrief already exists (use --force to overwrite)"
        ));
    }
    if paths.data_dir.exists() && !paths.data_dir.is_dir() {
        return Err(anyhow!(
            "backbrief init: .backbrief exists but is not a directory"
        ));
    }

    create_dir(&paths.data_dir)?;
    create_dir(&paths.archive_dir)?;

    let framework = FrameworkPaths::new(&paths.default_framework_dir);
    create_dir(&framework.dir)?;
    write_file(&framework.agent_rules_path, AGENT_RULES_PLACEHOLDER)?;
    write_file(&framework.review_rules_path, REVIEW_RULES_PLACEHOLDER)?;
    write_file(&paths.intent_path, INTENT_PLACEHOLDER)?;
    write_config(&paths.config_path, &BackbriefConfig::default())?;

    let now = Utc::now().to_rfc3339();
    if !paths.memories_path.exists() {
        write_memory_file(
            &paths.memories_path,
            &MemoryFile::empty(&paths.project_name(), &now),
        )?;
    }
    if !paths.patterns_path.exists() {
        write_pattern_file(&paths.patterns_path, &seeded_patterns(&now))?;
    }

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

fn seeded_patterns(now: &str) -> PatternFile {
    let seed = |id: &str, category: &str, content: &str, countermeasure: &str| Pattern {
        id: id.to_string(),
        category: category.to_string(),
        content: content.to_string(),
        context: String::new(),
        countermeasure: countermeasure.to_string(),
        origin: "seeded".to_string(),
        confidence: Confidence {
            score: 0.5,
            reasoning: "seeded default".to_string(),
        },
        reinforcement_count: 0,
        status: RecordStatus::Active,
        created: now.to_string(),
        last_updated: now.to_string(),
    };

    let mut file = PatternFile::empty(now);
    file.patterns = vec![
        seed(
            "pat-001",
            "premature_completion",
            "Declares work finished before verifying it against the plan.",
            "Name the check that proves each task is done before claiming completion.",
        ),
        seed(
            "pat-002",
            "scope_creep",
            "Adds unrequested features or refactors while executing a task.",
            "Limit changes to the task description; record extra ideas instead of doing them.",
        ),
        seed(
            "pat-003",
            "assumed_context",
            "Assumes files, APIs or conventions exist without checking.",
            "Read the relevant code before relying on it and cite what was read.",
        ),
    ];
    file
}

const AGENT_RULES_PLACEHOLDER: &str = "# Agent Operating Rules\n\n\
- Work only from the material in this prompt and the files you read.\n\
- Write your result to the file path named in the output section.\n\
- State assumptions explicitly; do not invent facts about the codebase.\n";
const REVIEW_RULES_PLACEHOLDER: &str = "# Review Mandate\n\n\
You are an independent adversarial reviewer. Find what is wrong, missing or\n\
unverified. Do not soften findings. Record reputation updates when the\n\
evidence supports them.\n";
const INTENT_PLACEHOLDER: &str = "# Project Intent\n\nDescribe what this project is for.\n";
