//! Reputation store files: `memories.json` and `patterns.json`.
//!
//! Loading never fails past the caller. A missing file and a malformed file
//! are reported as distinct [`StoreLoad`] variants so the orchestrator can
//! warn and carry on without the store. A malformed file is never written
//! over.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::init::ProjectPaths;
use super::write_json_atomic;
use crate::core::reputation::{
    Confidence, Memory, MemoryFile, MemoryType, PatternFile, RecordStatus, ReputationRecord,
    UpdateAction, apply_update, clamp_score, format_memories, format_patterns, next_memory_id,
};

/// Outcome of reading a store file.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreLoad<T> {
    Loaded(T),
    /// No file on disk.
    Missing,
    /// File exists but could not be read or parsed.
    Malformed(String),
}

impl<T> StoreLoad<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            StoreLoad::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

/// Which store an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Pattern,
}

/// Result of a single record update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Record is deprecated; nothing changed.
    Ignored,
    UnknownId,
    /// Store file is malformed; nothing changed.
    StoreUnavailable,
}

pub fn load_memories(path: &Path) -> StoreLoad<MemoryFile> {
    load_store(path, "memories")
}

pub fn load_patterns(path: &Path) -> StoreLoad<PatternFile> {
    load_store(path, "patterns")
}

fn load_store<T: DeserializeOwned>(path: &Path, label: &str) -> StoreLoad<T> {
    if !path.exists() {
        debug!(path = %path.display(), store = label, "store not on file");
        return StoreLoad::Missing;
    }
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(path = %path.display(), store = label, err = %err, "failed to read store");
            return StoreLoad::Malformed(format!("read {}: {err}", path.display()));
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => StoreLoad::Loaded(value),
        Err(err) => {
            warn!(path = %path.display(), store = label, err = %err, "failed to parse store");
            StoreLoad::Malformed(format!("parse {}: {err}", path.display()))
        }
    }
}

pub fn write_memory_file(path: &Path, file: &MemoryFile) -> Result<()> {
    write_json_atomic(path, file)
}

pub fn write_pattern_file(path: &Path, file: &PatternFile) -> Result<()> {
    write_json_atomic(path, file)
}

/// Project-wide handle over both stores.
///
/// Passed explicitly to prompt assembly and to the update path; there is no
/// ambient store state.
#[derive(Debug, Clone)]
pub struct ReputationStore {
    project: String,
    memories_path: PathBuf,
    patterns_path: PathBuf,
    memories: StoreLoad<MemoryFile>,
    patterns: StoreLoad<PatternFile>,
    memories_dirty: bool,
    patterns_dirty: bool,
}

impl ReputationStore {
    pub fn open(paths: &ProjectPaths) -> Self {
        Self::open_at(
            paths.project_name(),
            paths.memories_path.clone(),
            paths.patterns_path.clone(),
        )
    }

    pub fn open_at(project: String, memories_path: PathBuf, patterns_path: PathBuf) -> Self {
        let memories = load_memories(&memories_path);
        let patterns = load_patterns(&patterns_path);
        Self {
            project,
            memories_path,
            patterns_path,
            memories,
            patterns,
            memories_dirty: false,
            patterns_dirty: false,
        }
    }

    /// Re-read both files; the agent may have edited them during a call.
    pub fn reload(&mut self) {
        self.memories = load_memories(&self.memories_path);
        self.patterns = load_patterns(&self.patterns_path);
        self.memories_dirty = false;
        self.patterns_dirty = false;
    }

    pub fn memories(&self) -> &StoreLoad<MemoryFile> {
        &self.memories
    }

    pub fn patterns(&self) -> &StoreLoad<PatternFile> {
        &self.patterns
    }

    /// Prompt block for memories, or a one-line notice when unavailable.
    pub fn memories_block(&self) -> String {
        match &self.memories {
            StoreLoad::Loaded(file) => {
                let formatted = format_memories(&file.memories);
                if formatted.is_empty() {
                    "No active memories on file.".to_string()
                } else {
                    formatted
                }
            }
            StoreLoad::Missing => "No memories on file.".to_string(),
            StoreLoad::Malformed(_) => {
                "Memory store failed to parse; proceeding without it.".to_string()
            }
        }
    }

    /// Prompt block for patterns, or a one-line notice when unavailable.
    pub fn patterns_block(&self) -> String {
        match &self.patterns {
            StoreLoad::Loaded(file) => {
                let formatted = format_patterns(&file.patterns);
                if formatted.is_empty() {
                    "No active patterns on file.".to_string()
                } else {
                    formatted
                }
            }
            StoreLoad::Missing => "No patterns on file.".to_string(),
            StoreLoad::Malformed(_) => {
                "Pattern store failed to parse; proceeding without it.".to_string()
            }
        }
    }

    /// Warnings worth surfacing to the operator.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let StoreLoad::Malformed(reason) = &self.memories {
            warnings.push(format!("memory store unavailable: {reason}"));
        }
        if let StoreLoad::Malformed(reason) = &self.patterns {
            warnings.push(format!("pattern store unavailable: {reason}"));
        }
        warnings
    }

    /// Apply a reinforce/contradict/deprecate update in memory. Call
    /// [`ReputationStore::save`] to persist.
    pub fn update(
        &mut self,
        kind: StoreKind,
        id: &str,
        action: UpdateAction,
        reason: &str,
        now: &str,
    ) -> UpdateOutcome {
        let outcome = match kind {
            StoreKind::Memory => match &mut self.memories {
                StoreLoad::Loaded(file) => update_in(&mut file.memories, id, action, reason, now),
                StoreLoad::Missing => UpdateOutcome::UnknownId,
                StoreLoad::Malformed(_) => UpdateOutcome::StoreUnavailable,
            },
            StoreKind::Pattern => match &mut self.patterns {
                StoreLoad::Loaded(file) => update_in(&mut file.patterns, id, action, reason, now),
                StoreLoad::Missing => UpdateOutcome::UnknownId,
                StoreLoad::Malformed(_) => UpdateOutcome::StoreUnavailable,
            },
        };
        if outcome == UpdateOutcome::Applied {
            match kind {
                StoreKind::Memory => self.memories_dirty = true,
                StoreKind::Pattern => self.patterns_dirty = true,
            }
        }
        debug!(?kind, id, ?action, ?outcome, "reputation update");
        outcome
    }

    /// Record a new active memory. Returns its id, or `None` when the memory
    /// store is malformed.
    pub fn record_observation(
        &mut self,
        kind: MemoryType,
        content: &str,
        context: &str,
        score: f64,
        source: &str,
        now: &str,
    ) -> Option<String> {
        if matches!(self.memories, StoreLoad::Missing) {
            self.memories = StoreLoad::Loaded(MemoryFile::empty(&self.project, now));
        }
        let StoreLoad::Loaded(file) = &mut self.memories else {
            return None;
        };
        let id = next_memory_id(&file.memories);
        file.memories.push(Memory {
            id: id.clone(),
            kind,
            content: content.trim().to_string(),
            context: context.trim().to_string(),
            source: source.to_string(),
            confidence: Confidence {
                score: clamp_score(score),
                reasoning: "recorded by review".to_string(),
            },
            reinforcement_count: 0,
            status: RecordStatus::Active,
            created: now.to_string(),
            last_updated: now.to_string(),
        });
        self.memories_dirty = true;
        Some(id)
    }

    /// Write back every store changed since the last load. Each write is a
    /// complete file.
    pub fn save(&mut self, now: &str) -> Result<()> {
        if self.memories_dirty {
            let StoreLoad::Loaded(file) = &mut self.memories else {
                return Err(anyhow!("memory store changed while unavailable"));
            };
            file.last_updated = now.to_string();
            write_memory_file(&self.memories_path, file)?;
            self.memories_dirty = false;
        }
        if self.patterns_dirty {
            let StoreLoad::Loaded(file) = &mut self.patterns else {
                return Err(anyhow!("pattern store changed while unavailable"));
            };
            file.last_updated = now.to_string();
            write_pattern_file(&self.patterns_path, file)?;
            self.patterns_dirty = false;
        }
        Ok(())
    }
}

fn update_in<R: ReputationRecord>(
    records: &mut [R],
    id: &str,
    action: UpdateAction,
    reason: &str,
    now: &str,
) -> UpdateOutcome {
    let Some(record) = records.iter_mut().find(|r| r.id() == id) else {
        return UpdateOutcome::UnknownId;
    };
    if apply_update(record, action, reason, now) {
        UpdateOutcome::Applied
    } else {
        UpdateOutcome::Ignored
    }
}
