//! Reputation deltas written by the review role.
//!
//! The reviewer writes `reputation-updates.json` into the session directory.
//! The file is schema-checked, applied to the store and then renamed so it is
//! never applied twice. A file that fails validation is set aside, never
//! applied.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Draft, Validator};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::memory_store::{ReputationStore, StoreKind, StoreLoad, UpdateOutcome};
use crate::core::reputation::{MemoryType, UpdateAction};

const UPDATES_SCHEMA: &str = include_str!("../../schemas/reputation_updates.schema.json");

static UPDATES_VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(UPDATES_SCHEMA).map_err(|err| err.to_string())?;
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| err.to_string())
});

/// Confidence given to observations that do not state one.
const DEFAULT_OBSERVATION_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateBatch {
    #[serde(default)]
    pub updates: Vec<RecordUpdate>,
    #[serde(default)]
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordUpdate {
    pub store: StoreKind,
    pub id: String,
    pub action: UpdateAction,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Observation {
    #[serde(rename = "type")]
    pub kind: MemoryType,
    pub content: String,
    #[serde(default)]
    pub context: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    DEFAULT_OBSERVATION_CONFIDENCE
}

/// What happened when a batch was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub applied: usize,
    /// Updates aimed at deprecated records.
    pub ignored: usize,
    pub unknown_ids: Vec<String>,
    /// Updates skipped because their store file is malformed.
    pub unavailable: usize,
    /// Ids of newly recorded memories.
    pub recorded: Vec<String>,
}

impl ApplySummary {
    pub fn describe(&self) -> String {
        let mut line = format!(
            "{} update(s) applied, {} new memor{}",
            self.applied,
            self.recorded.len(),
            if self.recorded.len() == 1 { "y" } else { "ies" }
        );
        if self.ignored > 0 {
            line.push_str(&format!(", {} ignored (deprecated)", self.ignored));
        }
        if !self.unknown_ids.is_empty() {
            line.push_str(&format!(", unknown ids: {}", self.unknown_ids.join(", ")));
        }
        if self.unavailable > 0 {
            line.push_str(&format!(", {} skipped (store unavailable)", self.unavailable));
        }
        line
    }
}

/// Read and validate an updates file.
pub fn load_updates(path: &Path) -> StoreLoad<UpdateBatch> {
    if !path.exists() {
        return StoreLoad::Missing;
    }
    match read_and_validate(path) {
        Ok(batch) => StoreLoad::Loaded(batch),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "rejected reputation updates");
            StoreLoad::Malformed(format!("{err:#}"))
        }
    }
}

fn read_and_validate(path: &Path) -> Result<UpdateBatch> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    let validator = UPDATES_VALIDATOR
        .as_ref()
        .map_err(|err| anyhow!("invalid embedded updates schema: {err}"))?;
    let messages: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "schema validation failed:\n- {}",
            messages.join("\n- ")
        ));
    }
    serde_json::from_value(value).with_context(|| format!("deserialize {}", path.display()))
}

/// Apply every update and observation in `batch` to `store` (in memory).
pub fn apply_batch(store: &mut ReputationStore, batch: &UpdateBatch, now: &str) -> ApplySummary {
    let mut summary = ApplySummary::default();
    for update in &batch.updates {
        match store.update(update.store, &update.id, update.action, &update.reason, now) {
            UpdateOutcome::Applied => summary.applied += 1,
            UpdateOutcome::Ignored => summary.ignored += 1,
            UpdateOutcome::UnknownId => {
                warn!(id = %update.id, store = ?update.store, "reputation update for unknown id");
                summary.unknown_ids.push(update.id.clone());
            }
            UpdateOutcome::StoreUnavailable => summary.unavailable += 1,
        }
    }
    for observation in &batch.observations {
        match store.record_observation(
            observation.kind,
            &observation.content,
            &observation.context,
            observation.confidence,
            "review",
            now,
        ) {
            Some(id) => summary.recorded.push(id),
            None => summary.unavailable += 1,
        }
    }
    summary
}

/// Path an updates file is moved to once handled.
pub fn handled_path(path: &Path, label: &str, outcome: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reputation-updates".to_string());
    path.with_file_name(format!("{stem}.{label}.{outcome}.json"))
}

/// Apply the updates file at `path`, if any, then move it aside.
///
/// The store is reloaded first because the agent may have edited the store
/// files directly during its run. Returns `None` when there was no file or it
/// was rejected.
#[instrument(skip_all, fields(path = %path.display(), label))]
pub fn apply_updates_file(
    store: &mut ReputationStore,
    path: &Path,
    label: &str,
    now: &str,
) -> Result<Option<ApplySummary>> {
    let batch = match load_updates(path) {
        StoreLoad::Missing => return Ok(None),
        StoreLoad::Malformed(_) => {
            let rejected = handled_path(path, label, "rejected");
            fs::rename(path, &rejected)
                .with_context(|| format!("move rejected updates to {}", rejected.display()))?;
            return Ok(None);
        }
        StoreLoad::Loaded(batch) => batch,
    };

    store.reload();
    let summary = apply_batch(store, &batch, now);
    store.save(now)?;

    let applied = handled_path(path, label, "applied");
    fs::rename(path, &applied)
        .with_context(|| format!("move applied updates to {}", applied.display()))?;
    info!(summary = %summary.describe(), "reputation updates applied");
    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::init::{InitOptions, init_project};
    use crate::io::memory_store::load_patterns;

    fn setup() -> (tempfile::TempDir, crate::io::init::ProjectPaths, ReputationStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");
        let store = ReputationStore::open(&paths);
        (temp, paths, store)
    }

    #[test]
    fn valid_file_is_applied_and_moved_aside() {
        let (temp, paths, mut store) = setup();
        let path = temp.path().join("reputation-updates.json");
        fs::write(
            &path,
            r#"{
              "updates": [
                {"store": "pattern", "id": "pat-001", "action": "contradict", "reason": "verified every task"},
                {"store": "memory", "id": "mem-404", "action": "reinforce"}
              ],
              "observations": [
                {"type": "drift_event", "content": "Skipped the migration task", "context": "task 3", "confidence": 0.7}
              ]
            }"#,
        )
        .expect("write");

        let summary = apply_updates_file(&mut store, &path, "final-review", "t")
            .expect("apply")
            .expect("summary");

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.unknown_ids, vec!["mem-404".to_string()]);
        assert_eq!(summary.recorded, vec!["mem-001".to_string()]);
        assert!(!path.exists());
        assert!(
            temp.path()
                .join("reputation-updates.final-review.applied.json")
                .is_file()
        );

        let patterns = load_patterns(&paths.patterns_path);
        let pattern = patterns
            .loaded()
            .expect("loaded")
            .patterns
            .iter()
            .find(|p| p.id == "pat-001")
            .cloned()
            .expect("pattern");
        assert!((pattern.confidence.score - 0.4).abs() < 1e-12);
        assert!(pattern.confidence.reasoning.contains("verified every task"));
        assert!(store.memories_block().contains("Skipped the migration task"));
    }

    #[test]
    fn schema_violation_is_rejected_without_touching_stores() {
        let (temp, paths, mut store) = setup();
        let before = fs::read_to_string(&paths.patterns_path).expect("read");
        let path = temp.path().join("reputation-updates.json");
        fs::write(
            &path,
            r#"{"updates": [{"store": "pattern", "id": "pat-001", "action": "delete"}]}"#,
        )
        .expect("write");

        let result = apply_updates_file(&mut store, &path, "cross-check-1", "t").expect("apply");

        assert_eq!(result, None);
        assert_eq!(fs::read_to_string(&paths.patterns_path).expect("read"), before);
        assert!(
            temp.path()
                .join("reputation-updates.cross-check-1.rejected.json")
                .is_file()
        );
    }

    #[test]
    fn unparsable_file_reports_malformed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("reputation-updates.json");
        fs::write(&path, "not json").expect("write");
        assert!(matches!(load_updates(&path), StoreLoad::Malformed(_)));
    }

    #[test]
    fn missing_file_is_a_no_op() {
        let (temp, _, mut store) = setup();
        let path = temp.path().join("reputation-updates.json");
        assert_eq!(
            apply_updates_file(&mut store, &path, "final-review", "t").expect("apply"),
            None
        );
    }

    #[test]
    fn observation_confidence_defaults_and_unknown_fields_fail() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("u.json");
        fs::write(
            &path,
            r#"{"observations": [{"type": "decision", "content": "Chose SQLite"}]}"#,
        )
        .expect("write");
        match load_updates(&path) {
            StoreLoad::Loaded(batch) => {
                assert_eq!(batch.observations[0].confidence, DEFAULT_OBSERVATION_CONFIDENCE);
            }
            other => panic!("unexpected {other:?}"),
        }

        fs::write(&path, r#"{"observations": [], "extra": 1}"#).expect("write");
        assert!(matches!(load_updates(&path), StoreLoad::Malformed(_)));
    }

    #[test]
    fn summary_describes_outcomes() {
        let summary = ApplySummary {
            applied: 2,
            ignored: 1,
            unknown_ids: vec!["mem-9".to_string()],
            unavailable: 0,
            recorded: vec!["mem-004".to_string()],
        };
        assert_eq!(
            summary.describe(),
            "2 update(s) applied, 1 new memory, 1 ignored (deprecated), unknown ids: mem-9"
        );
    }
}
