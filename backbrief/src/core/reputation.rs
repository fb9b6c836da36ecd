//! Reputation records and the pure rules over them.
//!
//! Memories are project-scoped observations about how the agent behaves;
//! patterns are portable tendencies with a countermeasure. Both carry a
//! confidence score that moves only through [`reinforced`] and
//! [`contradicted`], and both are deprecated rather than deleted.
//!
//! Ranking for prompt injection groups memories by severity (confirmed false
//! beliefs first) and then by `priority = confidence × (reinforcements + 1)`.
//! Patterns rank by confidence alone.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Memories below this confidence are not worth prompt space.
pub const RELEVANCE_FLOOR: f64 = 0.2;
/// Fraction of the remaining distance to 1.0 gained per reinforcement.
pub const REINFORCE_RATE: f64 = 0.1;
/// Multiplier applied on contradiction.
pub const CONTRADICT_FACTOR: f64 = 0.8;
/// Upper bound for any stored score; reinforcement never reaches 1.0.
pub const MAX_CONFIDENCE: f64 = 1.0 - f64::EPSILON;

/// Kind of observation, in descending severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    FalseBelief,
    DriftEvent,
    Decision,
    Pattern,
    Observation,
}

impl MemoryType {
    /// Lower sorts first.
    pub fn severity_rank(self) -> u8 {
        match self {
            MemoryType::FalseBelief => 0,
            MemoryType::DriftEvent => 1,
            MemoryType::Decision => 2,
            MemoryType::Pattern => 3,
            MemoryType::Observation => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::FalseBelief => "false_belief",
            MemoryType::DriftEvent => "drift_event",
            MemoryType::Decision => "decision",
            MemoryType::Pattern => "pattern",
            MemoryType::Observation => "observation",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Active,
    Deprecated,
    Challenged,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Deprecated => "deprecated",
            RecordStatus::Challenged => "challenged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Project-scoped observation (`memories.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MemoryType,
    pub content: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub source: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub reinforcement_count: u32,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub last_updated: String,
}

/// Portable behavioral tendency (`patterns.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub context: String,
    pub countermeasure: String,
    #[serde(default)]
    pub origin: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub reinforcement_count: u32,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub last_updated: String,
}

/// `memories.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFile {
    pub schema_version: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub memories: Vec<Memory>,
}

/// `patterns.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFile {
    pub schema_version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
}

pub const SCHEMA_VERSION: &str = "1.0";

impl MemoryFile {
    pub fn empty(project: &str, now: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            project: project.to_string(),
            created: now.to_string(),
            last_updated: now.to_string(),
            memories: Vec::new(),
        }
    }
}

impl PatternFile {
    pub fn empty(now: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            description: "Portable agent behavior patterns".to_string(),
            last_updated: now.to_string(),
            patterns: Vec::new(),
        }
    }
}

/// Clamp any externally written score into `[0, MAX_CONFIDENCE]`.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, MAX_CONFIDENCE)
}

/// `c + 0.1 × (1 − c)`, kept strictly below 1.
pub fn reinforced(score: f64) -> f64 {
    let score = clamp_score(score);
    clamp_score(score + REINFORCE_RATE * (1.0 - score))
}

/// `c × 0.8`, never negative.
pub fn contradicted(score: f64) -> f64 {
    clamp_score(clamp_score(score) * CONTRADICT_FACTOR)
}

pub fn priority(score: f64, reinforcement_count: u32) -> f64 {
    score * (f64::from(reinforcement_count) + 1.0)
}

/// Update applied to a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    Reinforce,
    Contradict,
    Deprecate,
}

/// Shared mutable surface of memories and patterns.
pub trait ReputationRecord {
    fn id(&self) -> &str;
    fn confidence_mut(&mut self) -> &mut Confidence;
    fn reinforcement_count_mut(&mut self) -> &mut u32;
    fn status_mut(&mut self) -> &mut RecordStatus;
    fn last_updated_mut(&mut self) -> &mut String;
}

macro_rules! impl_reputation_record {
    ($ty:ty) => {
        impl ReputationRecord for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn confidence_mut(&mut self) -> &mut Confidence {
                &mut self.confidence
            }
            fn reinforcement_count_mut(&mut self) -> &mut u32 {
                &mut self.reinforcement_count
            }
            fn status_mut(&mut self) -> &mut RecordStatus {
                &mut self.status
            }
            fn last_updated_mut(&mut self) -> &mut String {
                &mut self.last_updated
            }
        }
    };
}

impl_reputation_record!(Memory);
impl_reputation_record!(Pattern);

/// Apply one update to a record. Returns `false` when the record is already
/// deprecated and the update was ignored.
pub fn apply_update<R: ReputationRecord>(
    record: &mut R,
    action: UpdateAction,
    reason: &str,
    now: &str,
) -> bool {
    if *record.status_mut() == RecordStatus::Deprecated {
        return false;
    }
    match action {
        UpdateAction::Reinforce => {
            let confidence = record.confidence_mut();
            confidence.score = reinforced(confidence.score);
            *record.reinforcement_count_mut() += 1;
            if *record.status_mut() == RecordStatus::Challenged {
                *record.status_mut() = RecordStatus::Active;
            }
        }
        UpdateAction::Contradict => {
            let confidence = record.confidence_mut();
            confidence.score = contradicted(confidence.score);
            *record.status_mut() = RecordStatus::Challenged;
        }
        UpdateAction::Deprecate => {
            *record.status_mut() = RecordStatus::Deprecated;
        }
    }
    append_reasoning(record.confidence_mut(), action, reason);
    *record.last_updated_mut() = now.to_string();
    true
}

fn append_reasoning(confidence: &mut Confidence, action: UpdateAction, reason: &str) {
    let reason = reason.trim();
    if reason.is_empty() {
        return;
    }
    let label = match action {
        UpdateAction::Reinforce => "reinforced",
        UpdateAction::Contradict => "contradicted",
        UpdateAction::Deprecate => "deprecated",
    };
    if !confidence.reasoning.is_empty() {
        confidence.reasoning.push_str("; ");
    }
    let _ = write!(confidence.reasoning, "{label}: {reason}");
}

/// Next sequential `mem-NNN` id.
pub fn next_memory_id(memories: &[Memory]) -> String {
    let max = memories
        .iter()
        .filter_map(|m| m.id.strip_prefix("mem-"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("mem-{:03}", max.saturating_add(1))
}

/// Active, relevant memories in injection order.
pub fn rank_memories(memories: &[Memory]) -> Vec<&Memory> {
    let mut ranked: Vec<&Memory> = memories
        .iter()
        .filter(|m| m.status != RecordStatus::Deprecated)
        .filter(|m| m.confidence.score >= RELEVANCE_FLOOR)
        .collect();
    ranked.sort_by(|a, b| {
        a.kind
            .severity_rank()
            .cmp(&b.kind.severity_rank())
            .then_with(|| {
                let pa = priority(a.confidence.score, a.reinforcement_count);
                let pb = priority(b.confidence.score, b.reinforcement_count);
                pb.total_cmp(&pa)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
}

/// Non-deprecated patterns by confidence, highest first.
pub fn rank_patterns(patterns: &[Pattern]) -> Vec<&Pattern> {
    let mut ranked: Vec<&Pattern> = patterns
        .iter()
        .filter(|p| p.status != RecordStatus::Deprecated)
        .collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .score
            .total_cmp(&a.confidence.score)
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
}

/// Render ranked memories as prompt blocks. Empty input renders as "".
pub fn format_memories(memories: &[Memory]) -> String {
    let blocks: Vec<String> = rank_memories(memories)
        .into_iter()
        .map(|m| {
            let mut block = header(
                &m.id,
                m.kind.as_str(),
                m.confidence.score,
                m.reinforcement_count,
                m.status,
            );
            push_field(&mut block, "Source", &m.source);
            push_field(&mut block, "Context", &m.context);
            block.push('\n');
            block.push_str(m.content.trim());
            block
        })
        .collect();
    blocks.join("\n\n")
}

/// Render ranked patterns as prompt blocks. Empty input renders as "".
pub fn format_patterns(patterns: &[Pattern]) -> String {
    let blocks: Vec<String> = rank_patterns(patterns)
        .into_iter()
        .map(|p| {
            let mut block = header(
                &p.id,
                &p.category,
                p.confidence.score,
                p.reinforcement_count,
                p.status,
            );
            push_field(&mut block, "Origin", &p.origin);
            push_field(&mut block, "Context", &p.context);
            block.push('\n');
            block.push_str(p.content.trim());
            block.push_str("\n\nCountermeasure: ");
            block.push_str(p.countermeasure.trim());
            block
        })
        .collect();
    blocks.join("\n\n")
}

fn header(id: &str, kind: &str, score: f64, count: u32, status: RecordStatus) -> String {
    let percent = (score * 100.0).round();
    let mut line = format!("### [{id}] {kind} | confidence {percent:.0}% | reinforced {count}x");
    if status == RecordStatus::Challenged {
        line.push_str(" | challenged");
    }
    line.push('\n');
    line
}

fn push_field(block: &mut String, label: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    let _ = writeln!(block, "{label}: {value}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(id: &str, kind: MemoryType, score: f64, count: u32) -> Memory {
        Memory {
            id: id.to_string(),
            kind,
            content: format!("{id} content"),
            context: String::new(),
            source: "test".to_string(),
            confidence: Confidence {
                score,
                reasoning: String::new(),
            },
            reinforcement_count: count,
            status: RecordStatus::Active,
            created: String::new(),
            last_updated: String::new(),
        }
    }

    fn pattern(id: &str, score: f64) -> Pattern {
        Pattern {
            id: id.to_string(),
            category: "scope".to_string(),
            content: format!("{id} content"),
            context: String::new(),
            countermeasure: "ask first".to_string(),
            origin: "seeded".to_string(),
            confidence: Confidence {
                score,
                reasoning: String::new(),
            },
            reinforcement_count: 0,
            status: RecordStatus::Active,
            created: String::new(),
            last_updated: String::new(),
        }
    }

    fn ids(ranked: &[&Memory]) -> Vec<String> {
        ranked.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn false_belief_outranks_highly_reinforced_observation() {
        let memories = vec![
            memory("obs", MemoryType::Observation, 0.9, 5),
            memory("fb", MemoryType::FalseBelief, 0.3, 0),
        ];
        assert_eq!(ids(&rank_memories(&memories)), vec!["fb", "obs"]);
        let formatted = format_memories(&memories);
        let fb = formatted.find("[fb]").expect("fb block");
        let obs = formatted.find("[obs]").expect("obs block");
        assert!(fb < obs);
    }

    #[test]
    fn same_type_orders_by_priority() {
        let memories = vec![
            memory("low", MemoryType::Decision, 0.9, 0),
            memory("high", MemoryType::Decision, 0.5, 3),
            memory("mid", MemoryType::Decision, 0.6, 1),
        ];
        assert_eq!(
            ids(&rank_memories(&memories)),
            vec!["high", "mid", "low"]
        );
    }

    #[test]
    fn severity_order_is_fixed() {
        let memories = vec![
            memory("o", MemoryType::Observation, 0.9, 0),
            memory("p", MemoryType::Pattern, 0.9, 0),
            memory("d", MemoryType::Decision, 0.9, 0),
            memory("dr", MemoryType::DriftEvent, 0.9, 0),
            memory("f", MemoryType::FalseBelief, 0.9, 0),
        ];
        assert_eq!(
            ids(&rank_memories(&memories)),
            vec!["f", "dr", "d", "p", "o"]
        );
    }

    #[test]
    fn deprecated_and_low_confidence_memories_are_filtered() {
        let mut deprecated = memory("dep", MemoryType::FalseBelief, 0.9, 0);
        deprecated.status = RecordStatus::Deprecated;
        let memories = vec![
            deprecated,
            memory("noise", MemoryType::Observation, 0.19, 9),
            memory("floor", MemoryType::Observation, 0.2, 0),
        ];
        assert_eq!(ids(&rank_memories(&memories)), vec!["floor"]);
    }

    #[test]
    fn patterns_rank_by_confidence_only() {
        let mut deprecated = pattern("gone", 0.99);
        deprecated.status = RecordStatus::Deprecated;
        let mut reinforced_low = pattern("b", 0.4);
        reinforced_low.reinforcement_count = 10;
        let patterns = vec![reinforced_low, pattern("a", 0.7), deprecated];
        let ranked: Vec<&str> = rank_patterns(&patterns)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ranked, vec!["a", "b"]);
    }

    #[test]
    fn pattern_block_includes_countermeasure_and_origin() {
        let formatted = format_patterns(&[pattern("pat-1", 0.85)]);
        assert!(formatted.contains("### [pat-1] scope | confidence 85% | reinforced 0x"));
        assert!(formatted.contains("Origin: seeded"));
        assert!(formatted.contains("Countermeasure: ask first"));
    }

    #[test]
    fn formatting_does_not_mutate_records() {
        let memories = vec![memory("m", MemoryType::Decision, 0.5, 1)];
        let before = memories.clone();
        let _ = format_memories(&memories);
        assert_eq!(memories, before);
    }

    #[test]
    fn empty_store_formats_to_empty_string() {
        assert_eq!(format_memories(&[]), "");
        assert_eq!(format_patterns(&[]), "");
    }

    #[test]
    fn reinforcement_stays_below_one() {
        let mut score = 0.5;
        for _ in 0..10_000 {
            let next = reinforced(score);
            assert!(next >= score);
            assert!(next < 1.0);
            score = next;
        }
        assert!(reinforced(1.0) < 1.0);
        assert!(reinforced(5.0) < 1.0);
    }

    #[test]
    fn reinforcement_follows_diminishing_returns() {
        let score = reinforced(0.5);
        assert!((score - 0.55).abs() < 1e-12);
    }

    #[test]
    fn contradiction_strictly_decreases_and_stays_non_negative() {
        let mut score = 0.9;
        for _ in 0..1_000 {
            let next = contradicted(score);
            assert!(next >= 0.0);
            if score > 0.0 {
                assert!(next < score);
            }
            score = next;
        }
        assert_eq!(contradicted(-1.0), 0.0);
    }

    #[test]
    fn apply_update_tracks_count_status_and_reasoning() {
        let mut m = memory("m", MemoryType::Observation, 0.5, 0);
        assert!(apply_update(&mut m, UpdateAction::Contradict, "wrong twice", "t1"));
        assert_eq!(m.status, RecordStatus::Challenged);
        assert!((m.confidence.score - 0.4).abs() < 1e-12);

        assert!(apply_update(&mut m, UpdateAction::Reinforce, "seen again", "t2"));
        assert_eq!(m.status, RecordStatus::Active);
        assert_eq!(m.reinforcement_count, 1);
        assert_eq!(m.last_updated, "t2");
        assert_eq!(
            m.confidence.reasoning,
            "contradicted: wrong twice; reinforced: seen again"
        );
    }

    #[test]
    fn deprecated_records_ignore_further_updates() {
        let mut p = pattern("p", 0.5);
        assert!(apply_update(&mut p, UpdateAction::Deprecate, "obsolete", "t1"));
        assert_eq!(p.status, RecordStatus::Deprecated);
        assert!(!apply_update(&mut p, UpdateAction::Reinforce, "", "t2"));
        assert_eq!(p.confidence.score, 0.5);
        assert_eq!(p.last_updated, "t1");
    }

    #[test]
    fn next_memory_id_is_sequential() {
        let memories = vec![
            memory("mem-002", MemoryType::Decision, 0.5, 0),
            memory("custom", MemoryType::Decision, 0.5, 0),
        ];
        assert_eq!(next_memory_id(&memories), "mem-003");
        assert_eq!(next_memory_id(&[]), "mem-001");
    }

    #[test]
    fn next_memory_id_saturates_at_largest_id() {
        let memories = vec![memory("mem-4294967295", MemoryType::Decision, 0.5, 0)];
        assert_eq!(next_memory_id(&memories), "mem-4294967295");
    }

    #[test]
    fn memory_file_parses_agent_written_json() {
        let raw = r#"{
          "schema_version": "1.0",
          "project": "demo",
          "memories": [
            {"id": "mem-001", "type": "false_belief", "content": "Assumed tests exist",
             "confidence": {"score": 0.6}, "extra_field": true}
          ]
        }"#;
        let file: MemoryFile = serde_json::from_str(raw).expect("parse");
        assert_eq!(file.memories[0].kind, MemoryType::FalseBelief);
        assert_eq!(file.memories[0].status, RecordStatus::Active);
        assert_eq!(file.memories[0].reinforcement_count, 0);
    }
}
