use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::RunnerResult;
use crate::learning::recent::ActionRecord;
use crate::learning::ring::RingLog;
use crate::perception::classifier::{ObstacleInfo, ObstacleKind};
use crate::perception::types::{Point, TagClass};

pub const BONUS_PATTERNS_CAP: usize = 100;
pub const STUCK_PATTERNS_CAP: usize = 50;

/// Failure count above which a scenario is avoided (when failures also
/// outnumber successes).
const AVERSION_FLOOR: u32 = 2;

/// Scenario key for "a bonus reward competes with ordinary candidates",
/// parameterized by the concurrent candidate count.
pub fn concurrency_key(target: TagClass, candidate_count: usize) -> String {
    format!("{}_bonus_with_obstacle_{}", target.key_name(), candidate_count)
}

/// Scenario key under which an interaction outcome is counted.
pub fn outcome_key(target: TagClass, action: &str, kind: ObstacleKind) -> String {
    format!("{}_{}_{}", target.key_name(), action, kind.key_name())
}

/// The `n` a concurrency key is parameterized by: candidates of the same
/// target class in the detection pass, the obstacle itself included. Readers
/// and writers of concurrency keys must agree on this count.
pub fn concurrent_class_count(target: TagClass, candidates: &[ObstacleInfo]) -> usize {
    candidates.iter().filter(|o| o.target == target).count()
}

/// Context captured whenever a bonus-reward interaction resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub target: TagClass,
    pub is_idle: bool,
    pub secondary_count: usize,
    pub primary_visible: bool,
}

/// Context captured at the moment stuck was declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckRecord {
    pub timestamp: DateTime<Utc>,
    pub position: Option<Point>,
    pub recent_actions: Vec<ActionRecord>,
    pub secondary_count: usize,
    pub primary_visible: bool,
}

/// Persisted success/failure statistics plus bounded pattern logs. Loaded at
/// agent construction, flushed periodically and at shutdown. Counters are
/// never reset from inside the agent.
#[derive(Debug, Serialize, Deserialize)]
pub struct LearningStore {
    successful_actions: HashMap<String, u32>,
    failed_actions: HashMap<String, u32>,
    bonus_patterns: RingLog<PatternRecord>,
    stuck_patterns: RingLog<StuckRecord>,
}

impl Default for LearningStore {
    fn default() -> Self {
        Self {
            successful_actions: HashMap::new(),
            failed_actions: HashMap::new(),
            bonus_patterns: RingLog::with_capacity(BONUS_PATTERNS_CAP),
            stuck_patterns: RingLog::with_capacity(STUCK_PATTERNS_CAP),
        }
    }
}

impl LearningStore {
    /// Load from disk, falling back to an empty store on a missing or
    /// unreadable file. A corrupt store is not worth aborting a run over.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no learning store on disk, starting fresh");
            return Self::default();
        }
        match std::fs::read_to_string(path).map_err(display_err).and_then(|content| {
            serde_json::from_str::<LearningStore>(&content).map_err(display_err)
        }) {
            Ok(store) => {
                tracing::info!(
                    path = %path.display(),
                    scenarios = store.successful_actions.len() + store.failed_actions.len(),
                    "learning store loaded"
                );
                store
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load learning store, starting fresh");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> RunnerResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "learning store flushed");
        Ok(())
    }

    pub fn record_success(&mut self, key: &str) {
        *self.successful_actions.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn record_failure(&mut self, key: &str) {
        *self.failed_actions.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn successes(&self, key: &str) -> u32 {
        self.successful_actions.get(key).copied().unwrap_or(0)
    }

    pub fn failures(&self, key: &str) -> u32 {
        self.failed_actions.get(key).copied().unwrap_or(0)
    }

    /// Learned aversion: the scenario has failed strictly more often than it
    /// succeeded, and more than `AVERSION_FLOOR` times overall.
    pub fn is_averse(&self, key: &str) -> bool {
        let failures = self.failures(key);
        failures > self.successes(key) && failures > AVERSION_FLOOR
    }

    pub fn push_bonus_pattern(&mut self, record: PatternRecord) {
        self.bonus_patterns.push(record);
    }

    pub fn push_stuck_pattern(&mut self, record: StuckRecord) {
        self.stuck_patterns.push(record);
    }

    pub fn bonus_patterns(&self) -> impl Iterator<Item = &PatternRecord> {
        self.bonus_patterns.iter()
    }

    pub fn stuck_patterns(&self) -> impl Iterator<Item = &StuckRecord> {
        self.stuck_patterns.iter()
    }
}

fn display_err<E: std::fmt::Display>(e: E) -> String {
    e.to_string()
}
