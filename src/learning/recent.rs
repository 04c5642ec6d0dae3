use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::learning::ring::RingLog;
use crate::perception::classifier::ObstacleKind;
use crate::perception::types::{Point, TagClass};

pub const RECENT_ACTIONS_CAP: usize = 20;

/// One interaction attempt, as remembered by the recovery selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: String,
    pub target: TagClass,
    pub kind: ObstacleKind,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Bounded log of the last interaction attempts. In-process only; the
/// persisted stuck patterns embed copies of the tail.
#[derive(Debug)]
pub struct RecentActionsLog {
    log: RingLog<ActionRecord>,
}

impl RecentActionsLog {
    pub fn new() -> Self {
        Self {
            log: RingLog::with_capacity(RECENT_ACTIONS_CAP),
        }
    }

    pub fn push(&mut self, record: ActionRecord) {
        self.log.push(record);
    }

    pub fn last(&self) -> Option<&ActionRecord> {
        self.log.last()
    }

    pub fn last_n(&self, n: usize) -> Vec<ActionRecord> {
        self.log.last_n(n).into_iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}

impl Default for RecentActionsLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Positions of successfully clicked secondary targets, remembered for a
/// fixed TTL so fallback paths do not loop on the same spot. Expired entries
/// are purged lazily on each read.
#[derive(Debug)]
pub struct RecentlyClickedPositions {
    entries: Vec<(Point, Instant)>,
    ttl: Duration,
    radius: u32,
}

impl RecentlyClickedPositions {
    pub fn new(ttl: Duration, radius: u32) -> Self {
        Self {
            entries: Vec::new(),
            ttl,
            radius,
        }
    }

    pub fn record(&mut self, position: Point) {
        self.purge();
        self.entries.push((position, Instant::now()));
    }

    /// True when `position` is within the exclusion radius of a live entry.
    pub fn contains(&mut self, position: Point) -> bool {
        self.purge();
        self.entries
            .iter()
            .any(|(p, _)| p.manhattan(&position) < self.radius)
    }

    fn purge(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|(_, at)| at.elapsed() < ttl);
    }
}
