use crate::config::ThresholdConfig;
use crate::perception::types::{GameSnapshot, Point};

/// Watches the primary-target position across snapshots and declares stuck
/// when it stops moving, or when the target stays absent for too long.
#[derive(Debug)]
pub struct StuckDetector {
    last_position: Option<Point>,
    no_change_count: u32,
    absent_count: u32,
    position_delta: u32,
    no_change_threshold: u32,
    absent_threshold: u32,
}

impl StuckDetector {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            last_position: None,
            no_change_count: 0,
            absent_count: 0,
            position_delta: thresholds.stuck_position_delta,
            no_change_threshold: thresholds.stuck_no_change,
            absent_threshold: thresholds.stuck_absent,
        }
    }

    /// Feed one snapshot; returns true when stuck is declared.
    pub fn observe(&mut self, snapshot: &GameSnapshot) -> bool {
        let Some(current) = snapshot.primary_position else {
            // Absence is expected between obstacles and during travel; it
            // only counts toward stuck once a position has been seen, so a
            // cold start with nothing visible stays in the search path.
            if self.last_position.is_some() {
                self.absent_count += 1;
                return self.absent_count >= self.absent_threshold;
            }
            return false;
        };
        self.absent_count = 0;

        let Some(last) = self.last_position else {
            self.last_position = Some(current);
            self.no_change_count = 0;
            return false;
        };

        if last.manhattan(&current) < self.position_delta {
            self.no_change_count += 1;
        } else {
            self.no_change_count = 0;
            self.last_position = Some(current);
        }

        self.no_change_count >= self.no_change_threshold
    }

    /// Forget all progress tracking; called after a successful recovery.
    pub fn reset(&mut self) {
        self.last_position = None;
        self.no_change_count = 0;
        self.absent_count = 0;
    }
}
