use std::time::Duration;

use tokio::time::Instant;

use crate::config::LongTravelConfig;
use crate::perception::classifier::ObstacleInfo;
use crate::perception::types::Point;

/// A primary target far enough away that the interaction takes many seconds
/// of travel to visibly resolve.
pub fn is_long_travel(obstacle: &ObstacleInfo, config: &LongTravelConfig) -> bool {
    obstacle.is_primary() && obstacle.distance >= config.distance_threshold
}

#[derive(Debug, Clone)]
struct ActiveCooldown {
    until: Instant,
    action: String,
    position: Point,
}

/// At most one cooldown at a time, opened after a successful long-travel
/// click; while active, further long-travel selections are deferred instead
/// of re-clicked. Opening again overwrites, never queues.
#[derive(Debug)]
pub struct CooldownTracker {
    active: Option<ActiveCooldown>,
    duration: Duration,
    log_gap: Duration,
    last_log: Option<Instant>,
}

impl CooldownTracker {
    pub fn new(config: &LongTravelConfig) -> Self {
        Self {
            active: None,
            duration: Duration::from_secs_f64(config.cooldown_secs),
            log_gap: Duration::from_secs(config.wait_log_secs),
            last_log: None,
        }
    }

    pub fn open(&mut self, action: &str, position: Point) {
        tracing::info!(
            action = %action,
            wait_secs = self.duration.as_secs(),
            "long-travel obstacle clicked, deferring further clicks"
        );
        self.active = Some(ActiveCooldown {
            until: Instant::now() + self.duration,
            action: action.to_string(),
            position,
        });
        self.last_log = None;
    }

    pub fn clear(&mut self) {
        self.active = None;
        self.last_log = None;
    }

    /// Drop the cooldown once it has expired. Called at the top of every
    /// loop iteration.
    pub fn refresh(&mut self) {
        if let Some(active) = &self.active {
            if Instant::now() >= active.until {
                tracing::debug!(action = %active.action, "long-travel cooldown expired");
                self.clear();
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn target_position(&self) -> Option<Point> {
        self.active.as_ref().map(|a| a.position)
    }

    /// Throttled "still traveling" log line while deferring.
    pub fn log_waiting(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        let now = Instant::now();
        if let Some(last) = self.last_log {
            if now.duration_since(last) < self.log_gap {
                return;
            }
        }
        let remaining = active.until.saturating_duration_since(now).as_secs();
        tracing::info!(
            action = %active.action,
            remaining_secs = remaining,
            "still traveling toward long-travel obstacle"
        );
        self.last_log = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::classifier::classify;
    use crate::perception::types::{BoundingBox, TaggedObject};

    fn tracker(secs: f64) -> CooldownTracker {
        CooldownTracker::new(&LongTravelConfig {
            cooldown_secs: secs,
            ..LongTravelConfig::default()
        })
    }

    fn primary_at_distance(distance: f64) -> ObstacleInfo {
        classify(
            &[TaggedObject {
                bbox: BoundingBox {
                    x: 0,
                    y: 0,
                    width: 20,
                    height: 20,
                },
                center: Point::new(10, 10),
                distance,
            }],
            &[],
        )
        .remove(0)
    }

    #[test]
    fn long_travel_requires_primary_past_threshold() {
        let config = LongTravelConfig::default();
        assert!(is_long_travel(&primary_at_distance(230.0), &config));
        assert!(!is_long_travel(&primary_at_distance(229.0), &config));

        let secondary = classify(
            &[],
            &[TaggedObject {
                bbox: BoundingBox {
                    x: 0,
                    y: 0,
                    width: 20,
                    height: 20,
                },
                center: Point::new(10, 10),
                distance: 500.0,
            }],
        )
        .remove(0);
        assert!(!is_long_travel(&secondary, &config));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_expires_on_refresh() {
        let mut tracker = tracker(14.0);
        tracker.open("Climb", Point::new(5, 5));
        assert!(tracker.is_active());

        tokio::time::advance(Duration::from_secs(13)).await;
        tracker.refresh();
        assert!(tracker.is_active());

        tokio::time::advance(Duration::from_secs(2)).await;
        tracker.refresh();
        assert!(!tracker.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_overwrites_instead_of_queueing() {
        let mut tracker = tracker(10.0);
        tracker.open("Climb", Point::new(5, 5));
        tokio::time::advance(Duration::from_secs(8)).await;
        tracker.open("Jump", Point::new(50, 50));
        assert_eq!(tracker.target_position(), Some(Point::new(50, 50)));

        // The clock restarted with the second open.
        tokio::time::advance(Duration::from_secs(8)).await;
        tracker.refresh();
        assert!(tracker.is_active());
        tokio::time::advance(Duration::from_secs(3)).await;
        tracker.refresh();
        assert!(!tracker.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_the_cooldown() {
        let mut tracker = tracker(10.0);
        tracker.open("Climb", Point::new(5, 5));
        tracker.clear();
        assert!(!tracker.is_active());
    }
}
