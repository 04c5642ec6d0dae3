use std::time::Duration;

use crate::config::RunnerConfig;
use crate::errors::RunnerResult;
use crate::learning::store::{concurrency_key, concurrent_class_count, LearningStore};
use crate::perception::classifier::{ObstacleInfo, ObstacleKind, PLACEHOLDER_ACTION};
use crate::perception::traits::Perception;
use crate::perception::types::{GameSnapshot, LabelStyle, Point, TagClass};
use crate::perception::capture_state;

/// Performs the click on a chosen obstacle and verifies the outcome from
/// vision signals alone. There is no authoritative feedback channel: success
/// is inferred from how the tag markers move, vanish, or change label over a
/// bounded monitoring window.
pub struct InteractionExecutor<'a, P: Perception + ?Sized> {
    perception: &'a P,
    config: &'a RunnerConfig,
}

impl<'a, P: Perception + ?Sized> InteractionExecutor<'a, P> {
    pub fn new(perception: &'a P, config: &'a RunnerConfig) -> Self {
        Self { perception, config }
    }

    /// Interact with `obstacle` and classify the outcome. Resolves the
    /// obstacle's action label and bonus/ordinary kind in place as a side
    /// effect of hovering it.
    ///
    /// Never propagates an error: any adapter fault is logged and counted as
    /// a failed interaction.
    pub async fn interact(
        &self,
        obstacle: &mut ObstacleInfo,
        pre_state: &GameSnapshot,
        concurrent: &[ObstacleInfo],
        is_long_travel: bool,
        store: &LearningStore,
    ) -> bool {
        match self
            .try_interact(obstacle, pre_state, concurrent, is_long_travel, store)
            .await
        {
            Ok(success) => success,
            Err(e) => {
                tracing::warn!(action = %obstacle.action, error = %e, "interaction fault, treating as failure");
                false
            }
        }
    }

    async fn try_interact(
        &self,
        obstacle: &mut ObstacleInfo,
        pre_state: &GameSnapshot,
        concurrent: &[ObstacleInfo],
        is_long_travel: bool,
        store: &LearningStore,
    ) -> RunnerResult<bool> {
        let labels = &self.config.labels;
        let timing = &self.config.timing;

        // Hover the obstacle so its label text renders.
        self.perception.move_pointer(obstacle.center).await?;
        tokio::time::sleep(Duration::from_millis(timing.settle_ms)).await;

        // Transit fixtures look like obstacles but must never be clicked.
        if let Some(label) = self
            .perception
            .label_at_pointer(&labels.exclusion_labels, LabelStyle::Fixture)
            .await?
        {
            tracing::info!(label = %label, "skipping excluded fixture");
            return Ok(false);
        }

        // Resolve the real action label. No match keeps the placeholder but
        // the click is still attempted.
        if let Some(action) = self
            .perception
            .label_at_pointer(&labels.action_labels, LabelStyle::Action)
            .await?
        {
            obstacle.action = action;
        }

        // Bonus rewards are identified purely from hover text.
        obstacle.kind = self.resolve_kind(&obstacle.action).await?;

        if obstacle.kind.is_bonus() {
            // A bonus reward competing with ordinary candidates is skipped
            // outright once the store has learned it tends to fail.
            let ordinary_others = concurrent
                .iter()
                .any(|o| o.center != obstacle.center && !o.kind.is_bonus());
            if ordinary_others {
                let key = concurrency_key(
                    obstacle.target,
                    concurrent_class_count(obstacle.target, concurrent),
                );
                if store.is_averse(&key) {
                    tracing::info!(scenario = %key, "learned: skipping bonus reward, candidates present");
                    return Ok(false);
                }
            }

            if !pre_state.is_idle {
                tracing::info!("cannot collect bonus reward while mid-action");
                return Ok(false);
            }
        }

        let original_center = obstacle.center;
        let original_action = obstacle.action.clone();

        self.perception.click().await?;
        tokio::time::sleep(Duration::from_millis(timing.post_click_ms)).await;

        let (max_checks, check_interval) = self.monitoring_window(is_long_travel);
        if is_long_travel {
            tracing::info!(
                checks = max_checks,
                "monitoring long-travel interaction over an extended window"
            );
        }

        let mut last_state = GameSnapshot::default();
        for check in 0..max_checks {
            tokio::time::sleep(check_interval).await;
            let new_state = capture_state(self.perception, labels).await;
            let final_check = check + 1 == max_checks;

            let signal = match obstacle.target {
                TagClass::Primary => {
                    self.check_primary_signals(
                        pre_state,
                        &new_state,
                        original_center,
                        &original_action,
                        obstacle.bbox.largest_dimension(),
                        final_check,
                    )
                    .await
                }
                TagClass::Secondary => {
                    Ok(check_secondary_signals(pre_state, &new_state))
                }
            }?;

            match signal {
                Some(true) => {
                    tracing::info!(action = %obstacle.action, check, "interaction verified");
                    return Ok(true);
                }
                Some(false) => {
                    tracing::info!(action = %obstacle.action, "interaction failed (marker unchanged)");
                    return Ok(false);
                }
                None => {}
            }
            last_state = new_state;
        }

        // Window exhausted with no definite signal: one last distance check
        // against the pre-click marker position.
        if obstacle.target == TagClass::Primary {
            if let Some(verdict) = self
                .final_distance_check(pre_state, &last_state, &original_action)
                .await?
            {
                return Ok(verdict);
            }
        }

        tracing::info!(action = %obstacle.action, "could not confirm progress, treating as failure");
        Ok(false)
    }

    async fn resolve_kind(&self, action: &str) -> RunnerResult<ObstacleKind> {
        let labels = &self.config.labels;
        if action != labels.collect_action {
            return Ok(ObstacleKind::Ordinary);
        }
        let text = self
            .perception
            .pointer_text()
            .await?
            .unwrap_or_default()
            .to_lowercase();
        let is_bonus = labels.bonus_markers.iter().any(|m| text.contains(&m.to_lowercase()));
        Ok(if is_bonus {
            ObstacleKind::BonusReward
        } else {
            ObstacleKind::Ordinary
        })
    }

    fn monitoring_window(&self, is_long_travel: bool) -> (u32, Duration) {
        let timing = &self.config.timing;
        if !is_long_travel {
            return (
                timing.max_checks,
                Duration::from_millis(timing.check_interval_ms),
            );
        }
        let lt = &self.config.long_travel;
        let interval = Duration::from_millis(lt.check_interval_ms);
        // The post-click settle second is already spent; spread the rest of
        // the observation time across checks.
        let window = (lt.monitor_secs - 1.0).max(interval.as_secs_f64() * 3.0);
        let checks = (window / interval.as_secs_f64()) as u32;
        (checks.max(timing.max_checks), interval)
    }

    /// Success signals for a primary-target obstacle, in priority order.
    /// `Some(true)` = verified success, `Some(false)` = verified failure,
    /// `None` = keep watching.
    async fn check_primary_signals(
        &self,
        pre_state: &GameSnapshot,
        new_state: &GameSnapshot,
        original_center: Point,
        original_action: &str,
        obstacle_dimension: u32,
        final_check: bool,
    ) -> RunnerResult<Option<bool>> {
        let thresholds = &self.config.thresholds;

        // The marker system retires a completed objective; its disappearance
        // is the most reliable signal.
        if pre_state.primary_visible && !new_state.primary_visible {
            tracing::debug!("primary marker retired");
            return Ok(Some(true));
        }

        // Everything vanished after something was visible: objective done,
        // transitioning between objectives.
        if (pre_state.primary_visible || pre_state.secondary_visible)
            && !new_state.primary_visible
            && !new_state.secondary_visible
        {
            tracing::debug!("all markers gone, transitioning between objectives");
            return Ok(Some(true));
        }

        if !new_state.primary_visible {
            return Ok(None);
        }

        let primary_objects = self.perception.detect(TagClass::Primary).await?;
        let Some(current) = primary_objects.first() else {
            return Ok(None);
        };

        let moved = current.center.manhattan(&original_center);
        let size = obstacle_dimension.max(thresholds.moved_far_min);

        // Hover the marker that is active now and read its label.
        self.perception.move_pointer(current.center).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let new_action = self
            .perception
            .label_at_pointer(&self.config.labels.action_labels, LabelStyle::Action)
            .await?;

        // A different label means a different obstacle is active.
        if let Some(action) = &new_action {
            if action != original_action {
                tracing::debug!(from = %original_action, to = %action, "active obstacle changed");
                return Ok(Some(true));
            }
        }

        if moved as f64 > size as f64 * thresholds.moved_far_factor {
            tracing::debug!(moved, "marker moved well past the original obstacle");
            return Ok(Some(true));
        }

        // Same spot, same label. The marker can lag behind actual progress,
        // so only the final check is allowed to give a verdict, and it first
        // re-probes whether the original action is still offered at all.
        if moved < size / 2 && new_action.as_deref() == Some(original_action) {
            if final_check {
                let still_offered = self
                    .perception
                    .label_at_pointer(
                        std::slice::from_ref(&original_action.to_string()),
                        LabelStyle::Action,
                    )
                    .await?
                    .is_some();
                if !still_offered && original_action != PLACEHOLDER_ACTION {
                    // Known false-positive source: an unavailable action at
                    // an unchanged position is taken as progress.
                    tracing::debug!("original action no longer offered despite unmoved marker");
                    return Ok(Some(true));
                }
                tracing::debug!(moved, "marker unmoved and action still offered");
                return Ok(Some(false));
            }
        }

        Ok(None)
    }

    /// Final fallback after the window closes without a signal.
    async fn final_distance_check(
        &self,
        pre_state: &GameSnapshot,
        last_state: &GameSnapshot,
        original_action: &str,
    ) -> RunnerResult<Option<bool>> {
        let (Some(before), Some(after)) = (pre_state.primary_position, last_state.primary_position)
        else {
            return Ok(None);
        };

        let moved = before.manhattan(&after);
        if moved > self.config.thresholds.final_move_delta {
            tracing::debug!(moved, "marker moved significantly by the final check");
            return Ok(Some(true));
        }

        if moved == 0 {
            // Identical position: probe whether the action is even offered
            // there any more.
            let primary_objects = self.perception.detect(TagClass::Primary).await?;
            if let Some(obj) = primary_objects.first() {
                self.perception.move_pointer(obj.center).await?;
                tokio::time::sleep(Duration::from_millis(100)).await;
                let still_offered = self
                    .perception
                    .label_at_pointer(
                        std::slice::from_ref(&original_action.to_string()),
                        LabelStyle::Action,
                    )
                    .await?
                    .is_some();
                if !still_offered && original_action != PLACEHOLDER_ACTION {
                    tracing::debug!("action unavailable despite identical position");
                    return Ok(Some(true));
                }
            }
        }

        Ok(None)
    }
}

/// Success signals for a secondary-target obstacle.
fn check_secondary_signals(pre_state: &GameSnapshot, new_state: &GameSnapshot) -> Option<bool> {
    if new_state.primary_visible {
        tracing::debug!("primary marker appeared after secondary interaction");
        return Some(true);
    }
    let delta = new_state
        .secondary_count
        .abs_diff(pre_state.secondary_count);
    if delta > 1 {
        tracing::debug!(delta, "secondary marker count shifted");
        return Some(true);
    }
    None
}
