use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::agent_engine::cooldown::{is_long_travel, CooldownTracker};
use crate::agent_engine::escalation::EscalationPolicy;
use crate::agent_engine::state::{AgentEvent, RunnerState};
use crate::config::RunnerConfig;
use crate::executor::interaction::InteractionExecutor;
use crate::learning::recent::{ActionRecord, RecentActionsLog, RecentlyClickedPositions};
use crate::learning::store::{
    concurrency_key, concurrent_class_count, outcome_key, LearningStore, PatternRecord,
    StuckRecord,
};
use crate::perception::capture_state;
use crate::perception::classifier::{classify, ObstacleInfo};
use crate::perception::traits::Perception;
use crate::perception::types::{GameSnapshot, TagClass};
use crate::recovery::strategy::{choose_strategy, rotate_to_find, RecoveryStrategy};
use crate::recovery::stuck::StuckDetector;
use crate::selection::select_obstacle;

/// Rotations tried from the in-loop search and fallback paths; stuck
/// recovery uses the larger count.
const SEARCH_ROTATIONS: u32 = 2;
const RECOVERY_ROTATIONS: u32 = 4;
const SEARCH_LOG_EVERY: u32 = 10;

/// The control loop: sense, decide, act, verify, record, strictly in that
/// order, single task, with explicit sleeps as the only suspension points.
pub struct RunnerEngine<P: Perception> {
    perception: P,
    config: RunnerConfig,
    state: RunnerState,
    store: LearningStore,
    store_path: PathBuf,
    escalation: EscalationPolicy,
    stuck: StuckDetector,
    cooldown: CooldownTracker,
    recent_actions: RecentActionsLog,
    recently_clicked: RecentlyClickedPositions,
    event_rx: mpsc::Receiver<AgentEvent>,
    progress_tx: watch::Sender<f64>,
    session_id: uuid::Uuid,
    last_snapshot: GameSnapshot,
    recorded_since_flush: u32,
}

impl<P: Perception> RunnerEngine<P> {
    pub fn new(
        perception: P,
        config: RunnerConfig,
        event_rx: mpsc::Receiver<AgentEvent>,
        progress_tx: watch::Sender<f64>,
    ) -> Self {
        let store_path = config.learning.resolve_store_path();
        let store = LearningStore::load(&store_path);
        let escalation = EscalationPolicy::new(config.escalation.clone());
        let stuck = StuckDetector::new(&config.thresholds);
        let cooldown = CooldownTracker::new(&config.long_travel);
        let recently_clicked = RecentlyClickedPositions::new(
            Duration::from_secs_f64(config.thresholds.recent_click_ttl_secs),
            config.thresholds.recently_clicked_radius,
        );
        Self {
            perception,
            config,
            state: RunnerState::Searching,
            store,
            store_path,
            escalation,
            stuck,
            cooldown,
            recent_actions: RecentActionsLog::new(),
            recently_clicked,
            event_rx,
            progress_tx,
            session_id: uuid::Uuid::new_v4(),
            last_snapshot: GameSnapshot::default(),
            recorded_since_flush: 0,
        }
    }

    pub fn store(&self) -> &LearningStore {
        &self.store
    }

    pub fn escalation(&self) -> &EscalationPolicy {
        &self.escalation
    }

    /// Drive the loop until the time budget runs out, a termination bound
    /// trips, or the caller sends a stop event. Returns the terminal state.
    pub async fn run(&mut self, time_budget: Duration) -> RunnerState {
        let start = Instant::now();
        tracing::info!(
            session = %self.session_id,
            budget_secs = time_budget.as_secs(),
            "runner loop starting"
        );
        self.state = RunnerState::Searching;

        loop {
            if self.drain_stop_events() {
                self.terminate("stopped by caller");
            }
            if !self.state.is_terminated() && start.elapsed() >= time_budget {
                let _ = self.progress_tx.send(1.0);
                self.terminate("time budget exhausted");
            }
            if self.state.is_terminated() {
                break;
            }
            let fraction = (start.elapsed().as_secs_f64() / time_budget.as_secs_f64()).min(1.0);
            let _ = self.progress_tx.send(fraction);
            self.cooldown.refresh();

            match self.state.clone() {
                RunnerState::Searching => self.step_searching().await,
                RunnerState::StuckRecovery => self.step_stuck_recovery().await,
                RunnerState::LongTravelWait => self.step_long_travel_wait().await,
                RunnerState::Interacting {
                    obstacle,
                    candidates,
                } => self.step_interacting(obstacle, candidates).await,
                RunnerState::Terminated { .. } => break,
            }
        }

        self.flush_store();
        if let RunnerState::Terminated { reason } = &self.state {
            tracing::info!(session = %self.session_id, reason = %reason, "runner loop ended");
        }
        self.state.clone()
    }

    // ── Searching ─────────────────────────────────────────────────────────

    async fn step_searching(&mut self) {
        let snapshot = capture_state(&self.perception, &self.config.labels).await;
        if self.stuck.observe(&snapshot) {
            tracing::warn!("stuck condition declared");
            self.record_stuck_pattern(&snapshot);
            self.last_snapshot = snapshot;
            self.state = RunnerState::StuckRecovery;
            return;
        }

        let candidates = self.detect_candidates().await;
        if candidates.is_empty() {
            let misses = self.escalation.record_search_failure();
            if misses % SEARCH_LOG_EVERY == 0 {
                tracing::info!(misses, "searching for tagged candidates");
            }
            if self.escalation.should_rotate_search() {
                tracing::info!("no candidates for a while, rotating camera");
                if self
                    .rotate(SEARCH_ROTATIONS)
                    .await
                {
                    self.escalation.reset_search_failures();
                    return;
                }
            }
            if let Some(reason) = self.escalation.should_terminate() {
                self.terminate(reason);
                return;
            }
            tokio::time::sleep(Duration::from_millis(self.config.timing.empty_search_ms)).await;
            return;
        }
        self.escalation.reset_search_failures();

        match select_obstacle(&candidates, &snapshot, &self.store) {
            Some(obstacle) => {
                self.last_snapshot = snapshot;
                if is_long_travel(&obstacle, &self.config.long_travel) && self.cooldown.is_active()
                {
                    self.state = RunnerState::LongTravelWait;
                } else {
                    self.state = RunnerState::Interacting {
                        obstacle,
                        candidates,
                    };
                }
            }
            None => {
                tracing::info!("no suitable candidate, rotating camera");
                if !self.rotate(SEARCH_ROTATIONS).await {
                    tokio::time::sleep(Duration::from_millis(
                        self.config.timing.empty_search_ms / 2,
                    ))
                    .await;
                }
            }
        }
    }

    // ── Stuck recovery ────────────────────────────────────────────────────

    async fn step_stuck_recovery(&mut self) {
        let strategy = choose_strategy(&self.recent_actions);
        tracing::info!(?strategy, "running stuck recovery");
        let recovered = match strategy {
            RecoveryStrategy::RotateCamera => self.rotate(RECOVERY_ROTATIONS).await,
            RecoveryStrategy::RotateOrTrySecondary => self.try_secondary_then_rotate().await,
        };

        if recovered {
            self.stuck.reset();
            self.escalation.reset_recovery_failures();
            self.state = RunnerState::Searching;
            return;
        }

        tokio::time::sleep(Duration::from_millis(self.config.timing.stuck_wait_ms)).await;
        self.escalation.record_recovery_failure();
        if let Some(reason) = self.escalation.should_terminate() {
            self.terminate(reason);
            return;
        }
        self.state = RunnerState::Searching;
    }

    /// Recovery for a failed bonus attempt: interact with any secondary
    /// candidate not clicked recently, then fall back to rotation.
    async fn try_secondary_then_rotate(&mut self) -> bool {
        let candidates = self.detect_candidates().await;
        if let Some(mut fallback) = self.pick_secondary_fallback(&candidates) {
            let pre = self.last_snapshot.clone();
            if self.attempt(&mut fallback, &pre, &candidates).await {
                return true;
            }
        }
        self.rotate(RECOVERY_ROTATIONS).await
    }

    // ── Long-travel wait ──────────────────────────────────────────────────

    async fn step_long_travel_wait(&mut self) {
        if self.cooldown.is_active() {
            self.cooldown.log_waiting();
            tokio::time::sleep(Duration::from_millis(self.config.timing.deferral_poll_ms)).await;
        }
        self.state = RunnerState::Searching;
    }

    // ── Interacting ───────────────────────────────────────────────────────

    async fn step_interacting(
        &mut self,
        mut obstacle: ObstacleInfo,
        candidates: Vec<ObstacleInfo>,
    ) {
        let pre = self.last_snapshot.clone();
        let success = self.attempt(&mut obstacle, &pre, &candidates).await;

        if success {
            self.escalation.reset_interaction_failures();
        } else {
            self.run_failure_fallbacks(obstacle, &pre, &candidates).await;
            if let Some(reason) = self.escalation.should_terminate() {
                self.terminate(reason);
                return;
            }
        }

        tokio::time::sleep(Duration::from_millis(self.config.timing.action_pace_ms)).await;
        if !self.state.is_terminated() {
            self.state = RunnerState::Searching;
        }
    }

    /// In-loop fallbacks after a failed primary-target interaction, in the
    /// order they are tried: rotate to reveal the next obstacle, retry the
    /// same target once, then try a secondary candidate.
    async fn run_failure_fallbacks(
        &mut self,
        mut obstacle: ObstacleInfo,
        pre: &GameSnapshot,
        candidates: &[ObstacleInfo],
    ) {
        let failures = self.escalation.record_interaction_failure();
        if !obstacle.is_primary() {
            return;
        }

        if failures <= 2 {
            tracing::info!("primary marker unchanged, rotating to find the next obstacle");
            if self.rotate(SEARCH_ROTATIONS).await {
                tokio::time::sleep(Duration::from_secs(1)).await;
                return;
            }
        }

        if failures == 1 {
            tracing::info!("retrying the same target once, click may not have registered");
            tokio::time::sleep(Duration::from_secs(1)).await;
            if self.attempt(&mut obstacle, pre, candidates).await {
                self.escalation.reset_interaction_failures();
                return;
            }
            // The retry outcome is recorded in the store by `attempt`; the
            // failure counter moves once per loop pass.
        }

        if failures <= 3 {
            tracing::info!("trying a secondary-target candidate as fallback");
            let fresh = self.detect_candidates().await;
            if let Some(mut fallback) = self.pick_secondary_fallback(&fresh) {
                if self.attempt(&mut fallback, pre, &fresh).await {
                    self.escalation.reset_interaction_failures();
                }
            } else {
                tracing::info!("no secondary candidates left to fall back to");
            }
        }
    }

    // ── Shared helpers ────────────────────────────────────────────────────

    /// One full detection pass, classified. Sensing faults degrade to an
    /// empty pass.
    async fn detect_candidates(&self) -> Vec<ObstacleInfo> {
        let primary = self
            .perception
            .detect(TagClass::Primary)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "primary detection failed");
                Vec::new()
            });
        let secondary = self
            .perception
            .detect(TagClass::Secondary)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "secondary detection failed");
                Vec::new()
            });
        classify(&primary, &secondary)
    }

    /// Closest secondary, non-bonus candidate whose position has not been
    /// clicked recently.
    fn pick_secondary_fallback(&mut self, candidates: &[ObstacleInfo]) -> Option<ObstacleInfo> {
        let mut best: Option<&ObstacleInfo> = None;
        for obs in candidates {
            if obs.is_primary() || obs.kind.is_bonus() {
                continue;
            }
            if self.recently_clicked.contains(obs.center) {
                continue;
            }
            if best.map_or(true, |b| obs.distance < b.distance) {
                best = Some(obs);
            }
        }
        best.cloned()
    }

    /// Click, verify, and record one obstacle; manages the long-travel
    /// cooldown around the outcome.
    async fn attempt(
        &mut self,
        obstacle: &mut ObstacleInfo,
        pre: &GameSnapshot,
        candidates: &[ObstacleInfo],
    ) -> bool {
        let long_travel = is_long_travel(obstacle, &self.config.long_travel);
        let success = InteractionExecutor::new(&self.perception, &self.config)
            .interact(obstacle, pre, candidates, long_travel, &self.store)
            .await;
        self.record_outcome(obstacle, success, pre, candidates);

        if long_travel && success {
            self.cooldown.open(&obstacle.action, obstacle.center);
        } else {
            // Covers failed long-travel clicks and every non-long-travel
            // attempt.
            self.cooldown.clear();
        }
        success
    }

    fn record_outcome(
        &mut self,
        obstacle: &ObstacleInfo,
        success: bool,
        pre: &GameSnapshot,
        concurrent: &[ObstacleInfo],
    ) {
        let key = outcome_key(obstacle.target, &obstacle.action, obstacle.kind);
        if success {
            self.store.record_success(&key);
        } else {
            self.store.record_failure(&key);
        }

        if obstacle.kind.is_bonus() {
            // Also count under the concurrency-parameterized key consulted
            // by the selection policy's aversion check. The `n` is the
            // same-class candidate count, matching what selection reads.
            let ckey = concurrency_key(
                obstacle.target,
                concurrent_class_count(obstacle.target, concurrent),
            );
            if success {
                self.store.record_success(&ckey);
            } else {
                self.store.record_failure(&ckey);
            }
            self.store.push_bonus_pattern(PatternRecord {
                timestamp: Utc::now(),
                success,
                target: obstacle.target,
                is_idle: pre.is_idle,
                secondary_count: pre.secondary_count,
                primary_visible: pre.primary_visible,
            });
        }

        self.recent_actions.push(ActionRecord {
            action: obstacle.action.clone(),
            target: obstacle.target,
            kind: obstacle.kind,
            success,
            timestamp: Utc::now(),
        });

        if success && obstacle.target == TagClass::Secondary {
            self.recently_clicked.record(obstacle.center);
        }

        self.recorded_since_flush += 1;
        if self.recorded_since_flush >= self.config.learning.flush_every {
            self.flush_store();
            self.recorded_since_flush = 0;
        }
    }

    fn record_stuck_pattern(&mut self, snapshot: &GameSnapshot) {
        self.store.push_stuck_pattern(StuckRecord {
            timestamp: Utc::now(),
            position: snapshot.primary_position,
            recent_actions: self.recent_actions.last_n(5),
            secondary_count: snapshot.secondary_count,
            primary_visible: snapshot.primary_visible,
        });
    }

    async fn rotate(&self, rotations: u32) -> bool {
        rotate_to_find(
            &self.perception,
            rotations,
            Duration::from_millis(self.config.timing.rotate_settle_ms),
        )
        .await
    }

    fn flush_store(&self) {
        if let Err(e) = self.store.save(&self.store_path) {
            tracing::warn!(path = %self.store_path.display(), error = %e, "learning store flush failed");
        }
    }

    fn terminate(&mut self, reason: &str) {
        self.state = RunnerState::Terminated {
            reason: reason.to_string(),
        };
    }

    /// True when a stop event is pending. A dropped handle is not a stop.
    fn drain_stop_events(&mut self) -> bool {
        matches!(self.event_rx.try_recv(), Ok(AgentEvent::Stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::classifier::ObstacleKind;
    use crate::perception::types::{BoundingBox, Point, TaggedObject};
    use crate::testkit::FakePerception;

    fn test_config(dir: &std::path::Path) -> RunnerConfig {
        let mut config = RunnerConfig::default();
        config.learning.store_path = Some(dir.join("learning.json"));
        config.timing.settle_ms = 1;
        config.timing.post_click_ms = 1;
        config.timing.check_interval_ms = 1;
        config.timing.empty_search_ms = 1;
        config.timing.stuck_wait_ms = 1;
        config.timing.rotate_settle_ms = 1;
        config.timing.deferral_poll_ms = 1;
        config.long_travel.check_interval_ms = 1;
        config
    }

    fn engine_with(
        fake: FakePerception,
        config: RunnerConfig,
    ) -> (RunnerEngine<FakePerception>, mpsc::Sender<AgentEvent>) {
        let (tx, rx) = mpsc::channel(4);
        let (progress_tx, _progress_rx) = watch::channel(0.0);
        (RunnerEngine::new(fake, config, rx, progress_tx), tx)
    }

    fn tagged_at(x: i32, y: i32, distance: f64) -> TaggedObject {
        TaggedObject {
            bbox: BoundingBox {
                x: x - 10,
                y: y - 10,
                width: 20,
                height: 20,
            },
            center: Point::new(x, y),
            distance,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_jump_resets_failure_counter() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakePerception::new();

        // Iteration 1: snapshot capture sees the primary marker, the
        // detection pass sees it again, the executor resolves "Jump", and
        // every post-click snapshot is empty, the strongest success signal.
        fake.push_primary(vec![tagged_at(100, 100, 50.0)]); // capture_state
        fake.push_primary(vec![tagged_at(100, 100, 50.0)]); // detection pass
        fake.push_action_label(None); // idle probe during capture
        fake.push_action_label(Some("Jump")); // label resolution at hover

        let (mut engine, _tx) = engine_with(fake, test_config(dir.path()));
        let state = engine.run(Duration::from_secs(6)).await;

        assert!(state.is_terminated());
        assert_eq!(engine.escalation().interaction_failures(), 0);
        assert_eq!(engine.store().successes("primary_Jump_obstacle"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn prolonged_absence_terminates_with_no_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakePerception::new();
        // Nothing is ever visible; every scripted queue stays empty.

        let (mut engine, _tx) = engine_with(fake, test_config(dir.path()));
        let state = engine.run(Duration::from_secs(3600)).await;

        match state {
            RunnerState::Terminated { reason } => {
                assert!(reason.contains("no candidates"), "got: {reason}");
            }
            other => panic!("expected termination, got {other:?}"),
        }
        assert!(engine.escalation().search_failures() > 120);
    }

    #[tokio::test(start_paused = true)]
    async fn long_travel_cooldown_defers_reclicks() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakePerception::new();
        // A distant primary marker that never goes away. The first click is
        // verified through the "action no longer offered at an unchanged
        // position" heuristic (all re-probes read no label); afterwards the
        // cooldown keeps the loop in deferral for the rest of the budget.
        fake.repeat_primary(vec![tagged_at(500, 500, 400.0)]);
        fake.push_action_label(None); // idle probe, iteration 1
        fake.push_action_label(Some("Climb")); // label resolution at hover

        let mut config = test_config(dir.path());
        // Collapse the extended window to its 3-check floor so the cooldown,
        // not the monitoring, dominates the budget.
        config.long_travel.monitor_secs = 0.004;
        let (mut engine, _tx) = engine_with(fake, config);
        let state = engine.run(Duration::from_secs(10)).await;

        assert!(state.is_terminated());
        assert_eq!(engine.perception.click_count(), 1);
        assert_eq!(engine.store().successes("primary_Climb_obstacle"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_expiry_allows_the_next_click() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakePerception::new();
        fake.repeat_primary(vec![tagged_at(500, 500, 400.0)]);
        fake.push_action_label(None);
        fake.push_action_label(Some("Climb"));

        let mut config = test_config(dir.path());
        config.long_travel.monitor_secs = 0.004;
        config.long_travel.cooldown_secs = 5.0;
        let (mut engine, _tx) = engine_with(fake, config);
        engine.run(Duration::from_secs(60)).await;

        assert!(engine.perception.click_count() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_recovery_tries_secondary_skipping_recently_clicked() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakePerception::new();
        // Pop order. Primary: searching capture (absent), recovery detection
        // pass (absent), verification capture (visible, the success signal).
        fake.push_primary(vec![]);
        fake.push_primary(vec![]);
        fake.push_primary(vec![tagged_at(400, 200, 90.0)]);
        // Secondary: searching capture (absent), then the recovery detection
        // pass finds two candidates. The closer one sits where a previous
        // click landed and must be skipped.
        fake.push_secondary(vec![]);
        fake.push_secondary(vec![tagged_at(100, 100, 20.0), tagged_at(300, 300, 80.0)]);
        fake.push_action_label(None); // idle probe, searching capture
        fake.push_action_label(Some("Cross")); // resolution at recovery hover

        let (mut engine, _tx) = engine_with(fake, test_config(dir.path()));
        // One more absent snapshot will declare stuck.
        engine.stuck.observe(&GameSnapshot {
            primary_visible: true,
            primary_position: Some(Point::new(100, 100)),
            is_idle: true,
            ..GameSnapshot::default()
        });
        engine.stuck.observe(&GameSnapshot::default());
        engine.stuck.observe(&GameSnapshot::default());
        // The last attempt was a failed bonus collection, which selects the
        // try-secondary strategy.
        engine.recent_actions.push(ActionRecord {
            action: "Take".into(),
            target: TagClass::Primary,
            kind: ObstacleKind::BonusReward,
            success: false,
            timestamp: Utc::now(),
        });
        engine.recently_clicked.record(Point::new(100, 100));

        let state = engine.run(Duration::from_secs(3600)).await;

        assert!(state.is_terminated());
        assert_eq!(engine.perception.click_count(), 1);
        assert_eq!(engine.perception.pointer_moves(), vec![Point::new(300, 300)]);
        assert_eq!(engine.store().successes("secondary_Cross_obstacle"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_retry_counts_one_interaction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakePerception::new();
        // Both the first attempt and the in-loop retry land on an excluded
        // fixture, so the iteration fails twice in a row.
        fake.push_primary(vec![tagged_at(100, 100, 50.0)]); // capture
        fake.push_primary(vec![tagged_at(100, 100, 50.0)]); // detection pass
        fake.push_action_label(None); // idle probe
        fake.push_fixture_label(Some("Ladder"));
        fake.push_fixture_label(Some("Ladder"));

        let (mut engine, _tx) = engine_with(fake, test_config(dir.path()));
        let state = engine.run(Duration::from_secs(10)).await;

        assert!(state.is_terminated());
        assert_eq!(engine.perception.click_count(), 0);
        // Two recorded outcomes, one failure-counter step.
        assert_eq!(engine.store().failures("primary_Click_obstacle"), 2);
        assert_eq!(engine.escalation().interaction_failures(), 1);
    }

    #[test]
    fn bonus_outcome_keys_off_same_class_count() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, _tx) = engine_with(FakePerception::new(), test_config(dir.path()));

        // Two primary candidates plus a secondary in the same pass; the
        // concurrency key must be parameterized by the primary count only,
        // the same n the selection-time aversion check reads.
        let candidates = classify(
            &[tagged_at(100, 100, 10.0), tagged_at(200, 200, 60.0)],
            &[tagged_at(50, 50, 5.0)],
        );
        let mut obstacle = candidates[0].clone();
        obstacle.kind = ObstacleKind::BonusReward;
        obstacle.action = "Take".into();
        let pre = GameSnapshot {
            is_idle: true,
            ..GameSnapshot::default()
        };

        engine.record_outcome(&obstacle, false, &pre, &candidates);

        assert_eq!(engine.store().failures(&concurrency_key(TagClass::Primary, 2)), 1);
        assert_eq!(engine.store().failures(&concurrency_key(TagClass::Primary, 3)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_event_terminates_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakePerception::new();

        let (mut engine, tx) = engine_with(fake, test_config(dir.path()));
        tx.send(AgentEvent::Stop).await.unwrap();
        let state = engine.run(Duration::from_secs(3600)).await;

        match state {
            RunnerState::Terminated { reason } => assert!(reason.contains("stopped")),
            other => panic!("expected termination, got {other:?}"),
        }
    }
}
