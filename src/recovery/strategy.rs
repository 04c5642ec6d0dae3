use std::time::Duration;

use crate::learning::recent::RecentActionsLog;
use crate::perception::traits::Perception;
use crate::perception::types::TagClass;

const ROTATION_DEGREES: i32 = 90;

/// How to get un-stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Rotate the camera until any candidate becomes visible.
    RotateCamera,
    /// A bonus-reward attempt just failed: prefer interacting with a
    /// secondary-target candidate before falling back to rotation.
    RotateOrTrySecondary,
}

/// Pick a recovery strategy from the most recent interaction attempt.
pub fn choose_strategy(recent: &RecentActionsLog) -> RecoveryStrategy {
    if let Some(last) = recent.last() {
        if last.kind.is_bonus() && !last.success {
            return RecoveryStrategy::RotateOrTrySecondary;
        }
    }
    RecoveryStrategy::RotateCamera
}

/// Rotate the camera in fixed steps, pausing after each for tags to
/// re-render, until any candidate of either class is visible. Adapter faults
/// are logged and count as "nothing found" for that rotation.
pub async fn rotate_to_find<P: Perception + ?Sized>(
    perception: &P,
    max_rotations: u32,
    settle: Duration,
) -> bool {
    for attempt in 1..=max_rotations {
        tracing::info!(attempt, max_rotations, "rotating camera to find candidates");
        if let Err(e) = perception.rotate_view(ROTATION_DEGREES).await {
            tracing::warn!(error = %e, "camera rotation failed");
            continue;
        }
        tokio::time::sleep(settle).await;

        if any_candidate_visible(perception).await {
            tracing::info!(attempt, "candidates visible after rotation");
            return true;
        }
    }
    false
}

async fn any_candidate_visible<P: Perception + ?Sized>(perception: &P) -> bool {
    for class in [TagClass::Primary, TagClass::Secondary] {
        match perception.detect(class).await {
            Ok(objs) if !objs.is_empty() => return true,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, ?class, "detection failed during rotation");
            }
        }
    }
    false
}
