use crate::learning::store::{concurrency_key, LearningStore};
use crate::perception::classifier::ObstacleInfo;
use crate::perception::types::{GameSnapshot, TagClass};

/// Pick the best obstacle to act on, or none.
///
/// Primary targets always outrank secondary ones. Within a target class,
/// ordinary obstacles outrank bonus rewards, bonus rewards that the store has
/// learned to avoid are excluded outright, and a bonus reward is only
/// eligible while the subject is idle. The final pick is the minimum-distance
/// candidate; ties resolve by iteration order, which is not deterministic
/// across detection cycles and is accepted as such.
pub fn select_obstacle(
    obstacles: &[ObstacleInfo],
    snapshot: &GameSnapshot,
    store: &LearningStore,
) -> Option<ObstacleInfo> {
    if obstacles.is_empty() {
        return None;
    }

    let primary: Vec<&ObstacleInfo> = obstacles.iter().filter(|o| o.is_primary()).collect();
    let secondary: Vec<&ObstacleInfo> = obstacles.iter().filter(|o| !o.is_primary()).collect();

    if !primary.is_empty() {
        if let Some(chosen) = select_within(&primary, TagClass::Primary, snapshot, store) {
            return Some(chosen.clone());
        }
        // The primary set was all bonus rewards we cannot take right now;
        // fall through to the secondary set.
    }

    if !secondary.is_empty() {
        if let Some(chosen) = select_within(&secondary, TagClass::Secondary, snapshot, store) {
            return Some(chosen.clone());
        }
    }

    None
}

fn select_within<'a>(
    candidates: &[&'a ObstacleInfo],
    target: TagClass,
    snapshot: &GameSnapshot,
    store: &LearningStore,
) -> Option<&'a ObstacleInfo> {
    let ordinary: Vec<&ObstacleInfo> = candidates
        .iter()
        .copied()
        .filter(|o| !o.kind.is_bonus())
        .collect();
    let mut bonus: Vec<&ObstacleInfo> = candidates
        .iter()
        .copied()
        .filter(|o| o.kind.is_bonus())
        .collect();

    if !bonus.is_empty() {
        let key = concurrency_key(target, candidates.len());
        if store.is_averse(&key) {
            tracing::info!(scenario = %key, "learned: skipping bonus reward candidates");
            bonus.clear();
        }
    }

    if !ordinary.is_empty() {
        return closest(&ordinary);
    }
    if !bonus.is_empty() {
        // Collecting a bonus reward needs a stationary subject.
        if snapshot.is_idle {
            return closest(&bonus);
        }
        tracing::debug!("bonus reward available but subject is not idle");
    }
    None
}

/// Minimum-distance candidate; the first seen wins ties.
fn closest<'a>(candidates: &[&'a ObstacleInfo]) -> Option<&'a ObstacleInfo> {
    candidates
        .iter()
        .copied()
        .fold(None, |best: Option<&ObstacleInfo>, obs| match best {
            Some(b) if b.distance <= obs.distance => Some(b),
            _ => Some(obs),
        })
}
