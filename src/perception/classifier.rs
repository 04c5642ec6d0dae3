use serde::{Deserialize, Serialize};

use crate::perception::types::{BoundingBox, Point, TagClass, TaggedObject};

/// Action label assigned before the executor has hovered the obstacle and
/// resolved the real one.
pub const PLACEHOLDER_ACTION: &str = "Click";

/// Whether an obstacle is part of the course or a side collectible. Only
/// resolvable from hover text, never from geometry, so classification always
/// starts at `Ordinary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleKind {
    Ordinary,
    BonusReward,
}

impl ObstacleKind {
    pub fn is_bonus(&self) -> bool {
        matches!(self, ObstacleKind::BonusReward)
    }

    /// Short form used in scenario keys.
    pub fn key_name(&self) -> &'static str {
        match self {
            ObstacleKind::Ordinary => "obstacle",
            ObstacleKind::BonusReward => "bonus",
        }
    }
}

/// A candidate interactive target for one detection cycle. Recreated every
/// cycle; cross-cycle tracking keys off position, not identity.
#[derive(Debug, Clone)]
pub struct ObstacleInfo {
    pub target: TagClass,
    pub kind: ObstacleKind,
    pub action: String,
    pub bbox: BoundingBox,
    pub center: Point,
    pub distance: f64,
}

impl ObstacleInfo {
    fn from_tagged(obj: &TaggedObject, target: TagClass) -> Self {
        Self {
            target,
            kind: ObstacleKind::Ordinary,
            action: PLACEHOLDER_ACTION.into(),
            bbox: obj.bbox,
            center: obj.center,
            distance: obj.distance,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.target == TagClass::Primary
    }
}

/// Pure transformation from raw tagged-object sets to typed obstacles.
/// Empty input yields empty output, never an error.
pub fn classify(primary: &[TaggedObject], secondary: &[TaggedObject]) -> Vec<ObstacleInfo> {
    let mut obstacles = Vec::with_capacity(primary.len() + secondary.len());
    for obj in primary {
        obstacles.push(ObstacleInfo::from_tagged(obj, TagClass::Primary));
    }
    for obj in secondary {
        obstacles.push(ObstacleInfo::from_tagged(obj, TagClass::Secondary));
    }
    obstacles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(x: i32, y: i32, distance: f64) -> TaggedObject {
        TaggedObject {
            bbox: BoundingBox {
                x,
                y,
                width: 20,
                height: 20,
            },
            center: Point::new(x + 10, y + 10),
            distance,
        }
    }

    #[test]
    fn empty_input_empty_output() {
        assert!(classify(&[], &[]).is_empty());
    }

    #[test]
    fn assigns_target_class_and_placeholder_action() {
        let obstacles = classify(&[tagged(0, 0, 50.0)], &[tagged(100, 0, 80.0), tagged(0, 100, 120.0)]);
        assert_eq!(obstacles.len(), 3);
        assert_eq!(obstacles[0].target, TagClass::Primary);
        assert_eq!(obstacles[1].target, TagClass::Secondary);
        assert_eq!(obstacles[2].target, TagClass::Secondary);
        for obs in &obstacles {
            assert_eq!(obs.action, PLACEHOLDER_ACTION);
            assert_eq!(obs.kind, ObstacleKind::Ordinary);
        }
    }
}
