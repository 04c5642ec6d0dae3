use serde::{Deserialize, Serialize};

/// A point in the adapter's pixel-analogous coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance; the movement tests all use this metric.
    pub fn manhattan(&self, other: &Point) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn center(&self) -> Point {
        Point::new(
            self.x + self.width as i32 / 2,
            self.y + self.height as i32 / 2,
        )
    }

    pub fn largest_dimension(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Visual tag classes the adapter can detect. Primary marks the single
/// correct next action; secondary marks plausible alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagClass {
    Primary,
    Secondary,
}

impl TagClass {
    /// Short form used in scenario keys.
    pub fn key_name(&self) -> &'static str {
        match self {
            TagClass::Primary => "primary",
            TagClass::Secondary => "secondary",
        }
    }
}

/// A raw tagged object as reported by the perception adapter.
#[derive(Debug, Clone)]
pub struct TaggedObject {
    pub bbox: BoundingBox,
    pub center: Point,
    /// Monotonic distance from the fixed reference point. Ranking only; no
    /// absolute unit semantics.
    pub distance: f64,
}

/// Visual style of hover text, used to disambiguate action labels from
/// fixture labels rendered in a different style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    Action,
    Fixture,
}

/// Immutable snapshot of the visible state, captured fresh at least once per
/// loop iteration and around every click.
#[derive(Debug, Clone, Default)]
pub struct GameSnapshot {
    pub primary_visible: bool,
    pub primary_position: Option<Point>,
    pub secondary_visible: bool,
    pub secondary_count: usize,
    /// True when no action label is detectable near the pointer.
    pub is_idle: bool,
}
