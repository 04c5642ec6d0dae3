use async_trait::async_trait;

use crate::errors::RunnerResult;
use crate::perception::types::{LabelStyle, Point, TagClass, TaggedObject};

/// Seam to the externally owned screen-capture/input layer. The agent never
/// touches pixels or the pointer directly; everything goes through here.
#[async_trait]
pub trait Perception: Send + Sync {
    /// All objects currently carrying the given visual tag, with geometry
    /// and distance from the reference point.
    async fn detect(&self, class: TagClass) -> RunnerResult<Vec<TaggedObject>>;

    /// First of `candidates` present in the text near the pointer, rendered
    /// in the given style, or `None`.
    async fn label_at_pointer(
        &self,
        candidates: &[String],
        style: LabelStyle,
    ) -> RunnerResult<Option<String>>;

    /// Raw text near the pointer, if any.
    async fn pointer_text(&self) -> RunnerResult<Option<String>>;

    async fn move_pointer(&self, point: Point) -> RunnerResult<()>;

    async fn click(&self) -> RunnerResult<()>;

    /// Rotate the viewing camera by the given horizontal angle in degrees.
    async fn rotate_view(&self, degrees: i32) -> RunnerResult<()>;
}
