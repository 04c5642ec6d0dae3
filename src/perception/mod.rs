pub mod classifier;
pub mod traits;
pub mod types;

use crate::config::LabelConfig;
use crate::perception::traits::Perception;
use crate::perception::types::{GameSnapshot, LabelStyle, TagClass};

/// Capture a fresh snapshot of the visible state. Sensing gaps and adapter
/// faults degrade to an empty snapshot rather than an error; absence of
/// markers is an expected condition, not a failure.
pub async fn capture_state<P: Perception + ?Sized>(
    perception: &P,
    labels: &LabelConfig,
) -> GameSnapshot {
    let primary = match perception.detect(TagClass::Primary).await {
        Ok(objs) => objs,
        Err(e) => {
            tracing::debug!(error = %e, "primary tag detection failed, treating as absent");
            Vec::new()
        }
    };
    let secondary = match perception.detect(TagClass::Secondary).await {
        Ok(objs) => objs,
        Err(e) => {
            tracing::debug!(error = %e, "secondary tag detection failed, treating as absent");
            Vec::new()
        }
    };

    // An action label near the pointer means the subject is mid-action.
    let is_idle = match perception
        .label_at_pointer(&labels.action_labels, LabelStyle::Action)
        .await
    {
        Ok(label) => label.is_none(),
        Err(e) => {
            tracing::debug!(error = %e, "idle probe failed, assuming idle");
            true
        }
    };

    GameSnapshot {
        primary_visible: !primary.is_empty(),
        primary_position: primary.first().map(|obj| obj.center),
        secondary_visible: !secondary.is_empty(),
        secondary_count: secondary.len(),
        is_idle,
    }
}
