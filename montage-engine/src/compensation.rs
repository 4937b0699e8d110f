//! Cleanup after a cancellation request
//!
//! Runners never compensate. Whoever sends a cancel event removes the
//! half-built domain record afterwards, so a cancelled job leaves nothing
//! partially populated behind. A render cancellation keeps its video: the
//! video was complete before the render started.

use montage_core::dto::event::TriggerEvent;
use tracing::info;

use crate::collaborators::DomainStore;
use crate::error::StepError;

/// Deletes the record a cancel event refers to
///
/// # Returns
/// `true` if a delete was issued, `false` for events that keep their record
pub async fn discard_cancelled_record(
    store: &dyn DomainStore,
    event: &TriggerEvent,
) -> Result<bool, StepError> {
    match event {
        TriggerEvent::VideoCancel { video_id } => store.delete_video(video_id).await?,
        TriggerEvent::ImageCancel { image_id } => store.delete_image_generation(image_id).await?,
        TriggerEvent::ScheduleCancel { schedule_id } => store.delete_schedule(schedule_id).await?,
        _ => return Ok(false),
    }

    info!("Discarded record '{}' after {}", event.correlation_key(), event.name());
    Ok(true)
}
