//! Event API Handler
//!
//! Intake for trigger events.

use axum::{Json, extract::State, http::StatusCode};
use montage_core::dto::event::TriggerEvent;
use montage_core::dto::instance::DispatchReceipt;
use montage_engine::compensation::discard_cancelled_record;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /events
/// Dispatch a trigger event: start a pipeline or cancel one in flight
///
/// Returns 202 with the receipt. A start event for a key that is already
/// being handled is rejected with 409. Video, image and schedule
/// cancellations also delete their domain record once the instance has been
/// told to stop.
pub async fn dispatch_event(
    State(state): State<AppState>,
    Json(event): Json<TriggerEvent>,
) -> ApiResult<(StatusCode, Json<DispatchReceipt>)> {
    tracing::info!(
        "Received {} for '{}'",
        event.name(),
        event.correlation_key()
    );

    let receipt = state.dispatcher.dispatch(event.clone()).await?;

    if let DispatchReceipt::Cancelled { .. } = receipt {
        discard_cancelled_record(state.store.as_ref(), &event)
            .await
            .map_err(|e| {
                ApiError::InternalError(format!(
                    "Cancelled, but could not delete '{}': {}",
                    event.correlation_key(),
                    e
                ))
            })?;
    }

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}
