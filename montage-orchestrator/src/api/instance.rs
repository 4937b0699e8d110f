//! Instance API Handlers
//!
//! Read-only inspection of job instances and their ledgers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use montage_core::domain::instance::JobInstance;
use montage_core::domain::step::StepRecord;
use montage_core::dto::instance::InstanceSummary;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::instance_service;

#[derive(Debug, Deserialize)]
pub struct ListInstancesQuery {
    pub status: Option<String>,
}

/// GET /instances
/// List instances, optionally filtered with `?status=Suspended`
pub async fn list_instances(
    State(state): State<AppState>,
    Query(params): Query<ListInstancesQuery>,
) -> ApiResult<Json<Vec<InstanceSummary>>> {
    let status = instance_service::parse_status_filter(params.status.as_deref())?;
    tracing::debug!("Listing instances (status: {:?})", status);

    let instances =
        instance_service::list_instances(state.dispatcher.repository().as_ref(), status).await?;
    Ok(Json(instances))
}

/// GET /instances/{id}
/// Get instance details by ID
pub async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobInstance>> {
    tracing::debug!("Getting instance: {}", id);

    let instance =
        instance_service::get_instance(state.dispatcher.repository().as_ref(), id).await?;
    Ok(Json(instance))
}

/// GET /instances/{id}/steps
/// Get the step ledger of an instance in execution order
pub async fn get_instance_steps(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<StepRecord>>> {
    tracing::debug!("Getting steps for instance: {}", id);

    let steps = instance_service::get_steps(
        state.dispatcher.repository().as_ref(),
        state.dispatcher.ledger().as_ref(),
        id,
    )
    .await?;
    Ok(Json(steps))
}
