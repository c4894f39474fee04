//! Practice management within the caller's organisation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use bastion_core::roles::ORG_ADMIN;
use bastion_core::{CreatePracticeRequest, Practice, UpdatePracticeRequest};

use crate::error::ApiError;
use crate::middleware::Auth;
use crate::AppState;

pub async fn list_practices(
    State(state): State<AppState>,
    auth: Auth,
) -> Result<Json<Vec<Practice>>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    Ok(Json(state.db.practices.list(principal.organisation_id).await?))
}

pub async fn create_practice(
    State(state): State<AppState>,
    auth: Auth,
    Json(req): Json<CreatePracticeRequest>,
) -> Result<(StatusCode, Json<Practice>), ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    req.validate()?;
    let practice = state
        .db
        .practices
        .create(principal.organisation_id, &req)
        .await?;
    Ok((StatusCode::CREATED, Json(practice)))
}

pub async fn update_practice(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePracticeRequest>,
) -> Result<Json<Practice>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    req.validate()?;
    let practice = state
        .db
        .practices
        .update(principal.organisation_id, id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Practice"))?;
    Ok(Json(practice))
}

/// Delete a practice. Its templates go with it; profiles and briefs keep
/// existing with the practice cleared.
pub async fn delete_practice(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    if !state.db.practices.delete(principal.organisation_id, id).await? {
        return Err(ApiError::not_found("Practice"));
    }
    Ok(StatusCode::NO_CONTENT)
}
