//! Organisation management. Super admins only.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use bastion_core::roles::ORGANISATION_ADMIN;
use bastion_core::{CreateOrganisationRequest, Organisation, UpdateOrganisationRequest};

use crate::error::ApiError;
use crate::middleware::Auth;
use crate::services::cleanup::remove_objects;
use crate::AppState;

/// List every organisation on the platform.
pub async fn list_organisations(
    State(state): State<AppState>,
    auth: Auth,
) -> Result<Json<Vec<Organisation>>, ApiError> {
    auth.require(ORGANISATION_ADMIN)?;
    Ok(Json(state.db.organisations.list().await?))
}

/// Create an organisation.
///
/// # Returns
/// - 201 Created with the organisation
/// - 400 Bad Request for an empty name or malformed slug
/// - 409 Conflict if the slug is taken
pub async fn create_organisation(
    State(state): State<AppState>,
    auth: Auth,
    Json(req): Json<CreateOrganisationRequest>,
) -> Result<(StatusCode, Json<Organisation>), ApiError> {
    let principal = auth.require(ORGANISATION_ADMIN)?;
    req.validate()?;

    let organisation = state.db.organisations.create(&req).await?;
    info!(
        subsystem = "api",
        component = "admin",
        op = "create_organisation",
        organisation_id = %organisation.id,
        slug = %organisation.slug,
        by = %principal.user_id,
        "Organisation created"
    );
    Ok((StatusCode::CREATED, Json(organisation)))
}

pub async fn get_organisation(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<Json<Organisation>, ApiError> {
    auth.require(ORGANISATION_ADMIN)?;
    let organisation = state
        .db
        .organisations
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organisation"))?;
    Ok(Json(organisation))
}

pub async fn update_organisation(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOrganisationRequest>,
) -> Result<Json<Organisation>, ApiError> {
    auth.require(ORGANISATION_ADMIN)?;
    req.validate()?;
    let organisation = state
        .db
        .organisations
        .update(id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Organisation"))?;
    Ok(Json(organisation))
}

/// Delete an organisation and, by cascade, everything it owns. Stored
/// objects are removed afterwards (best-effort).
pub async fn delete_organisation(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = auth.require(ORGANISATION_ADMIN)?;
    if id == principal.organisation_id {
        return Err(ApiError::BadRequest(
            "You cannot delete your own organisation".to_string(),
        ));
    }
    let paths = state.db.organisations.storage_paths(id).await?;
    if !state.db.organisations.delete(id).await? {
        return Err(ApiError::not_found("Organisation"));
    }
    let failed = remove_objects(state.storage.as_ref(), &paths, "delete_organisation").await;
    info!(
        subsystem = "api",
        component = "admin",
        op = "delete_organisation",
        organisation_id = %id,
        by = %principal.user_id,
        objects = paths.len(),
        failed,
        "Organisation deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
