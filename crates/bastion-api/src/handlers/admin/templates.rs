//! Practice templates and their section templates.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use bastion_core::roles::ORG_ADMIN;
use bastion_core::{
    CreateTemplateRequest, PracticeTemplate, ReplaceSectionsRequest, SectionTemplate,
    TemplateWithSections, UpdateTemplateRequest,
};

use crate::error::ApiError;
use crate::middleware::Auth;
use crate::AppState;

async fn require_practice(state: &AppState, organisation_id: Uuid, id: Uuid) -> Result<(), ApiError> {
    state
        .db
        .practices
        .get(organisation_id, id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("Practice"))
}

/// Templates of one practice. `:id` is the practice id.
pub async fn list_templates(
    State(state): State<AppState>,
    auth: Auth,
    Path(practice_id): Path<Uuid>,
) -> Result<Json<Vec<PracticeTemplate>>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    require_practice(&state, principal.organisation_id, practice_id).await?;
    let templates = state
        .db
        .templates
        .list_for_practice(principal.organisation_id, practice_id)
        .await?;
    Ok(Json(templates))
}

/// Create a template, optionally with its sections, for a practice.
pub async fn create_template(
    State(state): State<AppState>,
    auth: Auth,
    Path(practice_id): Path<Uuid>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<TemplateWithSections>), ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    req.validate()?;
    require_practice(&state, principal.organisation_id, practice_id).await?;

    let template = state
        .db
        .templates
        .create(principal.organisation_id, practice_id, &req)
        .await?;
    info!(
        subsystem = "api",
        component = "admin",
        op = "create_template",
        template_id = %template.template.id,
        practice_id = %practice_id,
        sections = template.sections.len(),
        "Template created"
    );
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<Json<TemplateWithSections>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    let template = state
        .db
        .templates
        .get_with_sections(principal.organisation_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template"))?;
    Ok(Json(template))
}

pub async fn update_template(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTemplateRequest>,
) -> Result<Json<PracticeTemplate>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    req.validate()?;
    let template = state
        .db
        .templates
        .update(principal.organisation_id, id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Template"))?;
    Ok(Json(template))
}

pub async fn delete_template(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    if !state.db.templates.delete(principal.organisation_id, id).await? {
        return Err(ApiError::not_found("Template"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Replace every section of a template in one transaction.
///
/// # Returns
/// - 200 OK with the new sections in order
/// - 400 Bad Request for an empty or oversized list, or a blank title
/// - 404 Not Found if the template is not in the caller's organisation
pub async fn replace_sections(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplaceSectionsRequest>,
) -> Result<Json<Vec<SectionTemplate>>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    req.validate()?;

    state
        .db
        .templates
        .get(principal.organisation_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template"))?;
    let sections = state
        .db
        .templates
        .replace_sections(principal.organisation_id, id, &req.sections)
        .await?;
    Ok(Json(sections))
}
