//! Briefs: CRUD, attachments, AI expansion, and section edits.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{info, warn};
use uuid::Uuid;

use bastion_core::roles::{ALL_MEMBERS, CONTENT_MANAGERS};
use bastion_core::{
    Brief, BriefDetail, BriefFile, BriefSection, CreateBriefRequest, ListBriefsQuery,
    NewStoredFile, RegenerateSectionRequest, UpdateBriefRequest, UpdateBriefSectionRequest,
};
use bastion_db::{brief_file_storage_path, compute_content_hash};

use super::body::OptionalJson;
use super::upload::read_upload;
use crate::error::ApiError;
use crate::middleware::Auth;
use crate::services::brief_expansion;
use crate::services::cleanup::remove_objects;
use crate::AppState;

/// Check that optional references on a brief belong to the organisation.
async fn check_references(
    state: &AppState,
    organisation_id: Uuid,
    practice_id: Option<Uuid>,
    template_id: Option<Uuid>,
) -> Result<(), ApiError> {
    if let Some(practice_id) = practice_id {
        if state.db.practices.get(organisation_id, practice_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!(
                "Practice {} does not exist",
                practice_id
            )));
        }
    }
    if let Some(template_id) = template_id {
        if state.db.templates.get(organisation_id, template_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!(
                "Template {} does not exist",
                template_id
            )));
        }
    }
    Ok(())
}

async fn require_brief(state: &AppState, organisation_id: Uuid, id: Uuid) -> Result<Brief, ApiError> {
    state
        .db
        .briefs
        .get(organisation_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Brief"))
}

/// List briefs, newest first. Filters: `client_id`, `status`, `limit`, `offset`.
pub async fn list_briefs(
    State(state): State<AppState>,
    auth: Auth,
    Query(query): Query<ListBriefsQuery>,
) -> Result<Json<Vec<Brief>>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    Ok(Json(
        state.db.briefs.list(principal.organisation_id, &query).await?,
    ))
}

pub async fn create_brief(
    State(state): State<AppState>,
    auth: Auth,
    Json(req): Json<CreateBriefRequest>,
) -> Result<(StatusCode, Json<Brief>), ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    req.validate()?;
    let org = principal.organisation_id;

    if state.db.clients.get(org, req.client_id).await?.is_none() {
        return Err(ApiError::BadRequest(format!(
            "Client {} does not exist",
            req.client_id
        )));
    }
    check_references(&state, org, req.practice_id, req.template_id).await?;

    let brief = state
        .db
        .briefs
        .create(org, principal.user_id, &req)
        .await?;
    info!(
        subsystem = "api",
        component = "briefs",
        op = "create",
        brief_id = %brief.id,
        client_id = %brief.client_id,
        "Brief created"
    );
    Ok((StatusCode::CREATED, Json(brief)))
}

/// A brief with its sections and files.
pub async fn get_brief(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<Json<BriefDetail>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    let detail = state
        .db
        .briefs
        .get_detail(principal.organisation_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Brief"))?;
    Ok(Json(detail))
}

pub async fn update_brief(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBriefRequest>,
) -> Result<Json<Brief>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    req.validate()?;
    check_references(&state, principal.organisation_id, None, req.template_id).await?;

    let brief = state
        .db
        .briefs
        .update(principal.organisation_id, id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Brief"))?;
    Ok(Json(brief))
}

/// Delete a brief and remove its attachments from storage (best-effort).
pub async fn delete_brief(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = auth.require(CONTENT_MANAGERS)?;
    let org = principal.organisation_id;

    let files = state.db.briefs.files(org, id).await?;
    if !state.db.briefs.delete(org, id).await? {
        return Err(ApiError::not_found("Brief"));
    }

    let paths: Vec<String> = files.into_iter().map(|f| f.storage_path).collect();
    remove_objects(state.storage.as_ref(), &paths, "delete_brief").await;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// FILES
// =============================================================================

/// Attach a file to a brief (multipart field `file`).
pub async fn upload_brief_file(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<BriefFile>), ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    let org = principal.organisation_id;
    require_brief(&state, org, id).await?;

    let upload = read_upload(multipart, state.settings.max_upload_bytes).await?;
    let file_id = Uuid::now_v7();
    let storage_path = brief_file_storage_path(org, id, file_id, &upload.file_name);
    state
        .storage
        .write(&storage_path, &upload.data, &upload.content_type)
        .await?;

    let new_file = NewStoredFile {
        id: file_id,
        organisation_id: org,
        parent_id: id,
        content_hash: compute_content_hash(&upload.data),
        file_name: upload.file_name,
        mime_type: upload.content_type,
        size_bytes: upload.data.len() as i64,
        storage_path: storage_path.clone(),
        uploaded_by: principal.user_id,
    };
    let file = match state.db.briefs.insert_file(&new_file).await {
        Ok(file) => file,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete(&storage_path).await {
                warn!(path = %storage_path, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    info!(
        subsystem = "api",
        component = "briefs",
        op = "upload_file",
        brief_id = %id,
        file_id = %file.id,
        mime_type = %file.mime_type,
        size_bytes = file.size_bytes,
        "Brief file uploaded"
    );
    Ok((StatusCode::CREATED, Json(file)))
}

pub async fn delete_brief_file(
    State(state): State<AppState>,
    auth: Auth,
    Path((id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    let file = state
        .db
        .briefs
        .delete_file(principal.organisation_id, id, file_id)
        .await?
        .ok_or_else(|| ApiError::not_found("File"))?;
    if let Err(e) = state.storage.delete(&file.storage_path).await {
        warn!(
            subsystem = "api",
            component = "briefs",
            op = "delete_file",
            file_id = %file_id,
            error = %e,
            "Failed to delete brief file object"
        );
    }
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// AI
// =============================================================================

/// Expand a brief into its template's sections.
///
/// # Returns
/// - 200 OK with the expanded brief
/// - 400 Bad Request if the brief has no template
/// - 404 Not Found if the brief is not in the caller's organisation
/// - 422 Unprocessable Entity when Gemini rejects the request
/// - 500 Internal Server Error when the reply cannot be parsed (status `failed`)
pub async fn expand_brief(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<Json<BriefDetail>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    let detail = brief_expansion::expand_brief(&state, principal.organisation_id, id).await?;
    Ok(Json(detail))
}

pub async fn update_section(
    State(state): State<AppState>,
    auth: Auth,
    Path((id, section_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateBriefSectionRequest>,
) -> Result<Json<BriefSection>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    req.validate()?;
    let section = state
        .db
        .briefs
        .update_section(principal.organisation_id, id, section_id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Section"))?;
    Ok(Json(section))
}

/// Rewrite one section. The body and its `instructions` are optional.
pub async fn regenerate_section(
    State(state): State<AppState>,
    auth: Auth,
    Path((id, section_id)): Path<(Uuid, Uuid)>,
    OptionalJson(req): OptionalJson<RegenerateSectionRequest>,
) -> Result<Json<BriefSection>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    req.validate()?;
    let section = brief_expansion::regenerate_section(
        &state,
        principal.organisation_id,
        id,
        section_id,
        req.instructions.as_deref(),
    )
    .await?;
    Ok(Json(section))
}
