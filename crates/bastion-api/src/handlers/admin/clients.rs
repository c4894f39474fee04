//! Client management.
//!
//! Every member can read clients; managers and above can change them.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use bastion_core::roles::{ALL_MEMBERS, CONTENT_MANAGERS};
use bastion_core::{Client, CreateClientRequest, UpdateClientRequest};

use crate::error::ApiError;
use crate::middleware::Auth;
use crate::services::cleanup::remove_objects;
use crate::AppState;

pub async fn list_clients(
    State(state): State<AppState>,
    auth: Auth,
) -> Result<Json<Vec<Client>>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    Ok(Json(state.db.clients.list(principal.organisation_id).await?))
}

pub async fn get_client(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    let client = state
        .db
        .clients
        .get(principal.organisation_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Client"))?;
    Ok(Json(client))
}

pub async fn create_client(
    State(state): State<AppState>,
    auth: Auth,
    Json(req): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), ApiError> {
    let principal = auth.require(CONTENT_MANAGERS)?;
    req.validate()?;
    let client = state
        .db
        .clients
        .create(principal.organisation_id, &req)
        .await?;
    info!(
        subsystem = "api",
        component = "admin",
        op = "create_client",
        client_id = %client.id,
        organisation_id = %client.organisation_id,
        "Client created"
    );
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateClientRequest>,
) -> Result<Json<Client>, ApiError> {
    let principal = auth.require(CONTENT_MANAGERS)?;
    req.validate()?;
    let client = state
        .db
        .clients
        .update(principal.organisation_id, id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Client"))?;
    Ok(Json(client))
}

/// Delete a client with its sources, briefs, and conversations.
///
/// Source objects are removed from storage after the rows are gone. Storage
/// failures are logged and do not fail the request.
pub async fn delete_client(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = auth.require(CONTENT_MANAGERS)?;
    let org = principal.organisation_id;

    let sources = state.db.sources.list_for_client(org, id).await?;
    if !state.db.clients.delete(org, id).await? {
        return Err(ApiError::not_found("Client"));
    }

    let paths: Vec<String> = sources.into_iter().map(|s| s.storage_path).collect();
    let failed = remove_objects(state.storage.as_ref(), &paths, "delete_client").await;

    info!(
        subsystem = "api",
        component = "admin",
        op = "delete_client",
        client_id = %id,
        objects = paths.len(),
        failed,
        "Client deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
