//! Knowledge base: client sources, file preparation, digests, and chat.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use bastion_core::roles::{ALL_MEMBERS, CONTENT_MANAGERS};
use bastion_core::{
    Client, ClientSource, ConversationDetail, CreateConversationRequest, FilePrepEvent,
    FilePrepSummary, KbConversation, NewStoredFile, RenameConversationRequest,
    SendMessageRequest,
};
use bastion_db::{compute_content_hash, source_storage_path};

use super::body::OptionalJson;
use super::upload::read_upload;
use crate::error::ApiError;
use crate::middleware::Auth;
use crate::services::digest::{spawn_digest_refresh, spawn_post_upload};
use crate::services::file_prep;
use crate::services::kb_chat::{self, ChatReply};
use crate::AppState;

const SSE_KEEPALIVE_SECS: u64 = 15;

async fn require_client(
    state: &AppState,
    organisation_id: Uuid,
    client_id: Uuid,
) -> Result<Client, ApiError> {
    state
        .db
        .clients
        .get(organisation_id, client_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Client"))
}

async fn remove_object(state: &AppState, path: &str) {
    if let Err(e) = state.storage.delete(path).await {
        warn!(
            subsystem = "api",
            component = "kb",
            path = %path,
            error = %e,
            "Failed to delete stored object"
        );
    }
}

// =============================================================================
// SOURCES
// =============================================================================

/// Clients whose knowledge base the caller can open.
pub async fn list_kb_clients(
    State(state): State<AppState>,
    auth: Auth,
) -> Result<Json<Vec<Client>>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    Ok(Json(state.db.clients.list(principal.organisation_id).await?))
}

pub async fn list_sources(
    State(state): State<AppState>,
    auth: Auth,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Vec<ClientSource>>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    require_client(&state, principal.organisation_id, client_id).await?;
    let sources = state
        .db
        .sources
        .list_for_client(principal.organisation_id, client_id)
        .await?;
    Ok(Json(sources))
}

/// Upload a source document (multipart field `file`).
///
/// The bytes are screened, typed from their magic bytes, and stored before
/// the row is written. Gemini preparation and a digest refresh follow in the
/// background.
///
/// # Returns
/// - 201 Created with the source
/// - 400 Bad Request if the file is empty, too large, or executable
/// - 404 Not Found if the client is not in the caller's organisation
/// - 409 Conflict if the same bytes were already uploaded for this client
pub async fn upload_source(
    State(state): State<AppState>,
    auth: Auth,
    Path(client_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ClientSource>), ApiError> {
    let principal = auth.require(CONTENT_MANAGERS)?;
    let org = principal.organisation_id;
    require_client(&state, org, client_id).await?;

    let upload = read_upload(multipart, state.settings.max_upload_bytes).await?;
    let content_hash = compute_content_hash(&upload.data);
    if let Some(existing) = state
        .db
        .sources
        .find_by_hash(org, client_id, &content_hash)
        .await?
    {
        return Err(ApiError::Conflict(format!(
            "This file has already been uploaded as '{}'",
            existing.file_name
        )));
    }

    let id = Uuid::now_v7();
    let storage_path = source_storage_path(org, client_id, id, &upload.file_name);
    state
        .storage
        .write(&storage_path, &upload.data, &upload.content_type)
        .await?;

    let new_file = NewStoredFile {
        id,
        organisation_id: org,
        parent_id: client_id,
        file_name: upload.file_name,
        mime_type: upload.content_type,
        size_bytes: upload.data.len() as i64,
        storage_path: storage_path.clone(),
        content_hash,
        uploaded_by: principal.user_id,
    };
    let source = match state.db.sources.insert(&new_file).await {
        Ok(source) => source,
        Err(e) => {
            remove_object(&state, &storage_path).await;
            return Err(e.into());
        }
    };

    info!(
        subsystem = "api",
        component = "kb",
        op = "upload_source",
        source_id = %source.id,
        client_id = %client_id,
        mime_type = %source.mime_type,
        size_bytes = source.size_bytes,
        "Source uploaded"
    );
    spawn_post_upload(state.clone(), org, client_id);
    Ok((StatusCode::CREATED, Json(source)))
}

/// Delete a source row and its stored object.
pub async fn delete_source(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = auth.require(CONTENT_MANAGERS)?;
    let source = state
        .db
        .sources
        .delete(principal.organisation_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Source"))?;
    remove_object(&state, &source.storage_path).await;

    info!(
        subsystem = "api",
        component = "kb",
        op = "delete_source",
        source_id = %id,
        client_id = %source.client_id,
        "Source deleted"
    );
    spawn_digest_refresh(state.clone(), principal.organisation_id, source.client_id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct SignedUrlResponse {
    pub url: String,
    pub expires_in: u64,
}

/// Short-lived download URL for a source.
pub async fn source_url(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<Json<SignedUrlResponse>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    let source = state
        .db
        .sources
        .get(principal.organisation_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Source"))?;

    let expires_in = state.settings.signed_url_ttl_secs;
    let url = state
        .storage
        .signed_url(&source.storage_path, expires_in)
        .await?;
    Ok(Json(SignedUrlResponse { url, expires_in }))
}

// =============================================================================
// PREPARATION STREAM
// =============================================================================

fn sse_event<T: Serialize>(name: &str, payload: &T) -> Event {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(name).data(data)
}

/// Prepare listed sources, reporting each step as a named event.
///
/// A listing failure is reported as one `error` event. Otherwise every file
/// and phase is reported as `progress`, followed by one `ready` summary.
async fn stream_preparation(
    state: &AppState,
    client_id: Uuid,
    listed: bastion_core::Result<Vec<ClientSource>>,
    emit: &(dyn Fn(&'static str, serde_json::Value) + Send + Sync),
) {
    let sources = match listed {
        Ok(sources) => sources,
        Err(e) => {
            warn!(
                subsystem = "api",
                component = "kb",
                op = "prepare_sources",
                client_id = %client_id,
                error = %e,
                "Could not list sources"
            );
            emit("error", json!({ "error": e.to_string() }));
            return;
        }
    };

    let on_progress = |event: FilePrepEvent| {
        emit("progress", serde_json::to_value(&event).unwrap_or_default());
    };
    let files = file_prep::prepare_sources(state, &sources, &on_progress).await;
    let summary = FilePrepSummary::new(files, sources.len());
    emit("ready", serde_json::to_value(&summary).unwrap_or_default());
}

/// Stream preparation of a client's sources as Server-Sent Events.
///
/// Emits `progress` per file and phase, then a final `ready` summary. A
/// failure before preparation starts is sent as a single `error` event.
/// Preparation runs to completion even if the caller disconnects.
pub async fn prepare_sources(
    State(state): State<AppState>,
    auth: Auth,
    Path(client_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    let org = principal.organisation_id;
    require_client(&state, org, client_id).await?;

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    tokio::spawn(async move {
        let listed = state.db.sources.list_for_client(org, client_id).await;
        let emit = move |name: &'static str, payload: serde_json::Value| {
            let _ = tx.send(sse_event(name, &payload));
        };
        stream_preparation(&state, client_id, listed, &emit).await;
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEPALIVE_SECS))
            .text("keepalive"),
    ))
}

// =============================================================================
// DIGEST
// =============================================================================

#[derive(Debug, Serialize)]
pub struct DigestResponse {
    pub client_id: Uuid,
    pub digest: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub async fn get_digest(
    State(state): State<AppState>,
    auth: Auth,
    Path(client_id): Path<Uuid>,
) -> Result<Json<DigestResponse>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    let client = require_client(&state, principal.organisation_id, client_id).await?;
    Ok(Json(DigestResponse {
        client_id,
        digest: client.kb_digest,
        updated_at: client.kb_digest_updated_at,
    }))
}

/// Queue a digest rebuild. Returns 202 immediately.
pub async fn regenerate_digest(
    State(state): State<AppState>,
    auth: Auth,
    Path(client_id): Path<Uuid>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let principal = auth.require(CONTENT_MANAGERS)?;
    require_client(&state, principal.organisation_id, client_id).await?;
    spawn_digest_refresh(state.clone(), principal.organisation_id, client_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "client_id": client_id })),
    ))
}

// =============================================================================
// CONVERSATIONS
// =============================================================================

/// The caller's own conversations about a client.
pub async fn list_conversations(
    State(state): State<AppState>,
    auth: Auth,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Vec<KbConversation>>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    require_client(&state, principal.organisation_id, client_id).await?;
    let conversations = state
        .db
        .kb
        .list_conversations(principal.organisation_id, client_id, principal.user_id)
        .await?;
    Ok(Json(conversations))
}

/// Start a conversation. The body and its `title` are optional.
pub async fn create_conversation(
    State(state): State<AppState>,
    auth: Auth,
    Path(client_id): Path<Uuid>,
    OptionalJson(req): OptionalJson<CreateConversationRequest>,
) -> Result<(StatusCode, Json<KbConversation>), ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    req.validate()?;
    require_client(&state, principal.organisation_id, client_id).await?;

    let conversation = state
        .db
        .kb
        .create_conversation(
            principal.organisation_id,
            client_id,
            principal.user_id,
            req.title.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn own_conversation(
    state: &AppState,
    auth: &Auth,
    id: Uuid,
) -> Result<KbConversation, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    state
        .db
        .kb
        .get_conversation(principal.organisation_id, principal.user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation"))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let conversation = own_conversation(&state, &auth, id).await?;
    let messages = state
        .db
        .kb
        .messages(conversation.organisation_id, conversation.id)
        .await?;
    Ok(Json(ConversationDetail {
        conversation,
        messages,
    }))
}

pub async fn rename_conversation(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
    Json(req): Json<RenameConversationRequest>,
) -> Result<Json<KbConversation>, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    req.validate()?;
    let conversation = state
        .db
        .kb
        .rename_conversation(
            principal.organisation_id,
            principal.user_id,
            id,
            req.title.trim(),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation"))?;
    Ok(Json(conversation))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = auth.require(ALL_MEMBERS)?;
    if !state
        .db
        .kb
        .delete_conversation(principal.organisation_id, principal.user_id, id)
        .await?
    {
        return Err(ApiError::not_found("Conversation"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Send a message and receive an answer grounded in the client's sources.
///
/// # Returns
/// - 200 OK with the stored user and assistant messages
/// - 400 Bad Request for blank content
/// - 404 Not Found if the conversation is not the caller's
/// - 422 Unprocessable Entity when Gemini rejects the request
pub async fn send_message(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    req.validate()?;
    let conversation = own_conversation(&state, &auth, id).await?;
    let reply = kb_chat::send_message(&state, &conversation, &req.content).await?;
    Ok(Json(reply))
}
