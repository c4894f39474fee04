//! Client digest: a model-written summary of a client's knowledge base.
//!
//! The digest is stored on the client and folded into brief and chat prompts.

use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use bastion_core::{ChatTurn, Error, GenerationRequest, PromptKey, Result};
use bastion_inference::default_prompt;
use bastion_inference::prompts::digest_prompt;

use super::file_prep::{ignore_progress, prepare_sources, warm_up_sources};
use crate::AppState;

/// Rebuild a client's digest from its sources.
///
/// Returns `None` without calling the model when the client has no sources.
pub async fn regenerate_digest(
    state: &AppState,
    organisation_id: Uuid,
    client_id: Uuid,
) -> Result<Option<String>> {
    let start = Instant::now();
    let client = state
        .db
        .clients
        .get(organisation_id, client_id)
        .await?
        .ok_or_else(|| Error::NotFound("Client not found".to_string()))?;

    let sources = state
        .db
        .sources
        .list_for_client(organisation_id, client_id)
        .await?;
    if sources.is_empty() {
        debug!(client_id = %client_id, "No sources, skipping digest");
        return Ok(None);
    }

    let files = prepare_sources(state, &sources, &ignore_progress).await;
    if files.is_empty() {
        return Err(Error::Inference(format!(
            "None of the {} sources could be prepared",
            sources.len()
        )));
    }

    let system = state
        .db
        .prompts
        .effective(
            organisation_id,
            PromptKey::KbDigest,
            default_prompt(PromptKey::KbDigest),
        )
        .await?
        .content;
    let request = GenerationRequest {
        system: Some(system),
        turns: vec![ChatTurn::user(digest_prompt(&client, files.len()))],
        files,
        ..Default::default()
    };
    let text = state.generator.generate(request).await?;
    let digest = text.trim();
    if digest.is_empty() {
        return Err(Error::Inference("Model returned an empty digest".to_string()));
    }

    state
        .db
        .clients
        .set_digest(organisation_id, client_id, digest)
        .await?;
    info!(
        subsystem = "api",
        component = "digest",
        op = "regenerate",
        client_id = %client_id,
        sources = sources.len(),
        chars = digest.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Client digest regenerated"
    );
    Ok(Some(digest.to_string()))
}

async fn refresh_logged(state: &AppState, organisation_id: Uuid, client_id: Uuid) {
    if let Err(e) = regenerate_digest(state, organisation_id, client_id).await {
        warn!(
            subsystem = "api",
            component = "digest",
            op = "regenerate",
            client_id = %client_id,
            error = %e,
            "Background digest refresh failed"
        );
    }
}

/// Fire-and-forget digest refresh. Failures are logged.
pub fn spawn_digest_refresh(state: AppState, organisation_id: Uuid, client_id: Uuid) {
    tokio::spawn(async move {
        refresh_logged(&state, organisation_id, client_id).await;
    });
}

/// After an upload: push the sources to Gemini, then refresh the digest
/// against the warmed handles.
pub fn spawn_post_upload(state: AppState, organisation_id: Uuid, client_id: Uuid) {
    tokio::spawn(async move {
        warm_up_sources(&state, organisation_id, client_id).await;
        refresh_logged(&state, organisation_id, client_id).await;
    });
}
