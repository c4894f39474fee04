//! Organisation prompt overrides.

use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use bastion_core::roles::ORG_ADMIN;
use bastion_core::{EffectivePrompt, PromptKey, SetPromptRequest};
use bastion_db::effective_prompt;
use bastion_inference::default_prompt;

use crate::error::ApiError;
use crate::middleware::Auth;
use crate::AppState;

/// Every prompt key with the content in effect for the caller's organisation.
pub async fn list_prompts(
    State(state): State<AppState>,
    auth: Auth,
) -> Result<Json<Vec<EffectivePrompt>>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    let stored = state.db.prompts.list(principal.organisation_id).await?;

    let prompts = PromptKey::ALL
        .iter()
        .map(|&key| {
            let current = stored.iter().find(|p| p.key == key);
            effective_prompt(key, current, default_prompt(key))
        })
        .collect();
    Ok(Json(prompts))
}

pub async fn set_prompt(
    State(state): State<AppState>,
    auth: Auth,
    Path(key): Path<PromptKey>,
    Json(req): Json<SetPromptRequest>,
) -> Result<Json<EffectivePrompt>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    req.validate()?;
    let prompt = state
        .db
        .prompts
        .upsert(principal.organisation_id, key, &req.content)
        .await?;
    info!(
        subsystem = "api",
        component = "admin",
        op = "set_prompt",
        key = %key,
        organisation_id = %principal.organisation_id,
        "Prompt override saved"
    );
    Ok(Json(effective_prompt(key, Some(&prompt), default_prompt(key))))
}

/// Drop the override and return the built-in default now in effect.
pub async fn reset_prompt(
    State(state): State<AppState>,
    auth: Auth,
    Path(key): Path<PromptKey>,
) -> Result<Json<EffectivePrompt>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    state.db.prompts.delete(principal.organisation_id, key).await?;
    Ok(Json(effective_prompt(key, None, default_prompt(key))))
}
