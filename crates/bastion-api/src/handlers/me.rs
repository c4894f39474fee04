//! The caller's own identity.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use bastion_core::{Principal, Profile};

use crate::error::ApiError;
use crate::middleware::Auth;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub principal: Principal,
    pub profile: Profile,
}

/// `GET /api/me`. Open to every authenticated role.
pub async fn get_me(State(state): State<AppState>, auth: Auth) -> Result<Json<MeResponse>, ApiError> {
    let principal = auth.principal;
    let profile = state
        .db
        .profiles
        .get(principal.organisation_id, principal.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile"))?;
    Ok(Json(MeResponse { principal, profile }))
}
