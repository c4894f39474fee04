//! User management: Supabase invites plus the matching profile rows.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{info, warn};
use uuid::Uuid;

use bastion_core::roles::ORG_ADMIN;
use bastion_core::{InviteUserRequest, NewProfile, Principal, Profile, Role, UpdateProfileRequest};

use crate::error::ApiError;
use crate::middleware::Auth;
use crate::AppState;

fn check_assignable(principal: &Principal, role: Role) -> Result<(), ApiError> {
    if principal.can_assign_role(role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Role '{}' cannot be assigned by '{}'",
            role, principal.role
        )))
    }
}

/// Only super admins may touch a super admin's account.
fn check_manageable(principal: &Principal, target: &Profile) -> Result<(), ApiError> {
    if target.role == Role::SuperAdmin && principal.role != Role::SuperAdmin {
        return Err(ApiError::Forbidden(
            "Super admin accounts can only be managed by a super admin".to_string(),
        ));
    }
    Ok(())
}

async fn check_practice(
    state: &AppState,
    organisation_id: Uuid,
    practice_id: Option<Uuid>,
) -> Result<(), ApiError> {
    if let Some(practice_id) = practice_id {
        if state
            .db
            .practices
            .get(organisation_id, practice_id)
            .await?
            .is_none()
        {
            return Err(ApiError::BadRequest(format!(
                "Practice {} does not exist",
                practice_id
            )));
        }
    }
    Ok(())
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: Auth,
) -> Result<Json<Vec<Profile>>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    Ok(Json(state.db.profiles.list(principal.organisation_id).await?))
}

/// Invite a user by email and create their profile.
///
/// The Supabase user is created first; if the profile insert then fails the
/// auth user is removed again so the email can be re-invited.
///
/// # Returns
/// - 201 Created with the profile
/// - 400 Bad Request for invalid fields or an unknown practice
/// - 403 Forbidden when granting a role above the caller's reach
/// - 409 Conflict if the user already has a profile
/// - 422 Unprocessable Entity when Supabase rejects the invite
pub async fn invite_user(
    State(state): State<AppState>,
    auth: Auth,
    Json(req): Json<InviteUserRequest>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    req.validate()?;
    check_assignable(principal, req.role)?;
    check_practice(&state, principal.organisation_id, req.practice_id).await?;

    let email = req.email.trim().to_lowercase();
    let full_name = req.full_name.trim().to_string();
    let user = state.auth_admin.invite_user(&email, &full_name).await?;

    let new_profile = NewProfile {
        id: user.id,
        organisation_id: principal.organisation_id,
        email: user.email.unwrap_or(email),
        full_name,
        role: req.role,
        practice_id: req.practice_id,
    };
    let profile = match state.db.profiles.insert(&new_profile).await {
        Ok(profile) => profile,
        Err(e) => {
            if let Err(cleanup) = state.auth_admin.delete_user(user.id).await {
                warn!(
                    subsystem = "api",
                    component = "admin",
                    op = "invite_user",
                    user_id = %user.id,
                    error = %cleanup,
                    "Failed to remove auth user after profile insert failed"
                );
            }
            return Err(e.into());
        }
    };

    info!(
        subsystem = "api",
        component = "admin",
        op = "invite_user",
        user_id = %profile.id,
        organisation_id = %profile.organisation_id,
        role = %profile.role,
        "User invited"
    );
    Ok((StatusCode::CREATED, Json(profile)))
}

/// Update a user's name, role, or practice.
///
/// Callers cannot change their own role.
pub async fn update_user(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    req.validate()?;

    if let Some(role) = req.role {
        if id == principal.user_id && role != principal.role {
            return Err(ApiError::BadRequest(
                "You cannot change your own role".to_string(),
            ));
        }
        check_assignable(principal, role)?;
    }

    let target = state
        .db
        .profiles
        .get(principal.organisation_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    check_manageable(principal, &target)?;
    check_practice(&state, principal.organisation_id, req.practice_id).await?;

    let profile = state
        .db
        .profiles
        .update(principal.organisation_id, id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(profile))
}

/// Delete a user's profile, then their Supabase account.
///
/// The profile goes first so a failed auth deletion leaves a user who can
/// sign in but is refused by every route.
pub async fn delete_user(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = auth.require(ORG_ADMIN)?;
    if id == principal.user_id {
        return Err(ApiError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    let target = state
        .db
        .profiles
        .get(principal.organisation_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    check_manageable(principal, &target)?;

    if !state.db.profiles.delete(principal.organisation_id, id).await? {
        return Err(ApiError::not_found("User"));
    }
    if let Err(e) = state.auth_admin.delete_user(id).await {
        warn!(
            subsystem = "api",
            component = "admin",
            op = "delete_user",
            user_id = %id,
            error = %e,
            "Profile deleted but auth user removal failed"
        );
    }

    info!(
        subsystem = "api",
        component = "admin",
        op = "delete_user",
        user_id = %id,
        by = %principal.user_id,
        "User deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "lead@agency.test".to_string(),
            full_name: "Lead".to_string(),
            organisation_id: Uuid::new_v4(),
            role,
            practice_id: None,
        }
    }

    fn profile(role: Role) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            email: "sam@agency.test".to_string(),
            full_name: "Sam".to_string(),
            role,
            practice_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_admin_cannot_grant_super_admin() {
        let admin = principal(Role::Admin);
        let err = check_assignable(&admin, Role::SuperAdmin).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(check_assignable(&admin, Role::Manager).is_ok());
        assert!(check_assignable(&principal(Role::SuperAdmin), Role::SuperAdmin).is_ok());
    }

    #[test]
    fn test_admin_cannot_manage_super_admin() {
        let target = profile(Role::SuperAdmin);
        assert!(check_manageable(&principal(Role::Admin), &target).is_err());
        assert!(check_manageable(&principal(Role::SuperAdmin), &target).is_ok());
        assert!(check_manageable(&principal(Role::Admin), &profile(Role::Member)).is_ok());
    }
}
