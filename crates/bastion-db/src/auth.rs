//! Supabase Auth client and the bearer-token identity provider.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use bastion_core::{Error, IdentityProvider, Principal, Result};

use crate::profiles::PgProfileRepository;
use crate::supabase::{check_response, SupabaseConfig};

const SERVICE: &str = "Supabase Auth";

/// The subset of a Supabase auth user the backend relies on.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// HTTP client for the Supabase Auth (GoTrue) API.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabaseAuthClient {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { config, client })
    }

    /// Resolve an access token to its user.
    ///
    /// Rejected tokens map to `Error::Unauthorized`; other upstream failures
    /// stay provider errors.
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.config.url))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(Error::Unauthorized("Invalid or expired token".to_string()));
        }
        let response = check_response(SERVICE, response).await?;
        Ok(response.json::<AuthUser>().await?)
    }

    /// Send an invitation email, creating the auth user.
    pub async fn invite_user(&self, email: &str, full_name: &str) -> Result<AuthUser> {
        let response = self
            .config
            .service(self.client.post(format!("{}/auth/v1/invite", self.config.url)))
            .json(&serde_json::json!({
                "email": email,
                "data": { "full_name": full_name },
            }))
            .send()
            .await?;
        let user = check_response(SERVICE, response)
            .await?
            .json::<AuthUser>()
            .await?;

        info!(
            subsystem = "auth",
            component = "supabase",
            op = "invite",
            user_id = %user.id,
            "Invited user"
        );
        Ok(user)
    }

    /// Delete an auth user. A user that is already gone is not an error.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        let response = self
            .config
            .service(
                self.client
                    .delete(format!("{}/auth/v1/admin/users/{}", self.config.url, user_id)),
            )
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(user_id = %user_id, "Auth user already deleted");
            return Ok(());
        }
        check_response(SERVICE, response).await?;
        Ok(())
    }
}

/// Authenticates bearer tokens against Supabase and loads the caller's profile.
pub struct SupabaseIdentityProvider {
    auth: SupabaseAuthClient,
    profiles: PgProfileRepository,
}

impl SupabaseIdentityProvider {
    pub fn new(auth: SupabaseAuthClient, profiles: PgProfileRepository) -> Self {
        Self { auth, profiles }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<Principal> {
        let user = self.auth.get_user(token).await?;
        let profile = self
            .profiles
            .find_by_user_id(user.id)
            .await?
            .ok_or_else(|| Error::Forbidden("No profile exists for this user".to_string()))?;

        Ok(Principal {
            user_id: profile.id,
            email: profile.email,
            full_name: profile.full_name,
            organisation_id: profile.organisation_id,
            role: profile.role,
            practice_id: profile.practice_id,
        })
    }
}
