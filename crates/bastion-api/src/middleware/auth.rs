//! Bearer-token authentication.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use tracing::debug;

use bastion_core::{Error, Principal, Role};

use crate::error::ApiError;
use crate::AppState;

/// Extractor for authenticated requests.
///
/// Resolves the `Authorization: Bearer` token through the configured
/// identity provider. Handlers then check their route's allow-list:
///
/// ```ignore
/// async fn list_users(State(state): State<AppState>, auth: Auth) -> Result<_, ApiError> {
///     let principal = auth.require(ORG_ADMIN)?;
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Auth {
    pub principal: Principal,
}

impl Auth {
    /// The principal, if their role is in `allowed`.
    pub fn require(&self, allowed: &[Role]) -> Result<&Principal, ApiError> {
        self.principal.require_roles(allowed)?;
        Ok(&self.principal)
    }
}

/// Token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Map a failed token lookup to a response.
///
/// Only rejections of the token itself become 401. Supabase answers malformed
/// tokens with 400 rather than 401. Anything else, such as a 429 from the
/// provider, keeps its provider error.
fn token_error(err: Error) -> ApiError {
    match err {
        Error::Provider {
            status: 400 | 401 | 403,
            ..
        } => ApiError::Unauthorized("Invalid or expired token".to_string()),
        other => ApiError::from(other),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

        let principal = state
            .identity
            .authenticate(token)
            .await
            .map_err(token_error)?;
        debug!(
            user_id = %principal.user_id,
            organisation_id = %principal.organisation_id,
            role = %principal.role,
            "Authenticated request"
        );
        Ok(Auth { principal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_tokens_are_unauthorized() {
        for status in [400, 401, 403] {
            let err = token_error(Error::provider("Supabase Auth", status, "bad jwt"));
            assert!(matches!(err, ApiError::Unauthorized(_)), "status {status}");
        }
    }

    #[test]
    fn test_provider_throttling_is_not_unauthorized() {
        let err = token_error(Error::provider("Supabase Auth", 429, "Too many requests"));
        assert!(!matches!(err, ApiError::Unauthorized(_)));
        assert_eq!(err.to_string(), "Too many requests");

        let err = token_error(Error::provider("Supabase Auth", 503, "Unavailable"));
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_identity_errors_pass_through() {
        let err = token_error(Error::Forbidden("No profile".to_string()));
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
