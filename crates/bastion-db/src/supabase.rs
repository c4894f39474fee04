//! Shared plumbing for the Supabase HTTP APIs (Auth and Storage).

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::Deserialize;

use bastion_core::{Error, Result};

/// Default request timeout for Supabase calls, in seconds.
pub const DEFAULT_SUPABASE_TIMEOUT_SECS: u64 = 30;

/// Connection settings for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`.
    pub url: String,
    /// Public anon key, sent with end-user requests.
    pub anon_key: String,
    /// Service-role key, used for admin and storage calls.
    pub service_role_key: String,
    pub timeout_secs: u64,
}

impl SupabaseConfig {
    pub fn new(
        url: impl Into<String>,
        anon_key: impl Into<String>,
        service_role_key: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_role_key: service_role_key.into(),
            timeout_secs: DEFAULT_SUPABASE_TIMEOUT_SECS,
        }
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build Supabase HTTP client: {}", e)))
    }

    /// Attach service-role credentials.
    pub(crate) fn service(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.message
            .or(self.msg)
            .or(self.error_description)
            .or(self.error)
    }
}

/// Turn a non-success response into `Error::Provider`, keeping the upstream message.
pub(crate) async fn check_response(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            }
        });
    Err(Error::provider(service, status.as_u16(), message))
}
