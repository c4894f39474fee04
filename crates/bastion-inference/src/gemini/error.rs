//! Gemini-specific error handling.

use bastion_core::Error;

use super::types::GeminiErrorResponse;

pub(crate) const SERVICE: &str = "Gemini";

/// Convert a non-success Gemini response body into a provider error.
///
/// The upstream message is kept verbatim so that client errors (bad MIME
/// type, oversized request) can be shown to the user.
pub fn to_bastion_error(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<GeminiErrorResponse>(body)
        .ok()
        .map(|r| r.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                body.trim().to_string()
            }
        });
    Error::provider(SERVICE, status, message)
}
