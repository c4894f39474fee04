//! Gemini client: text generation and the Files API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use bastion_core::{
    Error, GenerationBackend, GenerationRequest, MessageRole, RemoteFile, RemoteFileService,
    Result,
};

use super::error::to_bastion_error;
use super::types::*;

/// Default Gemini API endpoint.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Default generation model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Default timeout in seconds. Generation over several documents is slow.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for the Gemini client.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Base URL, without the API version.
    pub base_url: String,
    pub api_key: String,
    /// Model used for `generateContent`.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GeminiConfig {
    /// Read `GEMINI_API_KEY`, `GEMINI_BASE_URL`, `GEMINI_MODEL`, and `GEMINI_TIMEOUT`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("GEMINI_API_KEY is not set".to_string()))?;
        Ok(Self {
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_URL.to_string()),
            api_key,
            model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            timeout_seconds: std::env::var("GEMINI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

/// Gemini client implementing generation and provider-side file storage.
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "gemini",
            op = "init",
            base_url = %config.base_url,
            model = %config.model,
            "Initializing Gemini client"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(to_bastion_error(status.as_u16(), &body))
    }
}

/// Translate a provider-neutral request into the Gemini wire format.
///
/// Files are attached ahead of the text of the final user turn.
pub fn build_generate_request(request: &GenerationRequest) -> GenerateContentRequest {
    let last_user = request
        .turns
        .iter()
        .rposition(|t| t.role == MessageRole::User);

    let mut contents: Vec<Content> = request
        .turns
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let mut parts = Vec::new();
            if Some(i) == last_user {
                parts.extend(
                    request
                        .files
                        .iter()
                        .map(|f| Part::file(&f.mime_type, &f.uri)),
                );
            }
            parts.push(Part::text(&turn.text));
            Content {
                role: Some(
                    match turn.role {
                        MessageRole::User => "user",
                        MessageRole::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts,
            }
        })
        .collect();

    // Files with no user turn to ride on still need a turn of their own
    if last_user.is_none() && !request.files.is_empty() {
        contents.push(Content {
            role: Some("user".to_string()),
            parts: request
                .files
                .iter()
                .map(|f| Part::file(&f.mime_type, &f.uri))
                .collect(),
        });
    }

    let generation_config = if request.json_output || request.temperature.is_some() {
        Some(GenerationConfig {
            response_mime_type: request
                .json_output
                .then(|| "application/json".to_string()),
            temperature: request.temperature,
        })
    } else {
        None
    };

    GenerateContentRequest {
        system_instruction: request.system.as_ref().map(|s| Content {
            role: None,
            parts: vec![Part::text(s)],
        }),
        contents,
        generation_config,
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let start = Instant::now();
        let body = build_generate_request(&request);

        debug!(
            subsystem = "inference",
            component = "gemini",
            op = "generate",
            model = %self.config.model,
            turns = request.turns.len(),
            files = request.files.len(),
            json_output = request.json_output,
            "Generating content"
        );

        let response = self
            .client
            .post(self.url(&format!(
                "/v1beta/models/{}:generateContent",
                self.config.model
            )))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        let result: GenerateContentResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let text = result.text().ok_or_else(|| {
            Error::Inference(format!("Gemini returned no text: {}", result.empty_reason()))
        })?;

        debug!(
            subsystem = "inference",
            component = "gemini",
            op = "generate",
            response_len = text.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Generation complete"
        );
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl RemoteFileService for GeminiClient {
    async fn get_file(&self, name: &str) -> Result<RemoteFile> {
        let response = self
            .client
            .get(self.url(&format!("/v1beta/{}", name)))
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await?;
        let file: GeminiFile = Self::check(response).await?.json().await?;
        Ok(file.into())
    }

    async fn upload_file(
        &self,
        display_name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<RemoteFile> {
        let start = Instant::now();
        let size = data.len();

        // Resumable protocol: start a session, then upload and finalize in one go
        let response = self
            .client
            .post(self.url("/upload/v1beta/files"))
            .header("x-goog-api-key", &self.config.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadStartRequest {
                file: UploadFileMetadata {
                    display_name: display_name.to_string(),
                },
            })
            .send()
            .await?;
        let response = Self::check(response).await?;

        let upload_url = response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Inference("Gemini upload session returned no upload URL".to_string())
            })?;

        let response = self
            .client
            .post(&upload_url)
            .header("Content-Length", size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await?;
        let uploaded: UploadResponse = Self::check(response).await?.json().await?;

        debug!(
            subsystem = "inference",
            component = "gemini",
            op = "upload_file",
            file_name = %uploaded.file.name,
            size,
            state = ?uploaded.file.state,
            duration_ms = start.elapsed().as_millis() as u64,
            "Uploaded file"
        );
        Ok(uploaded.file.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{ChatTurn, PreparedFile};
    use uuid::Uuid;

    fn pdf(uri: &str) -> PreparedFile {
        PreparedFile {
            id: Uuid::nil(),
            file_name: "deck.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            uri: uri.to_string(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = GeminiConfig::default();
        assert_eq!(config.base_url, DEFAULT_GEMINI_URL);
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.timeout_seconds, 300);
    }

    #[test]
    fn test_files_attach_to_last_user_turn() {
        let request = GenerationRequest {
            system: Some("Be brief.".to_string()),
            turns: vec![
                ChatTurn::user("Hi"),
                ChatTurn::assistant("Hello"),
                ChatTurn::user("Summarise the deck"),
            ],
            files: vec![pdf("https://g/files/a")],
            ..Default::default()
        };
        let body = build_generate_request(&request);

        assert_eq!(body.contents.len(), 3);
        assert_eq!(body.contents[1].role.as_deref(), Some("model"));
        assert_eq!(body.contents[0].parts.len(), 1);
        let last = &body.contents[2];
        assert_eq!(last.parts.len(), 2);
        assert!(last.parts[0].file_data.is_some());
        assert_eq!(last.parts[1].text.as_deref(), Some("Summarise the deck"));
        assert!(body.generation_config.is_none());
    }

    #[test]
    fn test_json_output_sets_response_mime_type() {
        let request = GenerationRequest {
            turns: vec![ChatTurn::user("Expand")],
            json_output: true,
            temperature: Some(0.4),
            ..Default::default()
        };
        let json = serde_json::to_value(build_generate_request(&request)).unwrap();
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn test_files_without_user_turn_get_own_turn() {
        let request = GenerationRequest {
            files: vec![pdf("https://g/files/a")],
            ..Default::default()
        };
        let body = build_generate_request(&request);
        assert_eq!(body.contents.len(), 1);
        assert_eq!(body.contents[0].role.as_deref(), Some("user"));
    }
}
