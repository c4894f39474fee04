//! Core traits for Bastion abstractions.
//!
//! These are the seams between the API and the vendor-owned services it
//! calls, so handlers and the file helper can be exercised without Supabase
//! or Gemini.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{GeminiFileHandle, GenerationRequest, RemoteFile};
use crate::roles::Principal;

// =============================================================================
// IDENTITY
// =============================================================================

/// Resolves a bearer token into an authenticated principal.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns `Error::Unauthorized` for invalid tokens and
    /// `Error::Forbidden` for valid users without a profile.
    async fn authenticate(&self, token: &str) -> Result<Principal>;
}

// =============================================================================
// OBJECT STORAGE
// =============================================================================

/// Object storage for uploaded documents.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path, replacing any existing object.
    async fn write(&self, path: &str, data: &[u8], content_type: &str) -> Result<()>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete the object at the specified path.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Create a time-limited download URL for the object.
    async fn signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String>;
}

// =============================================================================
// GENERATIVE AI
// =============================================================================

/// Text generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a response for the request, returning the concatenated text.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;

    /// Model identifier used for generation.
    fn model_name(&self) -> &str;
}

/// Provider-side file store (Gemini Files API).
#[async_trait]
pub trait RemoteFileService: Send + Sync {
    /// Look up a previously uploaded file by resource name.
    async fn get_file(&self, name: &str) -> Result<RemoteFile>;

    /// Upload document bytes, returning the created file.
    async fn upload_file(&self, display_name: &str, mime_type: &str, data: Vec<u8>)
        -> Result<RemoteFile>;
}

/// Persists refreshed Gemini handles back onto the owning row.
#[async_trait]
pub trait FileHandleStore: Send + Sync {
    async fn save_handle(&self, file_id: Uuid, handle: &GeminiFileHandle) -> Result<()>;
}
