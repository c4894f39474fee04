//! Object storage backends for uploaded documents.
//!
//! Production uses Supabase Storage over HTTP. The filesystem backend serves
//! local development and tests.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bastion_db::file_storage::{source_storage_path, SupabaseStorageBackend};
//!
//! let storage = SupabaseStorageBackend::new(config, "bastion-files")?;
//! let path = source_storage_path(org_id, client_id, file_id, "Brand Guide.pdf");
//! storage.write(&path, &bytes, "application/pdf").await?;
//! ```

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use bastion_core::{storage_key_segment, Error, Result, StorageBackend};

use crate::supabase::{check_response, SupabaseConfig};

const SERVICE: &str = "Supabase Storage";

/// Compute BLAKE3 hash of data with "blake3:" prefix.
///
/// Returns a string in the format: `blake3:{64-char-hex}`
pub fn compute_content_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("blake3:{}", hash.to_hex())
}

/// Object key for a knowledge-base source.
///
/// Format: `sources/{organisation}/{client}/{file_id}-{safe_name}`
pub fn source_storage_path(
    organisation_id: Uuid,
    client_id: Uuid,
    file_id: Uuid,
    file_name: &str,
) -> String {
    format!(
        "sources/{}/{}/{}-{}",
        organisation_id,
        client_id,
        file_id,
        storage_key_segment(file_name)
    )
}

/// Object key for a brief attachment.
///
/// Format: `briefs/{organisation}/{brief}/{file_id}-{safe_name}`
pub fn brief_file_storage_path(
    organisation_id: Uuid,
    brief_id: Uuid,
    file_id: Uuid,
    file_name: &str,
) -> String {
    format!(
        "briefs/{}/{}/{}-{}",
        organisation_id,
        brief_id,
        file_id,
        storage_key_segment(file_name)
    )
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// =============================================================================
// SUPABASE STORAGE
// =============================================================================

/// Supabase Storage backend for a single bucket, authenticated with the
/// service-role key.
pub struct SupabaseStorageBackend {
    config: SupabaseConfig,
    bucket: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

impl SupabaseStorageBackend {
    pub fn new(config: SupabaseConfig, bucket: impl Into<String>) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self {
            config,
            bucket: bucket.into(),
            client,
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.config.url,
            self.bucket,
            encode_path(path)
        )
    }
}

#[async_trait]
impl StorageBackend for SupabaseStorageBackend {
    async fn write(&self, path: &str, data: &[u8], content_type: &str) -> Result<()> {
        debug!(
            subsystem = "storage",
            component = "supabase",
            op = "write",
            storage_path = %path,
            size = data.len(),
            "Uploading object"
        );
        let response = self
            .config
            .service(self.client.post(self.object_url(path)))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(data.to_vec())
            .send()
            .await?;
        check_response(SERVICE, response).await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let response = self
            .config
            .service(self.client.get(self.object_url(path)))
            .send()
            .await?;
        let response = check_response(SERVICE, response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}", self.config.url, self.bucket);
        let response = self
            .config
            .service(self.client.delete(url))
            .json(&serde_json::json!({ "prefixes": [path] }))
            .send()
            .await?;
        check_response(SERVICE, response).await?;
        Ok(())
    }

    async fn signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String> {
        let url = format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.config.url,
            self.bucket,
            encode_path(path)
        );
        let response = self
            .config
            .service(self.client.post(url))
            .json(&serde_json::json!({ "expiresIn": expires_in_secs }))
            .send()
            .await?;
        let body: SignedUrlResponse = check_response(SERVICE, response).await?.json().await?;

        // Supabase returns a path relative to /storage/v1.
        if body.signed_url.starts_with("http") {
            Ok(body.signed_url)
        } else {
            Ok(format!("{}/storage/v1{}", self.config.url, body.signed_url))
        }
    }
}

// =============================================================================
// FILESYSTEM
// =============================================================================

/// Filesystem storage backend rooted at a base directory.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Resolve a storage key under the base directory, refusing traversal.
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::Storage(format!("Invalid storage path: {}", path)));
        }
        Ok(self.base_path.join(relative))
    }

    /// Check that the backend can write, read, and delete at startup.
    pub async fn validate(&self) -> Result<()> {
        let probe = ".health-check/probe.bin";
        self.write(probe, b"storage-health-check", "application/octet-stream")
            .await?;
        if self.read(probe).await? != b"storage-health-check" {
            return Err(Error::Storage("read-back mismatch".to_string()));
        }
        self.delete(probe).await?;
        let _ = fs::remove_dir(self.base_path.join(".health-check")).await;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8], _content_type: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        debug!(
            subsystem = "storage",
            component = "filesystem",
            op = "write",
            storage_path = %path,
            size = data.len(),
            "Writing object"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "file_storage: create_dir_all failed");
                e
            })?;
        }

        // Temp file + rename so readers never see a partial object
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &full_path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Object {}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn signed_url(&self, path: &str, _expires_in_secs: u64) -> Result<String> {
        let full_path = self.full_path(path)?;
        Ok(format!("file://{}", full_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_format() {
        let hash = compute_content_hash(b"brand guidelines");
        assert!(hash.starts_with("blake3:"));
        assert_eq!(hash.len(), "blake3:".len() + 64);
        assert_eq!(hash, compute_content_hash(b"brand guidelines"));
    }

    #[test]
    fn test_source_storage_path_layout() {
        let org = Uuid::nil();
        let client = Uuid::from_u128(1);
        let file = Uuid::from_u128(2);
        let path = source_storage_path(org, client, file, "Brand Guide (v2).pdf");
        assert_eq!(
            path,
            format!("sources/{}/{}/{}-Brand_Guide__v2_.pdf", org, client, file)
        );
    }

    #[test]
    fn test_brief_storage_path_strips_directories() {
        let path = brief_file_storage_path(Uuid::nil(), Uuid::nil(), Uuid::nil(), "../../x.txt");
        assert!(path.starts_with("briefs/"));
        assert!(path.ends_with("-x.txt"));
        assert!(!path.contains(".."));
    }

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("sources/a b/c.pdf"), "sources/a%20b/c.pdf");
    }

    #[test]
    fn test_filesystem_rejects_traversal() {
        let backend = FilesystemBackend::new("/tmp/bastion");
        assert!(backend.full_path("../etc/passwd").is_err());
        assert!(backend.full_path("/etc/passwd").is_err());
        assert!(backend.full_path("sources/a/b.pdf").is_ok());
    }
}
