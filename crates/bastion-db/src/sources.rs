//! Knowledge-base source repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use bastion_core::{
    ClientSource, Error, FileHandleStore, GeminiFileHandle, NewStoredFile, Result,
};

use crate::conflict_or_database;

const COLUMNS: &str = "id, organisation_id, client_id, file_name, mime_type, size_bytes, \
                       storage_path, content_hash, gemini_file_uri, gemini_file_name, \
                       gemini_uploaded_at, uploaded_by, created_at";

/// PostgreSQL repository for `client_sources`.
#[derive(Clone)]
pub struct PgSourceRepository {
    pool: Pool<Postgres>,
}

impl PgSourceRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Sources for a client, oldest first.
    pub async fn list_for_client(
        &self,
        organisation_id: Uuid,
        client_id: Uuid,
    ) -> Result<Vec<ClientSource>> {
        sqlx::query_as::<_, ClientSource>(&format!(
            "SELECT {COLUMNS} FROM client_sources
             WHERE organisation_id = $1 AND client_id = $2
             ORDER BY created_at"
        ))
        .bind(organisation_id)
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get(&self, organisation_id: Uuid, id: Uuid) -> Result<Option<ClientSource>> {
        sqlx::query_as::<_, ClientSource>(&format!(
            "SELECT {COLUMNS} FROM client_sources WHERE organisation_id = $1 AND id = $2"
        ))
        .bind(organisation_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Find an existing upload of the same bytes for this client.
    pub async fn find_by_hash(
        &self,
        organisation_id: Uuid,
        client_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<ClientSource>> {
        sqlx::query_as::<_, ClientSource>(&format!(
            "SELECT {COLUMNS} FROM client_sources
             WHERE organisation_id = $1 AND client_id = $2 AND content_hash = $3"
        ))
        .bind(organisation_id)
        .bind(client_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Insert a source row. A concurrent duplicate upload surfaces as `Conflict`.
    pub async fn insert(&self, file: &NewStoredFile) -> Result<ClientSource> {
        sqlx::query_as::<_, ClientSource>(&format!(
            "INSERT INTO client_sources
                (id, organisation_id, client_id, file_name, mime_type, size_bytes,
                 storage_path, content_hash, uploaded_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {COLUMNS}"
        ))
        .bind(file.id)
        .bind(file.organisation_id)
        .bind(file.parent_id)
        .bind(&file.file_name)
        .bind(&file.mime_type)
        .bind(file.size_bytes)
        .bind(&file.storage_path)
        .bind(&file.content_hash)
        .bind(file.uploaded_by)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            conflict_or_database(e, || {
                format!("'{}' has already been uploaded for this client", file.file_name)
            })
        })
    }

    /// Delete a source row, returning it so the caller can remove the object.
    pub async fn delete(&self, organisation_id: Uuid, id: Uuid) -> Result<Option<ClientSource>> {
        sqlx::query_as::<_, ClientSource>(&format!(
            "DELETE FROM client_sources WHERE organisation_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(organisation_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }
}

#[async_trait]
impl FileHandleStore for PgSourceRepository {
    async fn save_handle(&self, file_id: Uuid, handle: &GeminiFileHandle) -> Result<()> {
        sqlx::query(
            "UPDATE client_sources
             SET gemini_file_uri = $2, gemini_file_name = $3, gemini_uploaded_at = $4
             WHERE id = $1",
        )
        .bind(file_id)
        .bind(&handle.uri)
        .bind(&handle.name)
        .bind(handle.uploaded_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
