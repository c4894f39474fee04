//! Organisation repository. The only unscoped table; super admins manage it.

use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use bastion_core::{
    CreateOrganisationRequest, Error, Organisation, Result, UpdateOrganisationRequest,
};

use crate::conflict_or_database;

const COLUMNS: &str = "id, name, slug, created_at, updated_at";

/// PostgreSQL repository for `organisations`.
#[derive(Clone)]
pub struct PgOrganisationRepository {
    pool: Pool<Postgres>,
}

impl PgOrganisationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Organisation>> {
        sqlx::query_as::<_, Organisation>(&format!(
            "SELECT {COLUMNS} FROM organisations ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Organisation>> {
        sqlx::query_as::<_, Organisation>(&format!(
            "SELECT {COLUMNS} FROM organisations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn create(&self, req: &CreateOrganisationRequest) -> Result<Organisation> {
        let now = Utc::now();
        sqlx::query_as::<_, Organisation>(&format!(
            "INSERT INTO organisations (id, name, slug, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(req.name.trim())
        .bind(&req.slug)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            conflict_or_database(e, || format!("Organisation slug '{}' is taken", req.slug))
        })
    }

    /// Returns `None` when the organisation does not exist.
    pub async fn update(
        &self,
        id: Uuid,
        req: &UpdateOrganisationRequest,
    ) -> Result<Option<Organisation>> {
        sqlx::query_as::<_, Organisation>(&format!(
            "UPDATE organisations
             SET name = COALESCE($2, name),
                 slug = COALESCE($3, slug),
                 updated_at = $4
             WHERE id = $1
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.slug.as_deref())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_or_database(e, || "Organisation slug is taken".to_string()))
    }

    /// Storage paths of every client source and brief file the organisation owns.
    pub async fn storage_paths(&self, id: Uuid) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT storage_path FROM client_sources WHERE organisation_id = $1
             UNION ALL
             SELECT storage_path FROM brief_files WHERE organisation_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Delete an organisation and, by cascade, everything it owns.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM organisations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
