//! Client repository, including the stored knowledge-base digest.

use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use bastion_core::{Client, CreateClientRequest, Error, Result, UpdateClientRequest};

const COLUMNS: &str = "id, organisation_id, name, industry, description, kb_digest, \
                       kb_digest_updated_at, created_at, updated_at";

/// PostgreSQL repository for `clients`.
#[derive(Clone)]
pub struct PgClientRepository {
    pool: Pool<Postgres>,
}

impl PgClientRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self, organisation_id: Uuid) -> Result<Vec<Client>> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {COLUMNS} FROM clients WHERE organisation_id = $1 ORDER BY name"
        ))
        .bind(organisation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get(&self, organisation_id: Uuid, id: Uuid) -> Result<Option<Client>> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {COLUMNS} FROM clients WHERE organisation_id = $1 AND id = $2"
        ))
        .bind(organisation_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn create(&self, organisation_id: Uuid, req: &CreateClientRequest) -> Result<Client> {
        sqlx::query_as::<_, Client>(&format!(
            "INSERT INTO clients
                (id, organisation_id, name, industry, description, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(organisation_id)
        .bind(req.name.trim())
        .bind(req.industry.as_deref().map(str::trim))
        .bind(req.description.as_deref())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn update(
        &self,
        organisation_id: Uuid,
        id: Uuid,
        req: &UpdateClientRequest,
    ) -> Result<Option<Client>> {
        sqlx::query_as::<_, Client>(&format!(
            "UPDATE clients
             SET name = COALESCE($3, name),
                 industry = COALESCE($4, industry),
                 description = COALESCE($5, description),
                 updated_at = $6
             WHERE organisation_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(organisation_id)
        .bind(id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.industry.as_deref().map(str::trim))
        .bind(req.description.as_deref())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Store a freshly generated digest.
    pub async fn set_digest(&self, organisation_id: Uuid, id: Uuid, digest: &str) -> Result<()> {
        sqlx::query(
            "UPDATE clients SET kb_digest = $3, kb_digest_updated_at = $4
             WHERE organisation_id = $1 AND id = $2",
        )
        .bind(organisation_id)
        .bind(id)
        .bind(digest)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    pub async fn delete(&self, organisation_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM clients WHERE organisation_id = $1 AND id = $2")
            .bind(organisation_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
