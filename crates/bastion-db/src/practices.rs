//! Practice repository.

use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use bastion_core::{CreatePracticeRequest, Error, Practice, Result, UpdatePracticeRequest};

const COLUMNS: &str = "id, organisation_id, name, description, created_at, updated_at";

/// PostgreSQL repository for `practices`.
#[derive(Clone)]
pub struct PgPracticeRepository {
    pool: Pool<Postgres>,
}

impl PgPracticeRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self, organisation_id: Uuid) -> Result<Vec<Practice>> {
        sqlx::query_as::<_, Practice>(&format!(
            "SELECT {COLUMNS} FROM practices WHERE organisation_id = $1 ORDER BY name"
        ))
        .bind(organisation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get(&self, organisation_id: Uuid, id: Uuid) -> Result<Option<Practice>> {
        sqlx::query_as::<_, Practice>(&format!(
            "SELECT {COLUMNS} FROM practices WHERE organisation_id = $1 AND id = $2"
        ))
        .bind(organisation_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn create(
        &self,
        organisation_id: Uuid,
        req: &CreatePracticeRequest,
    ) -> Result<Practice> {
        sqlx::query_as::<_, Practice>(&format!(
            "INSERT INTO practices (id, organisation_id, name, description, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(organisation_id)
        .bind(req.name.trim())
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
        req: &UpdatePracticeRequest,
    ) -> Result<Option<Practice>> {
        sqlx::query_as::<_, Practice>(&format!(
            "UPDATE practices
             SET name = COALESCE($3, name),
                 description = COALESCE($4, description),
                 updated_at = $5
             WHERE organisation_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(organisation_id)
        .bind(id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.description.as_deref())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn delete(&self, organisation_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM practices WHERE organisation_id = $1 AND id = $2")
            .bind(organisation_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
