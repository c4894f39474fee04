//! Profile repository.

use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use bastion_core::{Error, NewProfile, Profile, Result, UpdateProfileRequest};

use crate::conflict_or_database;

const COLUMNS: &str =
    "id, organisation_id, email, full_name, role, practice_id, created_at, updated_at";

/// PostgreSQL repository for `profiles`.
#[derive(Clone)]
pub struct PgProfileRepository {
    pool: Pool<Postgres>,
}

impl PgProfileRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Look up a profile by auth user id, across all organisations.
    ///
    /// Used only while authenticating a bearer token.
    pub async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Profile>> {
        sqlx::query_as::<_, Profile>(&format!("SELECT {COLUMNS} FROM profiles WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    pub async fn list(&self, organisation_id: Uuid) -> Result<Vec<Profile>> {
        sqlx::query_as::<_, Profile>(&format!(
            "SELECT {COLUMNS} FROM profiles WHERE organisation_id = $1 ORDER BY full_name"
        ))
        .bind(organisation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get(&self, organisation_id: Uuid, id: Uuid) -> Result<Option<Profile>> {
        sqlx::query_as::<_, Profile>(&format!(
            "SELECT {COLUMNS} FROM profiles WHERE organisation_id = $1 AND id = $2"
        ))
        .bind(organisation_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn insert(&self, profile: &NewProfile) -> Result<Profile> {
        let now = Utc::now();
        sqlx::query_as::<_, Profile>(&format!(
            "INSERT INTO profiles
                (id, organisation_id, email, full_name, role, practice_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {COLUMNS}"
        ))
        .bind(profile.id)
        .bind(profile.organisation_id)
        .bind(&profile.email)
        .bind(profile.full_name.trim())
        .bind(profile.role.as_str())
        .bind(profile.practice_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            conflict_or_database(e, || format!("A profile for {} already exists", profile.email))
        })
    }

    pub async fn update(
        &self,
        organisation_id: Uuid,
        id: Uuid,
        req: &UpdateProfileRequest,
    ) -> Result<Option<Profile>> {
        sqlx::query_as::<_, Profile>(&format!(
            "UPDATE profiles
             SET full_name = COALESCE($3, full_name),
                 role = COALESCE($4, role),
                 practice_id = COALESCE($5, practice_id),
                 updated_at = $6
             WHERE organisation_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(organisation_id)
        .bind(id)
        .bind(req.full_name.as_deref().map(str::trim))
        .bind(req.role.map(|r| r.as_str()))
        .bind(req.practice_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn delete(&self, organisation_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE organisation_id = $1 AND id = $2")
            .bind(organisation_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
