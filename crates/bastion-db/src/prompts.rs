//! Organisation prompt overrides.

use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use bastion_core::{EffectivePrompt, Error, Prompt, PromptKey, Result};

const COLUMNS: &str = "id, organisation_id, key, content, updated_at";

/// PostgreSQL repository for `prompts`.
#[derive(Clone)]
pub struct PgPromptRepository {
    pool: Pool<Postgres>,
}

impl PgPromptRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self, organisation_id: Uuid) -> Result<Vec<Prompt>> {
        sqlx::query_as::<_, Prompt>(&format!(
            "SELECT {COLUMNS} FROM prompts WHERE organisation_id = $1 ORDER BY key"
        ))
        .bind(organisation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get(&self, organisation_id: Uuid, key: PromptKey) -> Result<Option<Prompt>> {
        sqlx::query_as::<_, Prompt>(&format!(
            "SELECT {COLUMNS} FROM prompts WHERE organisation_id = $1 AND key = $2"
        ))
        .bind(organisation_id)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Insert or replace the organisation's override for `key`.
    pub async fn upsert(
        &self,
        organisation_id: Uuid,
        key: PromptKey,
        content: &str,
    ) -> Result<Prompt> {
        sqlx::query_as::<_, Prompt>(&format!(
            "INSERT INTO prompts (id, organisation_id, key, content, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (organisation_id, key)
             DO UPDATE SET content = EXCLUDED.content, updated_at = EXCLUDED.updated_at
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(organisation_id)
        .bind(key.as_str())
        .bind(content)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Remove an override. Returns false if the organisation had none.
    pub async fn delete(&self, organisation_id: Uuid, key: PromptKey) -> Result<bool> {
        let result = sqlx::query("DELETE FROM prompts WHERE organisation_id = $1 AND key = $2")
            .bind(organisation_id)
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// The prompt in effect for `key`: the override if present, else `default`.
    pub async fn effective(
        &self,
        organisation_id: Uuid,
        key: PromptKey,
        default: &str,
    ) -> Result<EffectivePrompt> {
        let prompt = self.get(organisation_id, key).await?;
        Ok(effective_prompt(key, prompt.as_ref(), default))
    }
}

/// Merge a stored override with the built-in default.
pub fn effective_prompt(key: PromptKey, stored: Option<&Prompt>, default: &str) -> EffectivePrompt {
    match stored {
        Some(prompt) => EffectivePrompt {
            key,
            content: prompt.content.clone(),
            is_default: false,
            updated_at: Some(prompt.updated_at),
        },
        None => EffectivePrompt {
            key,
            content: default.to_string(),
            is_default: true,
            updated_at: None,
        },
    }
}
