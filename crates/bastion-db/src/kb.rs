//! Knowledge-base conversations and messages.
//!
//! Conversations belong to the user who started them; every lookup filters
//! on both organisation and user.

use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use bastion_core::defaults::DEFAULT_CONVERSATION_TITLE;
use bastion_core::{Error, KbConversation, KbMessage, MessageRole, Result};

const CONVERSATION_COLUMNS: &str =
    "id, organisation_id, client_id, user_id, title, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, organisation_id, conversation_id, role, content, created_at";

/// PostgreSQL repository for `kb_conversations` and `kb_messages`.
#[derive(Clone)]
pub struct PgKbRepository {
    pool: Pool<Postgres>,
}

impl PgKbRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// The user's conversations about a client, most recent first.
    pub async fn list_conversations(
        &self,
        organisation_id: Uuid,
        client_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<KbConversation>> {
        sqlx::query_as::<_, KbConversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM kb_conversations
             WHERE organisation_id = $1 AND client_id = $2 AND user_id = $3
             ORDER BY updated_at DESC"
        ))
        .bind(organisation_id)
        .bind(client_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get_conversation(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<KbConversation>> {
        sqlx::query_as::<_, KbConversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM kb_conversations
             WHERE organisation_id = $1 AND user_id = $2 AND id = $3"
        ))
        .bind(organisation_id)
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn create_conversation(
        &self,
        organisation_id: Uuid,
        client_id: Uuid,
        user_id: Uuid,
        title: Option<&str>,
    ) -> Result<KbConversation> {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE);
        sqlx::query_as::<_, KbConversation>(&format!(
            "INSERT INTO kb_conversations
                (id, organisation_id, client_id, user_id, title, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(organisation_id)
        .bind(client_id)
        .bind(user_id)
        .bind(title)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn rename_conversation(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        id: Uuid,
        title: &str,
    ) -> Result<Option<KbConversation>> {
        sqlx::query_as::<_, KbConversation>(&format!(
            "UPDATE kb_conversations SET title = $4, updated_at = $5
             WHERE organisation_id = $1 AND user_id = $2 AND id = $3
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(organisation_id)
        .bind(user_id)
        .bind(id)
        .bind(title.trim())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Replace the placeholder title; leaves user-chosen titles alone.
    pub async fn auto_title(&self, id: Uuid, title: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE kb_conversations SET title = $2 WHERE id = $1 AND title = $3",
        )
        .bind(id)
        .bind(title)
        .bind(DEFAULT_CONVERSATION_TITLE)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_conversation(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM kb_conversations WHERE organisation_id = $1 AND user_id = $2 AND id = $3",
        )
        .bind(organisation_id)
        .bind(user_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// All messages of a conversation in chronological order.
    pub async fn messages(
        &self,
        organisation_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Vec<KbMessage>> {
        sqlx::query_as::<_, KbMessage>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM kb_messages
             WHERE organisation_id = $1 AND conversation_id = $2
             ORDER BY created_at, id"
        ))
        .bind(organisation_id)
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// The latest `limit` messages, returned oldest first.
    pub async fn recent_messages(
        &self,
        organisation_id: Uuid,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<KbMessage>> {
        sqlx::query_as::<_, KbMessage>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM (
                 SELECT {MESSAGE_COLUMNS} FROM kb_messages
                 WHERE organisation_id = $1 AND conversation_id = $2
                 ORDER BY created_at DESC, id DESC
                 LIMIT $3
             ) recent
             ORDER BY created_at, id"
        ))
        .bind(organisation_id)
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Append a message and bump the conversation's `updated_at`.
    pub async fn insert_message(
        &self,
        organisation_id: Uuid,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<KbMessage> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let now = Utc::now();

        let message = sqlx::query_as::<_, KbMessage>(&format!(
            "INSERT INTO kb_messages (id, organisation_id, conversation_id, role, content, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(organisation_id)
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("UPDATE kb_conversations SET updated_at = $2 WHERE id = $1")
            .bind(conversation_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(message)
    }
}
