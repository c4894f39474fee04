//! Brief repository: briefs, their sections, and attached files.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use tracing::debug;
use uuid::Uuid;

use bastion_core::{
    Brief, BriefDetail, BriefFile, BriefSection, BriefStatus, CreateBriefRequest, Error,
    FileHandleStore, GeminiFileHandle, ListBriefsQuery, NewBriefSection, NewStoredFile, Result,
    UpdateBriefRequest, UpdateBriefSectionRequest,
};

const BRIEF_COLUMNS: &str = "id, organisation_id, client_id, practice_id, template_id, title, \
                             input, status, created_by, created_at, updated_at";
const SECTION_COLUMNS: &str = "id, organisation_id, brief_id, section_template_id, title, \
                               content, position, created_at, updated_at";
const FILE_COLUMNS: &str = "id, organisation_id, brief_id, file_name, mime_type, size_bytes, \
                            storage_path, gemini_file_uri, gemini_file_name, \
                            gemini_uploaded_at, created_at";

/// PostgreSQL repository for `briefs`, `brief_sections`, and `brief_files`.
#[derive(Clone)]
pub struct PgBriefRepository {
    pool: Pool<Postgres>,
}

impl PgBriefRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    // =========================================================================
    // BRIEFS
    // =========================================================================

    /// List briefs, most recently updated first.
    pub async fn list(&self, organisation_id: Uuid, query: &ListBriefsQuery) -> Result<Vec<Brief>> {
        sqlx::query_as::<_, Brief>(&format!(
            "SELECT {BRIEF_COLUMNS} FROM briefs
             WHERE organisation_id = $1
               AND ($2::uuid IS NULL OR client_id = $2)
               AND ($3::text IS NULL OR status = $3)
             ORDER BY updated_at DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(organisation_id)
        .bind(query.client_id)
        .bind(query.status.map(|s| s.as_str()))
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get(&self, organisation_id: Uuid, id: Uuid) -> Result<Option<Brief>> {
        sqlx::query_as::<_, Brief>(&format!(
            "SELECT {BRIEF_COLUMNS} FROM briefs WHERE organisation_id = $1 AND id = $2"
        ))
        .bind(organisation_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get_detail(&self, organisation_id: Uuid, id: Uuid) -> Result<Option<BriefDetail>> {
        let Some(brief) = self.get(organisation_id, id).await? else {
            return Ok(None);
        };
        let sections = self.sections(organisation_id, id).await?;
        let files = self.files(organisation_id, id).await?;
        Ok(Some(BriefDetail {
            brief,
            sections,
            files,
        }))
    }

    pub async fn create(
        &self,
        organisation_id: Uuid,
        created_by: Uuid,
        req: &CreateBriefRequest,
    ) -> Result<Brief> {
        sqlx::query_as::<_, Brief>(&format!(
            "INSERT INTO briefs
                (id, organisation_id, client_id, practice_id, template_id, title, input,
                 status, created_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
             RETURNING {BRIEF_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(organisation_id)
        .bind(req.client_id)
        .bind(req.practice_id)
        .bind(req.template_id)
        .bind(req.title.trim())
        .bind(&req.input)
        .bind(BriefStatus::Draft.as_str())
        .bind(created_by)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn update(
        &self,
        organisation_id: Uuid,
        id: Uuid,
        req: &UpdateBriefRequest,
    ) -> Result<Option<Brief>> {
        sqlx::query_as::<_, Brief>(&format!(
            "UPDATE briefs
             SET title = COALESCE($3, title),
                 input = COALESCE($4, input),
                 template_id = COALESCE($5, template_id),
                 updated_at = $6
             WHERE organisation_id = $1 AND id = $2
             RETURNING {BRIEF_COLUMNS}"
        ))
        .bind(organisation_id)
        .bind(id)
        .bind(req.title.as_deref().map(str::trim))
        .bind(req.input.as_deref())
        .bind(req.template_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn set_status(
        &self,
        organisation_id: Uuid,
        id: Uuid,
        status: BriefStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE briefs SET status = $3, updated_at = $4
             WHERE organisation_id = $1 AND id = $2",
        )
        .bind(organisation_id)
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    pub async fn delete(&self, organisation_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM briefs WHERE organisation_id = $1 AND id = $2")
            .bind(organisation_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // SECTIONS
    // =========================================================================

    pub async fn sections(&self, organisation_id: Uuid, brief_id: Uuid) -> Result<Vec<BriefSection>> {
        sqlx::query_as::<_, BriefSection>(&format!(
            "SELECT {SECTION_COLUMNS} FROM brief_sections
             WHERE organisation_id = $1 AND brief_id = $2
             ORDER BY position"
        ))
        .bind(organisation_id)
        .bind(brief_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn update_section(
        &self,
        organisation_id: Uuid,
        brief_id: Uuid,
        section_id: Uuid,
        req: &UpdateBriefSectionRequest,
    ) -> Result<Option<BriefSection>> {
        sqlx::query_as::<_, BriefSection>(&format!(
            "UPDATE brief_sections
             SET title = COALESCE($4, title),
                 content = COALESCE($5, content),
                 updated_at = $6
             WHERE organisation_id = $1 AND brief_id = $2 AND id = $3
             RETURNING {SECTION_COLUMNS}"
        ))
        .bind(organisation_id)
        .bind(brief_id)
        .bind(section_id)
        .bind(req.title.as_deref().map(str::trim))
        .bind(req.content.as_deref())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Replace all sections of a brief and mark it expanded, atomically.
    pub async fn replace_sections(
        &self,
        organisation_id: Uuid,
        brief_id: Uuid,
        sections: &[NewBriefSection],
    ) -> Result<Vec<BriefSection>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let now = Utc::now();

        sqlx::query("DELETE FROM brief_sections WHERE organisation_id = $1 AND brief_id = $2")
            .bind(organisation_id)
            .bind(brief_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let mut inserted = Vec::with_capacity(sections.len());
        for (position, section) in sections.iter().enumerate() {
            let row = sqlx::query_as::<_, BriefSection>(&format!(
                "INSERT INTO brief_sections
                    (id, organisation_id, brief_id, section_template_id, title, content,
                     position, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                 RETURNING {SECTION_COLUMNS}"
            ))
            .bind(Uuid::now_v7())
            .bind(organisation_id)
            .bind(brief_id)
            .bind(section.section_template_id)
            .bind(&section.title)
            .bind(&section.content)
            .bind(position as i32)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;
            inserted.push(row);
        }

        sqlx::query(
            "UPDATE briefs SET status = $3, updated_at = $4
             WHERE organisation_id = $1 AND id = $2",
        )
        .bind(organisation_id)
        .bind(brief_id)
        .bind(BriefStatus::Expanded.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "briefs",
            op = "replace_sections",
            brief_id = %brief_id,
            sections = inserted.len(),
            "Replaced brief sections"
        );
        Ok(inserted)
    }

    // =========================================================================
    // FILES
    // =========================================================================

    pub async fn files(&self, organisation_id: Uuid, brief_id: Uuid) -> Result<Vec<BriefFile>> {
        sqlx::query_as::<_, BriefFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM brief_files
             WHERE organisation_id = $1 AND brief_id = $2
             ORDER BY created_at"
        ))
        .bind(organisation_id)
        .bind(brief_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn insert_file(&self, file: &NewStoredFile) -> Result<BriefFile> {
        sqlx::query_as::<_, BriefFile>(&format!(
            "INSERT INTO brief_files
                (id, organisation_id, brief_id, file_name, mime_type, size_bytes,
                 storage_path, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(file.id)
        .bind(file.organisation_id)
        .bind(file.parent_id)
        .bind(&file.file_name)
        .bind(&file.mime_type)
        .bind(file.size_bytes)
        .bind(&file.storage_path)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Delete a file row, returning it so the caller can remove the object.
    pub async fn delete_file(
        &self,
        organisation_id: Uuid,
        brief_id: Uuid,
        file_id: Uuid,
    ) -> Result<Option<BriefFile>> {
        sqlx::query_as::<_, BriefFile>(&format!(
            "DELETE FROM brief_files
             WHERE organisation_id = $1 AND brief_id = $2 AND id = $3
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(organisation_id)
        .bind(brief_id)
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }
}

#[async_trait]
impl FileHandleStore for PgBriefRepository {
    async fn save_handle(&self, file_id: Uuid, handle: &GeminiFileHandle) -> Result<()> {
        sqlx::query(
            "UPDATE brief_files
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
