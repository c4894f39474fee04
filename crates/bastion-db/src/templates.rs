//! Practice template and section template repository.
//!
//! Section lists are always written whole: creating a template with sections
//! and replacing a template's sections each run in one transaction, so a
//! template is never left with a partial list.

use chrono::Utc;
use sqlx::{Pool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use bastion_core::{
    CreateTemplateRequest, Error, PracticeTemplate, Result, SectionTemplate,
    SectionTemplateInput, TemplateWithSections, UpdateTemplateRequest,
};

const TEMPLATE_COLUMNS: &str =
    "id, organisation_id, practice_id, name, description, created_at, updated_at";
const SECTION_COLUMNS: &str =
    "id, organisation_id, template_id, title, instructions, position, created_at";

/// PostgreSQL repository for `practice_templates` and `section_templates`.
#[derive(Clone)]
pub struct PgTemplateRepository {
    pool: Pool<Postgres>,
}

impl PgTemplateRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list_for_practice(
        &self,
        organisation_id: Uuid,
        practice_id: Uuid,
    ) -> Result<Vec<PracticeTemplate>> {
        sqlx::query_as::<_, PracticeTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM practice_templates
             WHERE organisation_id = $1 AND practice_id = $2
             ORDER BY name"
        ))
        .bind(organisation_id)
        .bind(practice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get(&self, organisation_id: Uuid, id: Uuid) -> Result<Option<PracticeTemplate>> {
        sqlx::query_as::<_, PracticeTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM practice_templates
             WHERE organisation_id = $1 AND id = $2"
        ))
        .bind(organisation_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Section templates in position order.
    pub async fn sections(
        &self,
        organisation_id: Uuid,
        template_id: Uuid,
    ) -> Result<Vec<SectionTemplate>> {
        sqlx::query_as::<_, SectionTemplate>(&format!(
            "SELECT {SECTION_COLUMNS} FROM section_templates
             WHERE organisation_id = $1 AND template_id = $2
             ORDER BY position"
        ))
        .bind(organisation_id)
        .bind(template_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn get_with_sections(
        &self,
        organisation_id: Uuid,
        id: Uuid,
    ) -> Result<Option<TemplateWithSections>> {
        let Some(template) = self.get(organisation_id, id).await? else {
            return Ok(None);
        };
        let sections = self.sections(organisation_id, id).await?;
        Ok(Some(TemplateWithSections { template, sections }))
    }

    pub async fn create(
        &self,
        organisation_id: Uuid,
        practice_id: Uuid,
        req: &CreateTemplateRequest,
    ) -> Result<TemplateWithSections> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let now = Utc::now();

        let template = sqlx::query_as::<_, PracticeTemplate>(&format!(
            "INSERT INTO practice_templates
                (id, organisation_id, practice_id, name, description, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {TEMPLATE_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(organisation_id)
        .bind(practice_id)
        .bind(req.name.trim())
        .bind(req.description.as_deref())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let sections =
            insert_sections_tx(&mut tx, organisation_id, template.id, &req.sections).await?;
        tx.commit().await.map_err(Error::Database)?;

        Ok(TemplateWithSections { template, sections })
    }

    pub async fn update(
        &self,
        organisation_id: Uuid,
        id: Uuid,
        req: &UpdateTemplateRequest,
    ) -> Result<Option<PracticeTemplate>> {
        sqlx::query_as::<_, PracticeTemplate>(&format!(
            "UPDATE practice_templates
             SET name = COALESCE($3, name),
                 description = COALESCE($4, description),
                 updated_at = $5
             WHERE organisation_id = $1 AND id = $2
             RETURNING {TEMPLATE_COLUMNS}"
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
        let result =
            sqlx::query("DELETE FROM practice_templates WHERE organisation_id = $1 AND id = $2")
                .bind(organisation_id)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace every section of a template in one transaction.
    ///
    /// The caller has already checked that the template belongs to the
    /// organisation.
    pub async fn replace_sections(
        &self,
        organisation_id: Uuid,
        template_id: Uuid,
        sections: &[SectionTemplateInput],
    ) -> Result<Vec<SectionTemplate>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let removed = sqlx::query(
            "DELETE FROM section_templates WHERE organisation_id = $1 AND template_id = $2",
        )
        .bind(organisation_id)
        .bind(template_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        let inserted = insert_sections_tx(&mut tx, organisation_id, template_id, sections).await?;

        sqlx::query("UPDATE practice_templates SET updated_at = $2 WHERE id = $1")
            .bind(template_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "templates",
            op = "replace_sections",
            template_id = %template_id,
            removed,
            inserted = inserted.len(),
            "Replaced section templates"
        );
        Ok(inserted)
    }
}

async fn insert_sections_tx(
    tx: &mut Transaction<'_, Postgres>,
    organisation_id: Uuid,
    template_id: Uuid,
    sections: &[SectionTemplateInput],
) -> Result<Vec<SectionTemplate>> {
    let now = Utc::now();
    let mut inserted = Vec::with_capacity(sections.len());
    for (position, section) in sections.iter().enumerate() {
        let row = sqlx::query_as::<_, SectionTemplate>(&format!(
            "INSERT INTO section_templates
                (id, organisation_id, template_id, title, instructions, position, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {SECTION_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(organisation_id)
        .bind(template_id)
        .bind(section.title.trim())
        .bind(section.instructions.as_deref())
        .bind(position as i32)
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;
        inserted.push(row);
    }
    Ok(inserted)
}
