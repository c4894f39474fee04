//! AI expansion of briefs into template sections, and single-section rewrites.

use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use bastion_core::{
    BriefDetail, BriefSection, BriefStatus, ChatTurn, Client, Error, GenerationRequest, PromptKey,
    Result, SectionTemplate, UpdateBriefSectionRequest,
};
use bastion_inference::prompts::{expansion_prompt, regeneration_prompt};
use bastion_inference::{default_prompt, parse_expansion_response};

use super::file_prep::{ignore_progress, prepare_brief_files};
use crate::AppState;

async fn load_client(state: &AppState, organisation_id: Uuid, client_id: Uuid) -> Result<Client> {
    state
        .db
        .clients
        .get(organisation_id, client_id)
        .await?
        .ok_or_else(|| Error::NotFound("Client not found".to_string()))
}

async fn system_prompt(state: &AppState, organisation_id: Uuid, key: PromptKey) -> Result<String> {
    Ok(state
        .db
        .prompts
        .effective(organisation_id, key, default_prompt(key))
        .await?
        .content)
}

/// Expand a brief into its template's sections.
///
/// The brief is `expanding` while the model runs. On success its sections
/// are replaced and it becomes `expanded` in one transaction; on any failure
/// it becomes `failed` and the error is returned.
pub async fn expand_brief(
    state: &AppState,
    organisation_id: Uuid,
    brief_id: Uuid,
) -> Result<BriefDetail> {
    let start = Instant::now();
    let detail = state
        .db
        .briefs
        .get_detail(organisation_id, brief_id)
        .await?
        .ok_or_else(|| Error::NotFound("Brief not found".to_string()))?;
    let template_id = detail.brief.template_id.ok_or_else(|| {
        Error::InvalidInput("Brief has no template to expand from".to_string())
    })?;
    let template = state
        .db
        .templates
        .get_with_sections(organisation_id, template_id)
        .await?
        .ok_or_else(|| Error::NotFound("Template not found".to_string()))?;
    let client = load_client(state, organisation_id, detail.brief.client_id).await?;

    state
        .db
        .briefs
        .set_status(organisation_id, brief_id, BriefStatus::Expanding)
        .await?;

    match run_expansion(state, &detail, &template.sections, &client).await {
        Ok(sections) => {
            info!(
                subsystem = "api",
                component = "briefs",
                op = "expand",
                brief_id = %brief_id,
                sections = sections.len(),
                files = detail.files.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Brief expanded"
            );
            state
                .db
                .briefs
                .get_detail(organisation_id, brief_id)
                .await?
                .ok_or_else(|| Error::NotFound("Brief not found".to_string()))
        }
        Err(e) => {
            warn!(
                subsystem = "api",
                component = "briefs",
                op = "expand",
                brief_id = %brief_id,
                error = %e,
                "Brief expansion failed"
            );
            if let Err(status_err) = state
                .db
                .briefs
                .set_status(organisation_id, brief_id, BriefStatus::Failed)
                .await
            {
                warn!(brief_id = %brief_id, error = %status_err, "Could not mark brief failed");
            }
            Err(e)
        }
    }
}

async fn run_expansion(
    state: &AppState,
    detail: &BriefDetail,
    sections: &[SectionTemplate],
    client: &Client,
) -> Result<Vec<BriefSection>> {
    let brief = &detail.brief;
    let files = prepare_brief_files(state, &detail.files, &ignore_progress).await;

    let request = GenerationRequest {
        system: Some(system_prompt(state, brief.organisation_id, PromptKey::BriefExpansion).await?),
        turns: vec![ChatTurn::user(expansion_prompt(brief, sections, client))],
        files,
        json_output: true,
        temperature: None,
    };
    let text = state.generator.generate(request).await?;
    let new_sections = parse_expansion_response(&text, sections)?;

    state
        .db
        .briefs
        .replace_sections(brief.organisation_id, brief.id, &new_sections)
        .await
}

/// Rewrite one section with the rest of the brief as context.
///
/// `instructions` is extra direction from the user for this rewrite only.
pub async fn regenerate_section(
    state: &AppState,
    organisation_id: Uuid,
    brief_id: Uuid,
    section_id: Uuid,
    instructions: Option<&str>,
) -> Result<BriefSection> {
    let start = Instant::now();
    let brief = state
        .db
        .briefs
        .get(organisation_id, brief_id)
        .await?
        .ok_or_else(|| Error::NotFound("Brief not found".to_string()))?;
    let sections = state.db.briefs.sections(organisation_id, brief_id).await?;
    let target = sections
        .iter()
        .find(|s| s.id == section_id)
        .ok_or_else(|| Error::NotFound("Section not found".to_string()))?;
    let client = load_client(state, organisation_id, brief.client_id).await?;

    let section_instructions = match (brief.template_id, target.section_template_id) {
        (Some(template_id), Some(section_template_id)) => state
            .db
            .templates
            .sections(organisation_id, template_id)
            .await?
            .into_iter()
            .find(|s| s.id == section_template_id)
            .and_then(|s| s.instructions),
        _ => None,
    };

    let files = state.db.briefs.files(organisation_id, brief_id).await?;
    let files = prepare_brief_files(state, &files, &ignore_progress).await;

    let request = GenerationRequest {
        system: Some(
            system_prompt(state, organisation_id, PromptKey::SectionRegeneration).await?,
        ),
        turns: vec![ChatTurn::user(regeneration_prompt(
            &brief,
            &sections,
            target,
            section_instructions.as_deref(),
            instructions,
            &client,
        ))],
        files,
        ..Default::default()
    };
    let text = state.generator.generate(request).await?;
    let content = text.trim();
    if content.is_empty() {
        return Err(Error::Inference(
            "Model returned an empty section".to_string(),
        ));
    }

    let update = UpdateBriefSectionRequest {
        title: None,
        content: Some(content.to_string()),
    };
    let section = state
        .db
        .briefs
        .update_section(organisation_id, brief_id, section_id, &update)
        .await?
        .ok_or_else(|| Error::NotFound("Section not found".to_string()))?;

    info!(
        subsystem = "api",
        component = "briefs",
        op = "regenerate_section",
        brief_id = %brief_id,
        section_id = %section_id,
        duration_ms = start.elapsed().as_millis() as u64,
        "Section regenerated"
    );
    Ok(section)
}
