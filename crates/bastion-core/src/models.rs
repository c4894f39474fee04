//! Core data models for Bastion OS.
//!
//! Row types map one-to-one onto the Postgres tables; request types carry
//! their own `validate()` so handlers can reject bad bodies before touching
//! the database.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::{MAX_SECTION_TEMPLATES, PAGE_LIMIT, PAGE_LIMIT_MAX};
use crate::error::{Error, Result};
use crate::roles::Role;
use crate::validation::{
    validate_content, validate_email, validate_name, validate_slug, validate_text,
};

/// Implements `as_str`, `Display`, `FromStr`, and `TryFrom<String>` for a
/// text-backed enum column.
macro_rules! text_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "Unknown {} '{}'",
                        $label, other
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                value.parse()
            }
        }
    };
}

// =============================================================================
// ORGANISATIONS & PROFILES
// =============================================================================

/// Tenant boundary.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organisation {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrganisationRequest {
    pub name: String,
    pub slug: String,
}

impl CreateOrganisationRequest {
    pub fn validate(&self) -> Result<()> {
        validate_name("name", &self.name)?;
        validate_slug(&self.slug)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrganisationRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
}

impl UpdateOrganisationRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        if let Some(slug) = &self.slug {
            validate_slug(slug)?;
        }
        Ok(())
    }
}

/// A user's profile row. `id` equals the Supabase auth user id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub email: String,
    pub full_name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub practice_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/admin/users`.
#[derive(Debug, Clone, Deserialize)]
pub struct InviteUserRequest {
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub practice_id: Option<Uuid>,
}

impl InviteUserRequest {
    pub fn validate(&self) -> Result<()> {
        validate_email(&self.email)?;
        validate_name("full_name", &self.full_name)
    }
}

/// Profile row to insert once the auth user exists.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub practice_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub practice_id: Option<Uuid>,
}

impl UpdateProfileRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.full_name {
            validate_name("full_name", name)?;
        }
        Ok(())
    }
}

// =============================================================================
// PRACTICES & CLIENTS
// =============================================================================

/// Department or discipline within an organisation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Practice {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePracticeRequest {
    pub name: String,
    pub description: Option<String>,
}

impl CreatePracticeRequest {
    pub fn validate(&self) -> Result<()> {
        validate_name("name", &self.name)?;
        validate_text("description", self.description.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePracticeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl UpdatePracticeRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        validate_text("description", self.description.as_deref())
    }
}

/// An agency client whose documents make up a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub kb_digest: Option<String>,
    pub kb_digest_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    pub industry: Option<String>,
    pub description: Option<String>,
}

impl CreateClientRequest {
    pub fn validate(&self) -> Result<()> {
        validate_name("name", &self.name)?;
        if let Some(industry) = &self.industry {
            validate_name("industry", industry)?;
        }
        validate_text("description", self.description.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
}

impl UpdateClientRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        if let Some(industry) = &self.industry {
            validate_name("industry", industry)?;
        }
        validate_text("description", self.description.as_deref())
    }
}

// =============================================================================
// TEMPLATES
// =============================================================================

/// Brief template owned by a practice.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PracticeTemplate {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub practice_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One section of a practice template, with guidance for the model.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SectionTemplate {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub template_id: Uuid,
    pub title: String,
    pub instructions: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateWithSections {
    #[serde(flatten)]
    pub template: PracticeTemplate,
    pub sections: Vec<SectionTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub sections: Vec<SectionTemplateInput>,
}

impl CreateTemplateRequest {
    pub fn validate(&self) -> Result<()> {
        validate_name("name", &self.name)?;
        validate_text("description", self.description.as_deref())?;
        if !self.sections.is_empty() {
            validate_section_inputs(&self.sections)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl UpdateTemplateRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        validate_text("description", self.description.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionTemplateInput {
    pub title: String,
    pub instructions: Option<String>,
}

/// Body of `PUT /api/admin/templates/:id/sections`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceSectionsRequest {
    pub sections: Vec<SectionTemplateInput>,
}

impl ReplaceSectionsRequest {
    pub fn validate(&self) -> Result<()> {
        validate_section_inputs(&self.sections)
    }
}

fn validate_section_inputs(sections: &[SectionTemplateInput]) -> Result<()> {
    if sections.is_empty() {
        return Err(Error::InvalidInput(
            "A template needs at least one section".to_string(),
        ));
    }
    if sections.len() > MAX_SECTION_TEMPLATES {
        return Err(Error::InvalidInput(format!(
            "A template may have at most {} sections",
            MAX_SECTION_TEMPLATES
        )));
    }
    for (i, section) in sections.iter().enumerate() {
        validate_name(&format!("sections[{}].title", i), &section.title)?;
        validate_text(
            &format!("sections[{}].instructions", i),
            section.instructions.as_deref(),
        )?;
    }
    Ok(())
}

// =============================================================================
// BRIEFS
// =============================================================================

/// Lifecycle of a brief's AI expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BriefStatus {
    Draft,
    Expanding,
    Expanded,
    Failed,
}

text_enum!(BriefStatus, "brief status", {
    Draft => "draft",
    Expanding => "expanding",
    Expanded => "expanded",
    Failed => "failed",
});

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Brief {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub client_id: Uuid,
    pub practice_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub title: String,
    pub input: String,
    #[sqlx(try_from = "String")]
    pub status: BriefStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BriefSection {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub brief_id: Uuid,
    pub section_template_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A file attached to a brief, with its cached Gemini handle.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BriefFile {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub brief_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub gemini_file_uri: Option<String>,
    pub gemini_file_name: Option<String>,
    pub gemini_uploaded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BriefDetail {
    #[serde(flatten)]
    pub brief: Brief,
    pub sections: Vec<BriefSection>,
    pub files: Vec<BriefFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBriefRequest {
    pub client_id: Uuid,
    pub practice_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub input: String,
}

impl CreateBriefRequest {
    pub fn validate(&self) -> Result<()> {
        validate_name("title", &self.title)?;
        validate_text("input", Some(&self.input))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBriefRequest {
    pub title: Option<String>,
    pub input: Option<String>,
    pub template_id: Option<Uuid>,
}

impl UpdateBriefRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_name("title", title)?;
        }
        validate_text("input", self.input.as_deref())
    }
}

/// Section content produced by expansion, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBriefSection {
    pub section_template_id: Option<Uuid>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBriefSectionRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl UpdateBriefSectionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.title.is_none() && self.content.is_none() {
            return Err(Error::InvalidInput(
                "Provide a title or content to update".to_string(),
            ));
        }
        if let Some(title) = &self.title {
            validate_name("title", title)?;
        }
        validate_text("content", self.content.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegenerateSectionRequest {
    /// Extra direction from the user for this regeneration only.
    pub instructions: Option<String>,
}

impl RegenerateSectionRequest {
    pub fn validate(&self) -> Result<()> {
        validate_text("instructions", self.instructions.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListBriefsQuery {
    pub client_id: Option<Uuid>,
    pub status: Option<BriefStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListBriefsQuery {
    /// Page size clamped to `1..=PAGE_LIMIT_MAX`.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(PAGE_LIMIT).clamp(1, PAGE_LIMIT_MAX)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

// =============================================================================
// KNOWLEDGE BASE
// =============================================================================

/// An uploaded client document used to ground KB chat.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClientSource {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub client_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub content_hash: String,
    pub gemini_file_uri: Option<String>,
    pub gemini_file_name: Option<String>,
    pub gemini_uploaded_at: Option<DateTime<Utc>>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Metadata for a newly stored upload (client source or brief file).
#[derive(Debug, Clone)]
pub struct NewStoredFile {
    pub id: Uuid,
    pub organisation_id: Uuid,
    /// Client id for sources, brief id for brief files.
    pub parent_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub content_hash: String,
    pub uploaded_by: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

text_enum!(MessageRole, "message role", {
    User => "user",
    Assistant => "assistant",
});

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KbConversation {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KbMessage {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub conversation_id: Uuid,
    #[sqlx(try_from = "String")]
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: KbConversation,
    pub messages: Vec<KbMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

impl CreateConversationRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_name("title", title)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameConversationRequest {
    pub title: String,
}

impl RenameConversationRequest {
    pub fn validate(&self) -> Result<()> {
        validate_name("title", &self.title)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

impl SendMessageRequest {
    pub fn validate(&self) -> Result<()> {
        validate_content("content", &self.content)
    }
}

// =============================================================================
// PROMPTS
// =============================================================================

/// Prompts an organisation can override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKey {
    BriefExpansion,
    SectionRegeneration,
    KbChat,
    KbDigest,
}

text_enum!(PromptKey, "prompt key", {
    BriefExpansion => "brief_expansion",
    SectionRegeneration => "section_regeneration",
    KbChat => "kb_chat",
    KbDigest => "kb_digest",
});

impl PromptKey {
    pub const ALL: [PromptKey; 4] = [
        PromptKey::BriefExpansion,
        PromptKey::SectionRegeneration,
        PromptKey::KbChat,
        PromptKey::KbDigest,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Prompt {
    pub id: Uuid,
    pub organisation_id: Uuid,
    #[sqlx(try_from = "String")]
    pub key: PromptKey,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// Prompt in effect for an organisation: its override, or the built-in default.
#[derive(Debug, Clone, Serialize)]
pub struct EffectivePrompt {
    pub key: PromptKey,
    pub content: String,
    pub is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPromptRequest {
    pub content: String,
}

impl SetPromptRequest {
    pub fn validate(&self) -> Result<()> {
        validate_content("content", &self.content)
    }
}

// =============================================================================
// GEMINI FILES
// =============================================================================

/// Provider-side reference to an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiFileHandle {
    /// Full URI used in `fileData` parts.
    pub uri: String,
    /// Resource name (`files/abc123`) used for status lookups.
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
}

impl GeminiFileHandle {
    fn from_columns(
        uri: &Option<String>,
        name: &Option<String>,
        uploaded_at: &Option<DateTime<Utc>>,
    ) -> Option<Self> {
        match (uri, name, uploaded_at) {
            (Some(uri), Some(name), Some(uploaded_at)) => Some(Self {
                uri: uri.clone(),
                name: name.clone(),
                uploaded_at: *uploaded_at,
            }),
            _ => None,
        }
    }
}

/// Processing state reported by the Files API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteFileState {
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

/// Remote file as returned by the Files API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: RemoteFileState,
}

/// A stored document that may need (re-)uploading before use in a prompt.
#[derive(Debug, Clone)]
pub struct PreparableFile {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub storage_path: String,
    pub handle: Option<GeminiFileHandle>,
}

impl From<&ClientSource> for PreparableFile {
    fn from(source: &ClientSource) -> Self {
        Self {
            id: source.id,
            file_name: source.file_name.clone(),
            mime_type: source.mime_type.clone(),
            storage_path: source.storage_path.clone(),
            handle: GeminiFileHandle::from_columns(
                &source.gemini_file_uri,
                &source.gemini_file_name,
                &source.gemini_uploaded_at,
            ),
        }
    }
}

impl From<&BriefFile> for PreparableFile {
    fn from(file: &BriefFile) -> Self {
        Self {
            id: file.id,
            file_name: file.file_name.clone(),
            mime_type: file.mime_type.clone(),
            storage_path: file.storage_path.clone(),
            handle: GeminiFileHandle::from_columns(
                &file.gemini_file_uri,
                &file.gemini_file_name,
                &file.gemini_uploaded_at,
            ),
        }
    }
}

/// A document ready to be referenced in a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedFile {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub uri: String,
}

// =============================================================================
// GENERATION
// =============================================================================

/// One turn of a conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            text: text.into(),
        }
    }
}

/// Provider-neutral generation request.
///
/// Files are attached to the final user turn.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub turns: Vec<ChatTurn>,
    pub files: Vec<PreparedFile>,
    /// Ask the model for a JSON response body.
    pub json_output: bool,
    pub temperature: Option<f32>,
}
