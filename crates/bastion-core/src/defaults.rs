//! Centralized default constants for Bastion OS.
//!
//! Shared limits and defaults live here so that the API, database, and
//! inference crates agree on the same values.

// =============================================================================
// VALIDATION LIMITS
// =============================================================================

/// Maximum characters in a display name (organisation, client, practice, template).
pub const MAX_NAME_LEN: usize = 200;

/// Maximum characters in free-text fields (descriptions, brief input, section content).
pub const MAX_TEXT_LEN: usize = 50_000;

/// Maximum characters in prompt overrides and chat messages.
pub const MAX_PROMPT_LEN: usize = 20_000;

/// Maximum number of sections in a practice template.
pub const MAX_SECTION_TEMPLATES: usize = 50;

// =============================================================================
// FILES
// =============================================================================

/// Default upload size limit (25 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Lifetime of signed download URLs handed to the SPA.
pub const SIGNED_URL_TTL_SECS: u64 = 300;

/// Gemini deletes uploaded files after 48 hours.
pub const GEMINI_FILE_TTL_HOURS: i64 = 48;

/// Status polls after upload while Gemini is still processing a file.
pub const GEMINI_PROCESSING_POLLS: u32 = 10;

/// Delay between processing polls, in milliseconds.
pub const GEMINI_PROCESSING_POLL_MS: u64 = 1000;

// =============================================================================
// KNOWLEDGE BASE
// =============================================================================

/// Title given to conversations before the first message arrives.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";

/// Maximum characters of the first message used as an automatic title.
pub const CONVERSATION_TITLE_LEN: usize = 60;

/// Number of prior messages sent to the model as chat history.
pub const KB_HISTORY_LIMIT: i64 = 40;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for list endpoints.
pub const PAGE_LIMIT: i64 = 50;

/// Upper bound on client-requested page sizes.
pub const PAGE_LIMIT_MAX: i64 = 200;
