//! # bastion-core
//!
//! Core types, traits, and abstractions for the Bastion OS backend.
//!
//! This crate provides the domain models, error type, role allow-lists, and
//! the trait seams (identity, object storage, generation, provider files)
//! that the database, inference, and API crates depend on.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue; a background task or best-effort write failed |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration |

pub mod defaults;
pub mod error;
pub mod events;
pub mod file_safety;
pub mod models;
pub mod roles;
pub mod traits;
pub mod validation;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{FilePrepEvent, FilePrepPhase, FilePrepSummary};
pub use file_safety::{
    check_upload, detect_content_type, is_valid_mime_type, sanitize_filename,
    storage_key_segment,
};
pub use models::*;
pub use roles::{Principal, Role};
pub use traits::*;
