//! # bastion-inference
//!
//! Generative AI plumbing for Bastion OS.
//!
//! This crate provides:
//! - Gemini client for `generateContent` and the Files API
//! - Cache-or-upload preparation of stored documents, with progress events
//! - Built-in prompts, prompt assembly, and parsing of model replies
//!
//! # Feature Flags
//!
//! - `mock`: expose in-memory doubles of the provider traits for other crates' tests
//!
//! # Example
//!
//! ```rust,no_run
//! use bastion_inference::{prepare_files, FilePrepContext, GeminiClient, PrepareOptions};
//! # use bastion_core::{FileHandleStore, PreparableFile, StorageBackend};
//! # async fn run(storage: &dyn StorageBackend, handles: &dyn FileHandleStore, files: Vec<PreparableFile>) {
//! let gemini = GeminiClient::from_env().unwrap();
//! let ctx = FilePrepContext { storage, remote: &gemini, handles };
//! let ready = prepare_files(&files, ctx, &PrepareOptions::default(), &|event| {
//!     println!("{} {:?}", event.file_name, event.phase);
//! })
//! .await;
//! # }
//! ```

pub mod file_cache;
pub mod gemini;
pub mod prompts;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use bastion_core::*;

pub use file_cache::{is_stale, prepare_files, FilePrepContext, PrepareOptions};
pub use gemini::{GeminiClient, GeminiConfig};
pub use prompts::{
    conversation_title, default_prompt, parse_expansion_response, strip_code_fences,
};
