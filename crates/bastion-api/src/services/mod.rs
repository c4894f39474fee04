//! Workflows that span repositories and providers.

pub mod brief_expansion;
pub mod cleanup;
pub mod digest;
pub mod file_prep;
pub mod kb_chat;
