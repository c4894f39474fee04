//! HTTP request handlers.

pub mod admin;
pub(crate) mod body;
pub mod briefs;
pub mod health;
pub mod kb;
pub mod me;
pub(crate) mod upload;
