//! Admin console endpoints under `/api/admin`.

pub mod clients;
pub mod organisations;
pub mod practices;
pub mod prompts;
pub mod templates;
pub mod users;
