//! Google Gemini backend.
//!
//! Covers `generateContent` for chat, digests, and brief expansion, plus the
//! Files API used to attach client documents to prompts.
//!
//! # Example
//!
//! ```rust,no_run
//! use bastion_inference::gemini::GeminiClient;
//! use bastion_core::{ChatTurn, GenerationBackend, GenerationRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = GeminiClient::from_env().unwrap();
//!     let text = client
//!         .generate(GenerationRequest {
//!             turns: vec![ChatTurn::user("Say hello")],
//!             ..Default::default()
//!         })
//!         .await
//!         .unwrap();
//!     println!("{text}");
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{
    build_generate_request, GeminiClient, GeminiConfig, DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL,
    DEFAULT_TIMEOUT_SECS,
};
pub use error::to_bastion_error;
pub use types::*;
