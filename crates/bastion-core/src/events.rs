//! File-preparation progress events.
//!
//! Emitted by the Gemini cache-or-upload helper once per item per phase and
//! relayed to the SPA over Server-Sent Events.

use serde::Serialize;
use uuid::Uuid;

use crate::models::PreparedFile;

/// Phase of a single file's preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePrepPhase {
    /// Looking at the cached handle.
    Checking,
    /// Downloading from storage and uploading to the provider.
    Uploading,
    /// Usable in a prompt.
    Ready,
    /// Dropped from the prepared set.
    Failed,
}

/// Progress of one file through preparation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePrepEvent {
    pub file_id: Uuid,
    pub file_name: String,
    pub phase: FilePrepPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FilePrepEvent {
    pub fn new(file_id: Uuid, file_name: impl Into<String>, phase: FilePrepPhase) -> Self {
        Self {
            file_id,
            file_name: file_name.into(),
            phase,
            error: None,
        }
    }

    pub fn failed(file_id: Uuid, file_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_id,
            file_name: file_name.into(),
            phase: FilePrepPhase::Failed,
            error: Some(error.into()),
        }
    }
}

/// Final summary sent once every file has settled.
#[derive(Debug, Clone, Serialize)]
pub struct FilePrepSummary {
    pub ready: usize,
    pub total: usize,
    pub files: Vec<PreparedFile>,
}

impl FilePrepSummary {
    pub fn new(files: Vec<PreparedFile>, total: usize) -> Self {
        Self {
            ready: files.len(),
            total,
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_omits_missing_error() {
        let event = FilePrepEvent::new(Uuid::nil(), "deck.pdf", FilePrepPhase::Uploading);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "uploading");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_event_carries_error() {
        let event = FilePrepEvent::failed(Uuid::nil(), "deck.pdf", "storage unavailable");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "failed");
        assert_eq!(json["error"], "storage unavailable");
    }

    #[test]
    fn test_summary_counts_ready_files() {
        let files = vec![PreparedFile {
            id: Uuid::nil(),
            file_name: "a.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            uri: "https://g/files/a".to_string(),
        }];
        let summary = FilePrepSummary::new(files, 3);
        assert_eq!(summary.ready, 1);
        assert_eq!(summary.total, 3);
    }
}
