//! Wiring between stored files and the cache-or-upload helper.

use tracing::{debug, info, warn};
use uuid::Uuid;

use bastion_core::{BriefFile, ClientSource, FilePrepEvent, FilePrepPhase, PreparableFile, PreparedFile};
use bastion_inference::{prepare_files, FilePrepContext};

use crate::AppState;

/// Progress sink for callers that only want the result.
pub fn ignore_progress(_event: FilePrepEvent) {}

/// Make a client's sources ready for a prompt.
pub async fn prepare_sources(
    state: &AppState,
    sources: &[ClientSource],
    on_progress: &(dyn Fn(FilePrepEvent) + Send + Sync),
) -> Vec<PreparedFile> {
    let files: Vec<PreparableFile> = sources.iter().map(PreparableFile::from).collect();
    let ctx = FilePrepContext {
        storage: state.storage.as_ref(),
        remote: state.remote_files.as_ref(),
        handles: &state.db.sources,
    };
    prepare_files(&files, ctx, &state.settings.file_prep, on_progress).await
}

/// Make a brief's attachments ready for a prompt.
pub async fn prepare_brief_files(
    state: &AppState,
    files: &[BriefFile],
    on_progress: &(dyn Fn(FilePrepEvent) + Send + Sync),
) -> Vec<PreparedFile> {
    let files: Vec<PreparableFile> = files.iter().map(PreparableFile::from).collect();
    let ctx = FilePrepContext {
        storage: state.storage.as_ref(),
        remote: state.remote_files.as_ref(),
        handles: &state.db.briefs,
    };
    prepare_files(&files, ctx, &state.settings.file_prep, on_progress).await
}

fn log_failure(event: FilePrepEvent) {
    if event.phase == FilePrepPhase::Failed {
        warn!(
            subsystem = "api",
            component = "file_prep",
            file_id = %event.file_id,
            file_name = %event.file_name,
            error = event.error.as_deref().unwrap_or("unknown"),
            "Background preparation failed for file"
        );
    }
}

/// Upload a client's sources to Gemini ahead of use so the next chat does
/// not wait on them. Failures are logged.
pub async fn warm_up_sources(state: &AppState, organisation_id: Uuid, client_id: Uuid) {
    let sources = match state.db.sources.list_for_client(organisation_id, client_id).await {
        Ok(sources) => sources,
        Err(e) => {
            warn!(
                subsystem = "api",
                component = "file_prep",
                op = "warmup",
                client_id = %client_id,
                error = %e,
                "Could not list sources for warm-up"
            );
            return;
        }
    };
    if sources.is_empty() {
        debug!(client_id = %client_id, "No sources to warm up");
        return;
    }

    let ready = prepare_sources(state, &sources, &log_failure).await;
    info!(
        subsystem = "api",
        component = "file_prep",
        op = "warmup",
        client_id = %client_id,
        ready = ready.len(),
        total = sources.len(),
        "Source warm-up finished"
    );
}
