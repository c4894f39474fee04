//! Cache-or-upload preparation of stored documents for Gemini prompts.
//!
//! Gemini only accepts documents that live in its Files API, and deletes them
//! after 48 hours. Each stored document carries the handle of its last
//! upload; [`prepare_files`] reuses that handle while it is fresh and active,
//! and otherwise re-uploads the original bytes from object storage.
//!
//! Per-item failures never fail the batch: the item is reported as `failed`
//! and dropped, and the caller proceeds with whatever is ready.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{join_all, FutureExt};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use bastion_core::defaults::{
    GEMINI_FILE_TTL_HOURS, GEMINI_PROCESSING_POLLS, GEMINI_PROCESSING_POLL_MS,
};
use bastion_core::{
    Error, FileHandleStore, FilePrepEvent, FilePrepPhase, GeminiFileHandle, PreparableFile,
    PreparedFile, RemoteFile, RemoteFileService, RemoteFileState, Result, StorageBackend,
};

/// Tuning for [`prepare_files`].
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// Upper bound on files prepared at once. `None` runs every file at once.
    pub max_concurrency: Option<usize>,
    /// Age after which a cached handle is assumed expired without asking Gemini.
    pub handle_ttl: chrono::Duration,
    /// Status polls while a fresh upload is still processing.
    pub processing_polls: u32,
    pub poll_interval: Duration,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            handle_ttl: chrono::Duration::hours(GEMINI_FILE_TTL_HOURS),
            processing_polls: GEMINI_PROCESSING_POLLS,
            poll_interval: Duration::from_millis(GEMINI_PROCESSING_POLL_MS),
        }
    }
}

impl PrepareOptions {
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.filter(|n| *n > 0);
        self
    }
}

/// Services the helper needs: where originals live, where uploads go, and
/// where refreshed handles are written back.
#[derive(Clone, Copy)]
pub struct FilePrepContext<'a> {
    pub storage: &'a dyn StorageBackend,
    pub remote: &'a dyn RemoteFileService,
    pub handles: &'a dyn FileHandleStore,
}

/// True when the handle is older than the provider's retention window.
pub fn is_stale(handle: &GeminiFileHandle, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
    now - handle.uploaded_at >= ttl
}

/// Prepare every file, returning the ones that are ready in input order.
///
/// `on_progress` is called for each file as it enters `checking`,
/// `uploading` (only when a fresh upload is needed), and finally `ready` or
/// `failed`.
pub async fn prepare_files(
    files: &[PreparableFile],
    ctx: FilePrepContext<'_>,
    options: &PrepareOptions,
    on_progress: &(dyn Fn(FilePrepEvent) + Send + Sync),
) -> Vec<PreparedFile> {
    if files.is_empty() {
        return Vec::new();
    }
    let start = Instant::now();

    let results: Vec<Option<PreparedFile>> = match options.max_concurrency {
        Some(limit) => {
            let mut indexed: Vec<(usize, Option<PreparedFile>)> =
                stream::iter(files.iter().enumerate())
                    .map(|(i, file)| async move {
                        (i, prepare_one(file, ctx, options, on_progress).await)
                    })
                    .buffer_unordered(limit)
                    .collect::<Vec<_>>()
                    .boxed()
                    .await;
            indexed.sort_by_key(|(i, _)| *i);
            indexed.into_iter().map(|(_, prepared)| prepared).collect()
        }
        None => {
            join_all(
                files
                    .iter()
                    .map(|file| prepare_one(file, ctx, options, on_progress)),
            )
            .boxed()
            .await
        }
    };

    let prepared: Vec<PreparedFile> = results.into_iter().flatten().collect();
    info!(
        subsystem = "inference",
        component = "file_cache",
        op = "prepare",
        total = files.len(),
        ready = prepared.len(),
        max_concurrency = ?options.max_concurrency,
        duration_ms = start.elapsed().as_millis() as u64,
        "Prepared files for generation"
    );
    prepared
}

async fn prepare_one(
    file: &PreparableFile,
    ctx: FilePrepContext<'_>,
    options: &PrepareOptions,
    on_progress: &(dyn Fn(FilePrepEvent) + Send + Sync),
) -> Option<PreparedFile> {
    on_progress(FilePrepEvent::new(
        file.id,
        &file.file_name,
        FilePrepPhase::Checking,
    ));

    if let Some(handle) = &file.handle {
        if let Some(uri) = reusable_uri(file, handle, ctx, options).await {
            on_progress(FilePrepEvent::new(
                file.id,
                &file.file_name,
                FilePrepPhase::Ready,
            ));
            return Some(prepared(file, uri));
        }
    }

    on_progress(FilePrepEvent::new(
        file.id,
        &file.file_name,
        FilePrepPhase::Uploading,
    ));

    match upload_fresh(file, ctx, options).await {
        Ok(remote) => {
            let handle = GeminiFileHandle {
                uri: remote.uri.clone(),
                name: remote.name.clone(),
                uploaded_at: Utc::now(),
            };
            if let Err(e) = ctx.handles.save_handle(file.id, &handle).await {
                warn!(
                    subsystem = "inference",
                    component = "file_cache",
                    file_id = %file.id,
                    error = %e,
                    "Failed to persist Gemini handle"
                );
            }
            on_progress(FilePrepEvent::new(
                file.id,
                &file.file_name,
                FilePrepPhase::Ready,
            ));
            Some(prepared(file, remote.uri))
        }
        Err(e) => {
            warn!(
                subsystem = "inference",
                component = "file_cache",
                file_id = %file.id,
                file_name = %file.file_name,
                error = %e,
                "File preparation failed"
            );
            on_progress(FilePrepEvent::failed(file.id, &file.file_name, e.to_string()));
            None
        }
    }
}

/// The cached URI, if the handle is fresh and Gemini reports it active.
async fn reusable_uri(
    file: &PreparableFile,
    handle: &GeminiFileHandle,
    ctx: FilePrepContext<'_>,
    options: &PrepareOptions,
) -> Option<String> {
    if is_stale(handle, options.handle_ttl, Utc::now()) {
        debug!(file_id = %file.id, uploaded_at = %handle.uploaded_at, "Cached handle expired");
        return None;
    }
    match ctx.remote.get_file(&handle.name).await {
        Ok(remote) if remote.state == RemoteFileState::Active => Some(handle.uri.clone()),
        Ok(remote) => {
            debug!(file_id = %file.id, state = ?remote.state, "Cached handle not active");
            None
        }
        Err(e) => {
            debug!(file_id = %file.id, error = %e, "Cached handle lookup failed");
            None
        }
    }
}

async fn upload_fresh(
    file: &PreparableFile,
    ctx: FilePrepContext<'_>,
    options: &PrepareOptions,
) -> Result<RemoteFile> {
    let data = ctx.storage.read(&file.storage_path).await?;
    let mut remote = ctx
        .remote
        .upload_file(&file.file_name, &file.mime_type, data)
        .await?;

    let mut polls = 0;
    while remote.state == RemoteFileState::Processing {
        if polls >= options.processing_polls {
            return Err(Error::Inference(format!(
                "Gemini is still processing '{}'",
                file.file_name
            )));
        }
        tokio::time::sleep(options.poll_interval).await;
        remote = ctx.remote.get_file(&remote.name).await?;
        polls += 1;
    }

    if remote.state == RemoteFileState::Failed {
        return Err(Error::Inference(format!(
            "Gemini could not process '{}'",
            file.file_name
        )));
    }
    Ok(remote)
}

fn prepared(file: &PreparableFile, uri: String) -> PreparedFile {
    PreparedFile {
        id: file.id,
        file_name: file.file_name.clone(),
        mime_type: file.mime_type.clone(),
        uri,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockRemoteFiles, MockStorage, RecordingHandleStore};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn handle(hours_old: i64) -> GeminiFileHandle {
        GeminiFileHandle {
            uri: "https://g/files/a".to_string(),
            name: "files/a".to_string(),
            uploaded_at: Utc::now() - chrono::Duration::hours(hours_old),
        }
    }

    fn file(name: &str, handle: Option<GeminiFileHandle>) -> PreparableFile {
        PreparableFile {
            id: Uuid::new_v4(),
            file_name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            storage_path: format!("sources/org/client/{}", name),
            handle,
        }
    }

    fn fast() -> PrepareOptions {
        PrepareOptions {
            poll_interval: Duration::from_millis(1),
            ..PrepareOptions::default()
        }
    }

    struct Recorder(Mutex<Vec<FilePrepEvent>>);

    impl Recorder {
        fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }

        fn record(&self, event: FilePrepEvent) {
            self.0.lock().unwrap().push(event);
        }

        fn phases_for(&self, id: Uuid) -> Vec<FilePrepPhase> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.file_id == id)
                .map(|e| e.phase)
                .collect()
        }
    }

    async fn run(
        files: &[PreparableFile],
        storage: &MockStorage,
        remote: &MockRemoteFiles,
        handles: &RecordingHandleStore,
        options: &PrepareOptions,
        recorder: &Recorder,
    ) -> Vec<PreparedFile> {
        let ctx = FilePrepContext {
            storage,
            remote,
            handles,
        };
        prepare_files(files, ctx, options, &|event| recorder.record(event)).await
    }

    #[tokio::test]
    async fn test_empty_input() {
        let recorder = Recorder::new();
        let ready = run(
            &[],
            &MockStorage::new(),
            &MockRemoteFiles::new(),
            &RecordingHandleStore::new(),
            &fast(),
            &recorder,
        )
        .await;
        assert!(ready.is_empty());
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reuses_fresh_active_handle() {
        let f = file("deck.pdf", Some(handle(2)));
        let remote = MockRemoteFiles::new().with_file(
            "files/a",
            "https://g/files/a",
            RemoteFileState::Active,
        );
        let handles = RecordingHandleStore::new();
        let recorder = Recorder::new();

        let ready = run(
            std::slice::from_ref(&f),
            &MockStorage::new(),
            &remote,
            &handles,
            &fast(),
            &recorder,
        )
        .await;

        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].uri, "https://g/files/a");
        assert!(remote.uploads().is_empty());
        assert!(handles.saved().is_empty());
        assert_eq!(
            recorder.phases_for(f.id),
            vec![FilePrepPhase::Checking, FilePrepPhase::Ready]
        );
    }

    #[tokio::test]
    async fn test_stale_handle_reuploads_without_status_lookup() {
        let f = file("deck.pdf", Some(handle(72)));
        let storage = MockStorage::new().with_object(&f.storage_path, b"%PDF-1.7");
        let remote = MockRemoteFiles::new();
        let handles = RecordingHandleStore::new();
        let recorder = Recorder::new();

        let ready = run(
            std::slice::from_ref(&f),
            &storage,
            &remote,
            &handles,
            &fast(),
            &recorder,
        )
        .await;

        assert_eq!(ready.len(), 1);
        assert_ne!(ready[0].uri, "https://g/files/a");
        assert!(remote.lookups().is_empty());
        assert_eq!(remote.uploads(), vec!["deck.pdf".to_string()]);

        let saved = handles.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, f.id);
        assert_eq!(saved[0].1.uri, ready[0].uri);
        assert_eq!(
            recorder.phases_for(f.id),
            vec![
                FilePrepPhase::Checking,
                FilePrepPhase::Uploading,
                FilePrepPhase::Ready
            ]
        );
    }

    #[tokio::test]
    async fn test_inactive_handle_reuploads() {
        let f = file("deck.pdf", Some(handle(1)));
        let storage = MockStorage::new().with_object(&f.storage_path, b"%PDF");
        let remote = MockRemoteFiles::new().with_file(
            "files/a",
            "https://g/files/a",
            RemoteFileState::Failed,
        );
        let recorder = Recorder::new();

        let ready = run(
            std::slice::from_ref(&f),
            &storage,
            &remote,
            &RecordingHandleStore::new(),
            &fast(),
            &recorder,
        )
        .await;

        assert_eq!(ready.len(), 1);
        assert_eq!(remote.lookups(), vec!["files/a".to_string()]);
        assert_eq!(remote.uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_remote_handle_reuploads() {
        let f = file("deck.pdf", Some(handle(1)));
        let storage = MockStorage::new().with_object(&f.storage_path, b"%PDF");
        let remote = MockRemoteFiles::new();
        let recorder = Recorder::new();

        let ready = run(
            std::slice::from_ref(&f),
            &storage,
            &remote,
            &RecordingHandleStore::new(),
            &fast(),
            &recorder,
        )
        .await;
        assert_eq!(ready.len(), 1);
        assert_eq!(remote.uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_dropped_and_order_kept() {
        let a = file("a.pdf", None);
        let missing = file("missing.pdf", None);
        let rejected = file("rejected.pdf", None);
        let c = file("c.pdf", None);
        let storage = MockStorage::new()
            .with_object(&a.storage_path, b"a")
            .with_object(&rejected.storage_path, b"r")
            .with_object(&c.storage_path, b"c");
        let remote = MockRemoteFiles::new().failing_upload("rejected.pdf");
        let recorder = Recorder::new();
        let files = vec![a.clone(), missing.clone(), rejected.clone(), c.clone()];

        let ready = run(
            &files,
            &storage,
            &remote,
            &RecordingHandleStore::new(),
            &fast(),
            &recorder,
        )
        .await;

        let names: Vec<&str> = ready.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "c.pdf"]);
        assert_eq!(
            recorder.phases_for(missing.id),
            vec![
                FilePrepPhase::Checking,
                FilePrepPhase::Uploading,
                FilePrepPhase::Failed
            ]
        );
        let events = recorder.0.lock().unwrap();
        let failure = events
            .iter()
            .find(|e| e.file_id == rejected.id && e.phase == FilePrepPhase::Failed)
            .unwrap();
        assert!(failure.error.as_deref().unwrap().contains("Unsupported file"));
    }

    #[tokio::test]
    async fn test_handle_save_failure_still_ready() {
        let f = file("deck.pdf", None);
        let storage = MockStorage::new().with_object(&f.storage_path, b"%PDF");
        let recorder = Recorder::new();

        let ready = run(
            std::slice::from_ref(&f),
            &storage,
            &MockRemoteFiles::new(),
            &RecordingHandleStore::failing(),
            &fast(),
            &recorder,
        )
        .await;

        assert_eq!(ready.len(), 1);
        assert_eq!(
            recorder.phases_for(f.id).last(),
            Some(&FilePrepPhase::Ready)
        );
    }

    #[tokio::test]
    async fn test_waits_for_processing_upload() {
        let f = file("video.mp4", None);
        let storage = MockStorage::new().with_object(&f.storage_path, b"....");
        let remote = MockRemoteFiles::new().processing_for(2);
        let recorder = Recorder::new();

        let ready = run(
            std::slice::from_ref(&f),
            &storage,
            &remote,
            &RecordingHandleStore::new(),
            &fast(),
            &recorder,
        )
        .await;

        assert_eq!(ready.len(), 1);
        assert_eq!(remote.lookups().len(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_when_processing_never_finishes() {
        let f = file("video.mp4", None);
        let storage = MockStorage::new().with_object(&f.storage_path, b"....");
        let remote = MockRemoteFiles::new().processing_for(100);
        let recorder = Recorder::new();
        let options = PrepareOptions {
            processing_polls: 3,
            ..fast()
        };

        let ready = run(
            std::slice::from_ref(&f),
            &storage,
            &remote,
            &RecordingHandleStore::new(),
            &options,
            &recorder,
        )
        .await;

        assert!(ready.is_empty());
        assert_eq!(remote.lookups().len(), 3);
        assert_eq!(
            recorder.phases_for(f.id).last(),
            Some(&FilePrepPhase::Failed)
        );
    }

    #[tokio::test]
    async fn test_bounded_concurrency_preserves_order() {
        let files: Vec<PreparableFile> = (0..6)
            .map(|i| file(&format!("doc-{}.pdf", i), None))
            .collect();
        let storage = files.iter().fold(MockStorage::new(), |s, f| {
            s.with_object(&f.storage_path, b"x")
        });
        let recorder = Recorder::new();
        let options = fast().with_max_concurrency(Some(2));

        let ready = run(
            &files,
            &storage,
            &MockRemoteFiles::new(),
            &RecordingHandleStore::new(),
            &options,
            &recorder,
        )
        .await;

        let ids: Vec<Uuid> = ready.iter().map(|f| f.id).collect();
        let expected: Vec<Uuid> = files.iter().map(|f| f.id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_is_stale_at_window_boundary() {
        let ttl = chrono::Duration::hours(48);
        let now = Utc::now();
        assert!(!is_stale(&handle(1), ttl, now));
        assert!(is_stale(&handle(49), ttl, now));
    }

    #[test]
    fn test_zero_concurrency_means_unbounded() {
        let options = PrepareOptions::default().with_max_concurrency(Some(0));
        assert!(options.max_concurrency.is_none());
        let options = PrepareOptions::default().with_max_concurrency(Some(4));
        assert_eq!(options.max_concurrency, Some(4));
    }
}
