//! In-memory test doubles for the provider traits.
//!
//! Enabled for this crate's tests and, through the `mock` feature, for other
//! crates' tests.
//!
//! ```rust,ignore
//! use bastion_inference::mock::{MockGeneration, MockRemoteFiles, MockStorage};
//!
//! let storage = MockStorage::new().with_object("sources/a.pdf", b"%PDF");
//! let remote = MockRemoteFiles::new();
//! let generation = MockGeneration::new().with_response("{\"sections\": []}");
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use bastion_core::{
    Error, FileHandleStore, GeminiFileHandle, GenerationBackend, GenerationRequest, RemoteFile,
    RemoteFileService, RemoteFileState, Result, StorageBackend,
};

// =============================================================================
// STORAGE
// =============================================================================

/// Object storage held in a map.
#[derive(Clone, Default)]
pub struct MockStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, path: &str, data: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }
}

#[async_trait]
impl StorageBackend for MockStorage {
    async fn write(&self, path: &str, data: &[u8], _content_type: &str) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Object {}", path)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    async fn signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String> {
        Ok(format!("https://storage.test/{}?expires={}", path, expires_in_secs))
    }
}

// =============================================================================
// REMOTE FILES
// =============================================================================

#[derive(Default)]
struct RemoteState {
    /// Known files by resource name.
    files: HashMap<String, RemoteFile>,
    /// Display names whose upload fails.
    failing_uploads: HashSet<String>,
    /// Uploads that report PROCESSING for this many status lookups.
    processing_lookups: u32,
    pending_lookups: HashMap<String, u32>,
    uploads: Vec<String>,
    lookups: Vec<String>,
}

/// Gemini Files API stand-in.
#[derive(Clone, Default)]
pub struct MockRemoteFiles {
    state: Arc<Mutex<RemoteState>>,
}

impl MockRemoteFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing remote file in the given state.
    pub fn with_file(self, name: &str, uri: &str, state: RemoteFileState) -> Self {
        self.state.lock().unwrap().files.insert(
            name.to_string(),
            RemoteFile {
                name: name.to_string(),
                uri: uri.to_string(),
                mime_type: "application/octet-stream".to_string(),
                state,
            },
        );
        self
    }

    /// Make uploads of `display_name` fail with a provider error.
    pub fn failing_upload(self, display_name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_uploads
            .insert(display_name.to_string());
        self
    }

    /// New uploads stay PROCESSING for `lookups` status checks.
    pub fn processing_for(self, lookups: u32) -> Self {
        self.state.lock().unwrap().processing_lookups = lookups;
        self
    }

    /// Display names uploaded so far.
    pub fn uploads(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.clone()
    }

    /// Resource names looked up so far.
    pub fn lookups(&self) -> Vec<String> {
        self.state.lock().unwrap().lookups.clone()
    }
}

#[async_trait]
impl RemoteFileService for MockRemoteFiles {
    async fn get_file(&self, name: &str) -> Result<RemoteFile> {
        let mut state = self.state.lock().unwrap();
        state.lookups.push(name.to_string());

        let still_processing = match state.pending_lookups.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                *remaining > 0
            }
            _ => false,
        };

        let file = state
            .files
            .get_mut(name)
            .ok_or_else(|| Error::provider("Gemini", 404, format!("File {} not found", name)))?;
        if file.state == RemoteFileState::Processing && !still_processing {
            file.state = RemoteFileState::Active;
        }
        Ok(file.clone())
    }

    async fn upload_file(
        &self,
        display_name: &str,
        mime_type: &str,
        _data: Vec<u8>,
    ) -> Result<RemoteFile> {
        let mut state = self.state.lock().unwrap();
        state.uploads.push(display_name.to_string());
        if state.failing_uploads.contains(display_name) {
            return Err(Error::provider(
                "Gemini",
                400,
                format!("Unsupported file {}", display_name),
            ));
        }

        let id = Uuid::new_v4().simple().to_string();
        let name = format!("files/{}", id);
        let processing = state.processing_lookups;
        let file = RemoteFile {
            name: name.clone(),
            uri: format!("https://gemini.test/v1beta/files/{}", id),
            mime_type: mime_type.to_string(),
            state: if processing > 0 {
                RemoteFileState::Processing
            } else {
                RemoteFileState::Active
            },
        };
        if processing > 0 {
            state.pending_lookups.insert(name.clone(), processing);
        }
        state.files.insert(name, file.clone());
        Ok(file)
    }
}

// =============================================================================
// HANDLE STORE
// =============================================================================

/// Records saved handles; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingHandleStore {
    saved: Arc<Mutex<Vec<(Uuid, GeminiFileHandle)>>>,
    fail: bool,
}

impl RecordingHandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<(Uuid, GeminiFileHandle)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileHandleStore for RecordingHandleStore {
    async fn save_handle(&self, file_id: Uuid, handle: &GeminiFileHandle) -> Result<()> {
        if self.fail {
            return Err(Error::Internal("handle store unavailable".to_string()));
        }
        self.saved.lock().unwrap().push((file_id, handle.clone()));
        Ok(())
    }
}

// =============================================================================
// GENERATION
// =============================================================================

/// Generation backend returning a canned response and recording requests.
#[derive(Clone)]
pub struct MockGeneration {
    response: Arc<Mutex<Result<String>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl Default for MockGeneration {
    fn default() -> Self {
        Self {
            response: Arc::new(Mutex::new(Ok("Mock response".to_string()))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, text: impl Into<String>) -> Self {
        *self.response.lock().unwrap() = Ok(text.into());
        self
    }

    /// Fail every call with a provider error of the given status.
    pub fn with_provider_error(self, status: u16, message: &str) -> Self {
        *self.response.lock().unwrap() = Err(Error::provider("Gemini", status, message));
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for MockGeneration {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        match &*self.response.lock().unwrap() {
            Ok(text) => Ok(text.clone()),
            Err(Error::Provider {
                service,
                status,
                message,
            }) => Err(Error::provider(service.clone(), *status, message.clone())),
            Err(other) => Err(Error::Inference(other.to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
