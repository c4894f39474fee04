//! Multipart upload intake shared by KB sources and brief files.

use axum::body::Bytes;
use axum::extract::Multipart;

use bastion_core::{check_upload, detect_content_type, sanitize_filename};

use crate::error::ApiError;

/// Name of the multipart field carrying the file.
pub(crate) const FILE_FIELD: &str = "file";

/// A screened upload with its detected content type.
#[derive(Debug)]
pub(crate) struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Read the `file` field, screen it, and detect its content type.
///
/// Other fields are skipped. A body without a `file` field is a 400.
pub(crate) async fn read_upload(
    mut multipart: Multipart,
    max_bytes: u64,
) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let raw_name = field.file_name().unwrap_or("upload").to_string();
        let claimed = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;

        check_upload(&raw_name, &data, max_bytes)?;
        let file_name = sanitize_filename(&raw_name);
        let content_type = detect_content_type(&file_name, &data, claimed.as_deref());
        return Ok(UploadedFile {
            file_name,
            content_type,
            data,
        });
    }

    Err(ApiError::BadRequest(format!(
        "Missing '{}' field in multipart body",
        FILE_FIELD
    )))
}
