//! Upload screening for KB sources and brief files.
//!
//! Uploads are rejected when they exceed the size limit, carry an executable
//! extension, or start with executable magic bytes. Accepted uploads get a
//! content type derived from their bytes rather than the browser's claim.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::error::{Error, Result};

/// Magic byte prefixes of executable formats.
const EXECUTABLE_MAGIC: &[(&str, &[u8])] = &[
    ("Windows PE", &[0x4D, 0x5A]),
    ("ELF", &[0x7F, 0x45, 0x4C, 0x46]),
    ("Mach-O 32", &[0xFE, 0xED, 0xFA, 0xCE]),
    ("Mach-O 64", &[0xFE, 0xED, 0xFA, 0xCF]),
    ("Mach-O universal or Java class", &[0xCA, 0xFE, 0xBA, 0xBE]),
    ("WebAssembly", &[0x00, 0x61, 0x73, 0x6D]),
];

static BLOCKED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "exe", "dll", "scr", "pif", "com", "msi", "bat", "cmd", "ps1", "vbs", "so", "dylib",
        "jar", "class", "apk", "app", "dmg", "pkg", "deb", "rpm", "docm", "xlsm", "pptm", "lnk",
        "hta", "reg",
    ]
    .into_iter()
    .collect()
});

/// Screen an upload. Returns `Error::InvalidInput` naming the reason on rejection.
pub fn check_upload(file_name: &str, data: &[u8], max_bytes: u64) -> Result<()> {
    if data.is_empty() {
        return Err(Error::InvalidInput("Uploaded file is empty".to_string()));
    }
    if data.len() as u64 > max_bytes {
        return Err(Error::InvalidInput(format!(
            "File exceeds maximum size of {} bytes",
            max_bytes
        )));
    }

    if let Some((_, ext)) = file_name.rsplit_once('.') {
        if BLOCKED_EXTENSIONS.contains(ext.to_lowercase().as_str()) {
            return Err(Error::InvalidInput(format!(
                "File extension .{} is not allowed",
                ext
            )));
        }
    }

    for (label, magic) in EXECUTABLE_MAGIC {
        if data.starts_with(magic) {
            return Err(Error::InvalidInput(format!(
                "Executable content detected ({})",
                label
            )));
        }
    }

    Ok(())
}

/// Determine the content type of an upload.
///
/// Magic bytes win; text formats without signatures fall back to the
/// extension; a binary claim that the bytes do not back up is downgraded to
/// `application/octet-stream`.
pub fn detect_content_type(file_name: &str, data: &[u8], claimed: Option<&str>) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    if let Some((_, ext)) = file_name.rsplit_once('.') {
        if let Some(mime) = text_mime_for_extension(ext) {
            return mime.to_string();
        }
    }

    match claimed {
        Some(claimed) if is_valid_mime_type(claimed) && !claims_binary(claimed) => {
            claimed.to_string()
        }
        _ => "application/octet-stream".to_string(),
    }
}

fn claims_binary(claimed: &str) -> bool {
    claimed.starts_with("image/")
        || claimed.starts_with("audio/")
        || claimed.starts_with("video/")
        || matches!(
            claimed,
            "application/pdf" | "application/zip" | "application/gzip" | "application/octet-stream"
        )
}

/// Text formats that have no magic bytes.
fn text_mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "txt" | "log" => Some("text/plain"),
        "md" | "markdown" => Some("text/markdown"),
        "csv" => Some("text/csv"),
        "tsv" => Some("text/tab-separated-values"),
        "html" | "htm" => Some("text/html"),
        "xml" => Some("text/xml"),
        "json" => Some("application/json"),
        "rtf" => Some("text/rtf"),
        _ => None,
    }
}

/// Validate MIME type format (`type/subtype`, token characters only).
pub fn is_valid_mime_type(mime: &str) -> bool {
    let Some((media_type, subtype)) = mime.split_once('/') else {
        return false;
    };
    let is_token = |s: &str| {
        !s.is_empty()
            && s.chars().all(|c| {
                c.is_ascii_alphanumeric()
                    || matches!(c, '!' | '#' | '$' | '&' | '-' | '^' | '_' | '.' | '+')
            })
    };
    is_token(media_type) && is_token(subtype)
}

/// Strip path components and unsafe characters from a client-supplied name.
pub fn sanitize_filename(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);

    let cleaned: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');

    if cleaned.is_empty() {
        return "unnamed_file".to_string();
    }

    if cleaned.chars().count() > 200 {
        let (stem, ext) = match cleaned.rsplit_once('.') {
            Some((stem, ext)) if ext.chars().count() <= 10 => (stem, Some(ext)),
            _ => (cleaned, None),
        };
        let keep = 200 - ext.map(|e| e.chars().count() + 1).unwrap_or(0);
        let stem: String = stem.chars().take(keep).collect();
        return match ext {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem,
        };
    }

    cleaned.to_string()
}

/// Storage-safe key segment: ASCII alphanumerics, dots, hyphens, underscores.
pub fn storage_key_segment(file_name: &str) -> String {
    sanitize_filename(file_name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 0 obj";
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn test_detect_pdf_magic_bytes() {
        assert_eq!(
            detect_content_type("deck.pdf", PDF, Some("application/pdf")),
            "application/pdf"
        );
    }

    #[test]
    fn test_detect_overrides_wrong_claim() {
        assert_eq!(
            detect_content_type("photo.pdf", PNG, Some("application/pdf")),
            "image/png"
        );
    }

    #[test]
    fn test_detect_text_by_extension() {
        assert_eq!(
            detect_content_type("notes.md", b"# Brand voice", None),
            "text/markdown"
        );
        assert_eq!(
            detect_content_type("data.csv", b"a,b\n1,2", Some("application/vnd.ms-excel")),
            "text/csv"
        );
    }

    #[test]
    fn test_detect_downgrades_unbacked_binary_claim() {
        assert_eq!(
            detect_content_type("fake.pdf", b"not really a pdf", Some("application/pdf")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_detect_trusts_text_claim() {
        assert_eq!(
            detect_content_type("brief", b"plain words", Some("text/plain")),
            "text/plain"
        );
    }

    #[test]
    fn test_check_blocks_executable_extension() {
        let err = check_upload("setup.exe", b"hello", 1024).unwrap_err();
        assert!(err.to_string().contains(".exe"));
    }

    #[test]
    fn test_check_blocks_elf_magic() {
        let data = [0x7F, 0x45, 0x4C, 0x46, 0x02, 0x01];
        let err = check_upload("report.pdf", &data, 1024).unwrap_err();
        assert!(err.to_string().contains("ELF"));
    }

    #[test]
    fn test_check_rejects_oversized_and_empty() {
        assert!(check_upload("big.txt", &[b'a'; 11], 10).is_err());
        assert!(check_upload("empty.txt", &[], 10).is_err());
    }

    #[test]
    fn test_check_allows_documents() {
        assert!(check_upload("deck.pdf", PDF, 1024).is_ok());
        assert!(check_upload("logo.png", PNG, 1024).is_ok());
    }

    #[test]
    fn test_mime_type_format() {
        assert!(is_valid_mime_type("application/vnd.openxmlformats-officedocument.wordprocessingml.document"));
        assert!(!is_valid_mime_type("application"));
        assert!(!is_valid_mime_type("text/ plain"));
        assert!(!is_valid_mime_type("/plain"));
    }

    #[test]
    fn test_sanitize_removes_path_and_dangerous_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\brief?.docx"), "brief_.docx");
        assert_eq!(sanitize_filename("   "), "unnamed_file");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
    }

    #[test]
    fn test_sanitize_truncates_preserving_extension() {
        let long = format!("{}.pdf", "a".repeat(300));
        let out = sanitize_filename(&long);
        assert_eq!(out.chars().count(), 200);
        assert!(out.ends_with(".pdf"));
    }

    #[test]
    fn test_storage_key_segment_is_ascii() {
        assert_eq!(storage_key_segment("Brand Guide (v2).pdf"), "Brand_Guide__v2_.pdf");
        assert_eq!(storage_key_segment("café.md"), "caf_.md");
    }
}
