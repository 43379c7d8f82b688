//! Upload validation and the stored-image contract.

use crate::layers::ImageFormat;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const GENERIC_MIME: &str = "application/octet-stream";

/// Reasons an upload is rejected before it leaves the client.
#[derive(Debug, Error, PartialEq)]
pub enum UploadError {
    #[error("File is empty")]
    Empty,
    #[error("File is too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("File content does not match declared type {declared}")]
    ContentMismatch { declared: String },
    #[error("Invalid upload encoding: {0}")]
    InvalidEncoding(String),
}

/// A file picked for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// The MIME type to validate against.
    ///
    /// Pickers that report no type, or only `application/octet-stream`, fall
    /// back to the file extension.
    pub fn declared_mime(&self) -> &str {
        let declared = self.mime_type.trim();
        if !declared.is_empty() && !declared.eq_ignore_ascii_case(GENERIC_MIME) {
            return declared;
        }
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
            .map_or(declared, |format| format.mime_type())
    }

    /// Check size, declared type and actual content.
    pub fn validate(&self, max_bytes: u64) -> Result<ImageFormat, UploadError> {
        validate_upload(self.declared_mime(), &self.data, max_bytes)
    }

    /// JSON transport form with base64 content.
    pub fn to_request(&self) -> UploadRequest {
        UploadRequest {
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            data: STANDARD.encode(&self.data),
        }
    }
}

/// Accept JPEG, PNG or WebP up to `max_bytes`.
///
/// The declared MIME type must be supported and the magic bytes must agree
/// with it.
pub fn validate_upload(mime_type: &str, data: &[u8], max_bytes: u64) -> Result<ImageFormat, UploadError> {
    if data.is_empty() {
        return Err(UploadError::Empty);
    }
    let size = data.len() as u64;
    if size > max_bytes {
        return Err(UploadError::TooLarge { size, max: max_bytes });
    }
    let declared = ImageFormat::from_mime_type(mime_type)
        .ok_or_else(|| UploadError::UnsupportedType(mime_type.to_string()))?;
    match ImageFormat::from_magic_bytes(data) {
        Some(detected) if detected == declared => Ok(declared),
        _ => Err(UploadError::ContentMismatch {
            declared: mime_type.to_string(),
        }),
    }
}

/// JSON upload body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub file_name: String,
    pub mime_type: String,
    /// Base64 (standard alphabet) file content.
    pub data: String,
}

impl UploadRequest {
    pub fn into_file(self) -> Result<UploadFile, UploadError> {
        let data = STANDARD
            .decode(self.data.trim())
            .map_err(|e| UploadError::InvalidEncoding(e.to_string()))?;
        Ok(UploadFile::new(self.file_name, self.mime_type, data))
    }
}

/// An image persisted by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: String,
    pub file_url: String,
    pub thumbnail_url: String,
    pub original_name: String,
    pub mime_type: String,
    pub file_size: u64,
    /// Unix timestamp, seconds.
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_accepts_matching_png() {
        assert_eq!(validate_upload("image/png", PNG, 1024), Ok(ImageFormat::Png));
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let mut data = PNG.to_vec();
        data.resize(100, 0);
        assert!(validate_upload("image/png", &data, 100).is_ok());
        assert_eq!(
            validate_upload("image/png", &data, 99),
            Err(UploadError::TooLarge { size: 100, max: 99 })
        );
    }

    #[test]
    fn test_rejects_unsupported_and_mismatched() {
        assert!(matches!(
            validate_upload("image/gif", b"GIF89a", 1024),
            Err(UploadError::UnsupportedType(_))
        ));
        assert!(matches!(
            validate_upload("image/jpeg", PNG, 1024),
            Err(UploadError::ContentMismatch { .. })
        ));
        assert_eq!(validate_upload("image/png", &[], 1024), Err(UploadError::Empty));
    }

    #[test]
    fn test_untyped_file_falls_back_to_extension() {
        let file = UploadFile::new("Logo.PNG", "", PNG.to_vec());
        assert_eq!(file.declared_mime(), "image/png");
        assert_eq!(file.validate(1024), Ok(ImageFormat::Png));

        let generic = UploadFile::new("photo.jpg", "application/octet-stream", PNG.to_vec());
        assert!(matches!(generic.validate(1024), Err(UploadError::ContentMismatch { .. })));

        let unknown = UploadFile::new("notes.txt", "", PNG.to_vec());
        assert!(matches!(unknown.validate(1024), Err(UploadError::UnsupportedType(_))));

        let typed = UploadFile::new("logo.jpg", "image/png", PNG.to_vec());
        assert_eq!(typed.declared_mime(), "image/png");
    }

    #[test]
    fn test_default_limit() {
        let file = UploadFile::new("big.png", "image/png", PNG.to_vec());
        assert!(file.validate(crate::config::DEFAULT_MAX_UPLOAD_BYTES).is_ok());
        assert_eq!(crate::config::DEFAULT_MAX_UPLOAD_BYTES, 26_214_400);
    }

    #[test]
    fn test_request_encoding() {
        let file = UploadFile::new("logo.png", "image/png", PNG.to_vec());
        let decoded = file.to_request().into_file().unwrap();
        assert_eq!(decoded, file);

        let bad = UploadRequest {
            file_name: "x.png".into(),
            mime_type: "image/png".into(),
            data: "***".into(),
        };
        assert!(matches!(bad.into_file(), Err(UploadError::InvalidEncoding(_))));
    }
}
