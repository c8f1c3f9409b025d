//! `multipart/form-data` file uploads
//!
//! A local file is sent as the single item of an HTML form. The part header
//! and the closing boundary are kept in memory; the file content is streamed
//! between them when the message is sent.

use super::Result;
use std::path::{Path, PathBuf};

const BOUNDARY_LEN: usize = 24;

/// A file wrapped as a form item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartFile {
    path: PathBuf,
    boundary: String,
    prefix: Vec<u8>,
    suffix: Vec<u8>,
}

impl MultipartFile {
    /// Wrap `path` as the form field `field`, with a random boundary
    pub fn new(path: impl Into<PathBuf>, field: &str) -> Self {
        let boundary: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(BOUNDARY_LEN)
            .collect();
        Self::with_boundary(path, field, format!("----httpkit{}", boundary))
    }

    /// Wrap `path` with a fixed boundary
    pub fn with_boundary(path: impl Into<PathBuf>, field: &str, boundary: impl Into<String>) -> Self {
        let path = path.into();
        let boundary = boundary.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().replace('"', "%22"))
            .unwrap_or_default();

        let prefix = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            boundary, field, filename
        );
        let suffix = format!("\r\n--{}--\r\n", boundary);

        MultipartFile {
            path,
            boundary,
            prefix: prefix.into_bytes(),
            suffix: suffix.into_bytes(),
        }
    }

    /// The file being uploaded
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the message's `Content-Type` header
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Bytes sent before the file content
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Bytes sent after the file content
    pub fn suffix(&self) -> &[u8] {
        &self.suffix
    }

    /// Total body length, file included
    pub fn content_length(&self) -> Result<u64> {
        let file_len = std::fs::metadata(&self.path)?.len();
        Ok(self.prefix.len() as u64 + file_len + self.suffix.len() as u64)
    }
}
