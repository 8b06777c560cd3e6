use std::path::PathBuf;

use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::storage::{allocate_name, StorageAreas};

/// Extensions accepted at intake, whatever tool was selected.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "docx", "xlsx", "pptx", "txt"];

/// A file part as received from the client, not yet validated.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub body: Bytes,
}

/// A validated upload persisted in the upload area.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original: String,
    pub stored: String,
    pub path: PathBuf,
    pub ext: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("No files uploaded")]
    NoFiles,
    #[error("No valid files uploaded")]
    NoValidFiles,
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Last path component of a client-supplied name, for either separator style.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Lowercased extension of `name`, if it has a non-empty one.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = base_name(name).rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

pub fn is_allowed(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Display-safe version of a client file name: no directories, only `[A-Za-z0-9._-]`,
/// no leading dots.
pub fn sanitize_filename(name: &str) -> String {
    lazy_static! {
        static ref UNSAFE_RE: Regex = Regex::new(r"[^A-Za-z0-9._-]+").unwrap();
    }
    const MAX_LEN: usize = 255;

    let cleaned = UNSAFE_RE.replace_all(base_name(name).trim(), "_");
    let cleaned = cleaned.trim_start_matches(['.', '_']).trim_end_matches('_');
    let cleaned: String = cleaned.chars().take(MAX_LEN).collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Validate and persist uploads in input order. Files with a disallowed extension are
/// skipped; if none survive the whole batch is rejected. Written files are left for the
/// sweeper even when a later step fails.
pub async fn save_files(
    areas: &StorageAreas,
    files: Vec<IncomingFile>,
) -> Result<Vec<UploadedFile>, IntakeError> {
    if files.is_empty() {
        return Err(IntakeError::NoFiles);
    }

    let mut saved = Vec::with_capacity(files.len());
    for file in files {
        let Some(ext) = extension_of(&file.file_name).filter(|_| is_allowed(&file.file_name))
        else {
            warn!(file_name = %file.file_name, "rejected upload with disallowed extension");
            continue;
        };

        let mut original = sanitize_filename(&file.file_name);
        if extension_of(&original).as_deref() != Some(ext.as_str()) {
            original = format!("{}.{}", original, ext);
        }

        let stored = allocate_name("", &ext);
        let path = areas.upload_dir().join(&stored);
        tokio::fs::write(&path, &file.body).await?;
        debug!(%original, %stored, bytes = file.body.len(), "upload saved");

        saved.push(UploadedFile {
            original,
            stored,
            path,
            ext,
        });
    }

    if saved.is_empty() {
        return Err(IntakeError::NoValidFiles);
    }
    Ok(saved)
}
