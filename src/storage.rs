use std::path::{Path, PathBuf};

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::config::StorageConfig;

/// Random 128-bit token rendered as 32 lowercase hex digits.
pub fn random_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Storage name for a new file: optional tool prefix, random token, extension.
/// Never derived from a client-supplied name.
pub fn allocate_name(prefix: &str, ext: &str) -> String {
    if ext.is_empty() {
        format!("{}{}", prefix, random_token())
    } else {
        format!("{}{}.{}", prefix, random_token(), ext)
    }
}

pub(crate) fn is_storage_name(name: &str) -> bool {
    lazy_static! {
        static ref NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]+(\.[A-Za-z0-9]+)?$").unwrap();
    }
    NAME_RE.is_match(name)
}

/// The two flat directories files live in: uploads and converted outputs.
#[derive(Debug, Clone)]
pub struct StorageAreas {
    upload_dir: PathBuf,
    converted_dir: PathBuf,
}

impl StorageAreas {
    pub fn new(upload_dir: impl Into<PathBuf>, converted_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            converted_dir: converted_dir.into(),
        }
    }

    pub fn from_config(cfg: &StorageConfig) -> Self {
        Self::new(&cfg.upload_dir, &cfg.converted_dir)
    }

    /// Create both directories if they are missing.
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in self.dirs() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create storage dir {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn dirs(&self) -> [&Path; 2] {
        [&self.upload_dir, &self.converted_dir]
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    #[cfg(test)]
    pub fn converted_dir(&self) -> &Path {
        &self.converted_dir
    }

    /// Reserve a fresh output name and return it with its path in the converted area.
    pub fn allocate_output(&self, prefix: &str, ext: &str) -> (PathBuf, String) {
        let name = allocate_name(prefix, ext);
        let path = self.converted_dir.join(&name);
        debug!(%name, "allocated output name");
        (path, name)
    }

    /// Path of a previously produced output, if the name is well formed and the file exists.
    pub fn find_output(&self, name: &str) -> Option<PathBuf> {
        if !is_storage_name(name) {
            return None;
        }
        let path = self.converted_dir.join(name);
        path.is_file().then_some(path)
    }
}

#[cfg(test)]
mod storage_tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn allocated_names_are_unique() {
        let names: HashSet<String> = (0..10_000).map(|_| allocate_name("", "pdf")).collect();
        assert_eq!(names.len(), 10_000);
    }

    #[test]
    fn allocated_name_shape() {
        let name = allocate_name("merged_", "pdf");
        assert!(name.starts_with("merged_"));
        assert!(name.ends_with(".pdf"));
        assert_eq!(name.len(), "merged_".len() + 32 + ".pdf".len());
        assert!(is_storage_name(&name));
    }

    #[test]
    fn storage_name_rejects_traversal() {
        assert!(!is_storage_name("../secret.pdf"));
        assert!(!is_storage_name("a/b.pdf"));
        assert!(!is_storage_name(""));
        assert!(!is_storage_name(".."));
        assert!(is_storage_name("abc123.png"));
    }

    #[test]
    fn find_output_only_sees_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let areas = StorageAreas::new(dir.path().join("up"), dir.path().join("out"));
        areas.ensure_dirs().unwrap();

        let (path, name) = areas.allocate_output("", "txt");
        assert!(areas.find_output(&name).is_none());
        std::fs::write(&path, b"x").unwrap();
        assert_eq!(areas.find_output(&name), Some(path));
        assert!(areas.find_output("../up").is_none());
    }
}
