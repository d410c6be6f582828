//! Resolves import-style paths to files on disk.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// A resolved file and its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Looks up files the way a bundler resolves extensionless imports.
#[derive(Debug, Clone)]
pub struct ContentLocator {
    extensions: Vec<String>,
}

impl ContentLocator {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    /// Resolve `path` to an existing file: the path itself, then
    /// `<dir>/index.<ext>`, then `<path>.<ext>` in configured extension order.
    pub fn resolve(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        if path.is_dir() {
            for ext in &self.extensions {
                let candidate = path.join(format!("index.{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        self.extensions.iter().find_map(|ext| {
            let mut name = OsString::from(path.as_os_str());
            name.push(".");
            name.push(ext);
            let candidate = PathBuf::from(name);
            candidate.is_file().then_some(candidate)
        })
    }

    /// Resolve and read. Unreadable files are logged and treated as missing.
    pub fn locate(&self, path: &Path) -> Option<LocatedFile> {
        let resolved = self.resolve(path)?;
        match fs::read_to_string(&resolved) {
            Ok(content) => {
                debug!(path = %resolved.display(), bytes = content.len(), "located file");
                Some(LocatedFile {
                    path: resolved,
                    content,
                })
            }
            Err(err) => {
                warn!(path = %resolved.display(), err = %err, "failed to read located file");
                None
            }
        }
    }

    pub fn overwrite(&self, path: &Path, content: &str) -> Result<()> {
        fs::write(path, content).with_context(|| format!("write {}", path.display()))
    }
}
