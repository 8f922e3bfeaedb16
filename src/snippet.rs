//! Ephemeral on-disk copies of submitted snippets
//!
//! Each copy lives in its own uniquely named temp directory which is
//! removed when the `SnippetDir` is dropped, on every exit path.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File name used for the snippet inside its directory
pub const SNIPPET_FILE: &str = "submission.py";

pub struct SnippetDir {
    dir: TempDir,
    file: PathBuf,
}

impl SnippetDir {
    /// Write `code` to a fresh temp directory
    pub fn write(prefix: &str, code: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .context("Failed to create snippet directory")?;
        let file = dir.path().join(SNIPPET_FILE);
        std::fs::write(&file, code)
            .with_context(|| format!("Failed to write snippet to {}", file.display()))?;
        Ok(Self { dir, file })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}
