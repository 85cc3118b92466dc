//! Rendered output files produced by a target

use crate::error::{EngineError, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// Files keyed by path relative to the output directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    files: BTreeMap<String, Vec<u8>>,
}

impl Artifact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Write every file below `dir`, creating parent directories
    ///
    /// Paths must stay inside `dir`; absolute paths and `..` are rejected
    /// before anything is written.
    pub async fn write_to(&self, dir: &Path) -> Result<()> {
        if let Some(path) = self.paths().find(|path| {
            !Path::new(path)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        }) {
            return Err(EngineError::Render(format!(
                "artifact path {path} escapes the output directory"
            )));
        }

        for (path, contents) in &self.files {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, contents).await?;
            tracing::debug!(path = %target.display(), bytes = contents.len(), "wrote artifact file");
        }
        Ok(())
    }
}
