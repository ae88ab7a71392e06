use crate::errors::{RagflowError, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;

/// Reads the raw text of a source document.
#[async_trait]
pub trait DocumentLoader: Send + Sync + Debug {
    /// Loads `source`. Any failure is fatal for the ingestion run.
    async fn load(&self, source: &str, source_type: &str) -> Result<String>;
}

/// Loads documents from the local filesystem as UTF-8 text.
#[derive(Debug, Clone, Default)]
pub struct FsDocumentLoader {
    root: Option<PathBuf>,
}

impl FsDocumentLoader {
    /// Creates a loader that resolves sources as given.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative sources against `root`.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn resolve(&self, source: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(source),
            None => PathBuf::from(source),
        }
    }
}

#[async_trait]
impl DocumentLoader for FsDocumentLoader {
    async fn load(&self, source: &str, source_type: &str) -> Result<String> {
        let path = self.resolve(source);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RagflowError::load(source, e.to_string()))?;

        tracing::debug!(source, source_type, bytes = text.len(), "Loaded document");
        Ok(text)
    }
}
