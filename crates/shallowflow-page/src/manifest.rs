//! The list of snippets a page can load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use shallowflow_core::Result;

pub const MANIFEST_FILE: &str = "snippets.json";

/// Snippet names (file stems), serialized as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnippetManifest {
    names: Vec<String>,
}

impl SnippetManifest {
    /// Collect the stems of every `*.py` file directly under `dir`, sorted.
    pub async fn scan(dir: &Path) -> Result<Self> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("py") {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        debug!(dir = %dir.display(), count = names.len(), "Scanned snippets");
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
