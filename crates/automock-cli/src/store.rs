//! Directory-backed configuration store
//!
//! The injected `ConfigStore` implementation the CLI uses: each project
//! gets a directory holding `config.json` (latest) plus one file per
//! version, so earlier runs stay inspectable.

use async_trait::async_trait;
use automock_core::storage::ConfigStore;
use automock_core::{Error, MockConfiguration, Result};
use std::path::PathBuf;

/// Stores configurations under `<root>/<project>/`.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }
}

#[async_trait]
impl ConfigStore for DirStore {
    async fn save_config(&self, project_id: &str, config: &MockConfiguration) -> Result<()> {
        let dir = self.project_dir(project_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(format!("creating {}: {e}", dir.display())))?;

        let payload = serde_json::to_vec_pretty(config)
            .map_err(|e| Error::storage(format!("encoding configuration: {e}")))?;

        let versioned = dir.join(format!("config-{}.json", config.metadata.version));
        tokio::fs::write(&versioned, &payload)
            .await
            .map_err(|e| Error::storage(format!("writing {}: {e}", versioned.display())))?;

        let latest = dir.join("config.json");
        tokio::fs::write(&latest, &payload)
            .await
            .map_err(|e| Error::storage(format!("writing {}: {e}", latest.display())))?;
        Ok(())
    }

    async fn get_config(&self, project_id: &str) -> Result<MockConfiguration> {
        let latest = self.project_dir(project_id).join("config.json");
        let payload = tokio::fs::read(&latest)
            .await
            .map_err(|e| Error::storage(format!("reading {}: {e}", latest.display())))?;
        serde_json::from_slice(&payload)
            .map_err(|e| Error::storage(format!("decoding {}: {e}", latest.display())))
    }
}
