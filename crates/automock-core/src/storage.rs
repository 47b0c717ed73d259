//! Configuration storage contract
//!
//! The core hands finished configurations to an injected store and never
//! implements cloud persistence itself. Versioning policy belongs to the
//! implementation behind the trait.

use crate::config::MockConfiguration;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Keyed configuration store consumed by the pipeline.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Persist a configuration under the project identifier.
    async fn save_config(&self, project_id: &str, config: &MockConfiguration) -> Result<()>;

    /// Fetch the configuration stored under the project identifier.
    async fn get_config(&self, project_id: &str) -> Result<MockConfiguration>;
}

/// In-memory store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    configs: RwLock<HashMap<String, MockConfiguration>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn save_config(&self, project_id: &str, config: &MockConfiguration) -> Result<()> {
        let mut configs = self.configs.write().await;
        configs.insert(project_id.to_string(), config.clone());
        Ok(())
    }

    async fn get_config(&self, project_id: &str) -> Result<MockConfiguration> {
        let configs = self.configs.read().await;
        configs
            .get(project_id)
            .cloned()
            .ok_or_else(|| Error::storage(format!("no configuration for project '{project_id}'")))
    }
}
