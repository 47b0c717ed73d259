//! Postman environment file import
//!
//! Seeds the run scope from an exported Postman environment; only enabled
//! values are taken.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PostmanEnvironment {
    name: Option<String>,
    #[serde(default)]
    values: Vec<EnvironmentValue>,
}

#[derive(Debug, Deserialize)]
struct EnvironmentValue {
    key: String,
    value: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Result of importing an environment file
#[derive(Debug)]
pub struct EnvironmentImport {
    /// Environment name
    pub name: String,
    /// Enabled variable values
    pub variables: IndexMap<String, String>,
    /// Total number of entries in the file, enabled or not
    pub total_count: usize,
}

/// Import a Postman environment JSON document.
pub fn import_environment(content: &str) -> Result<EnvironmentImport> {
    let environment: PostmanEnvironment = serde_json::from_str(content)
        .map_err(|e| Error::parse("postman", format!("environment file: {e}")))?;

    let total_count = environment.values.len();
    let mut variables = IndexMap::new();
    for entry in environment.values {
        if !entry.enabled {
            continue;
        }
        if let Some(value) = entry.value {
            variables.insert(entry.key, value);
        }
    }

    Ok(EnvironmentImport {
        name: environment
            .name
            .unwrap_or_else(|| "Unnamed Environment".to_string()),
        variables,
        total_count,
    })
}
