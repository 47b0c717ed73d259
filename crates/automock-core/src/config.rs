//! The persisted artifact: expectations plus run metadata
//!
//! A [`MockConfiguration`] is what the storage interface receives. The
//! version tag derives from a monotonically increasing millisecond
//! timestamp so later runs always sort after earlier ones, even within the
//! same millisecond.

use crate::expectation::Expectation;
use crate::import::Dialect;
use crate::scenario::ScenarioAnalysis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Next version stamp: wall-clock milliseconds, forced strictly above any
/// stamp handed out earlier in this process.
pub fn next_version_stamp() -> i64 {
    let now = Utc::now().timestamp_millis();
    LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .map(|last| now.max(last + 1))
        .unwrap_or(now)
}

/// Descriptive record attached to a configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Project the configuration belongs to
    pub project_id: String,
    /// Version tag derived from the run stamp
    pub version: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Human description (collection name when nothing else is given)
    pub description: String,
    /// Generator identity
    pub provider: String,
}

/// Free-form origin description for the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    /// Source dialect tag
    pub source: String,
    /// How the expectations were produced
    pub import_method: String,
    /// Number of detected scenario groups
    pub scenario_count: usize,
    /// Number of emitted expectations
    pub total_expectations: usize,
    /// Number of distinct logical endpoints
    pub total_endpoints: usize,
    /// Run stamp the import happened at
    pub import_timestamp: i64,
}

/// The persisted artifact: metadata, ordered expectations and origin
/// settings. The storage interface receives a serialized copy and assumes
/// no further coupling to the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockConfiguration {
    /// Descriptive record
    pub metadata: Metadata,
    /// Ordered expectation set
    pub expectations: Vec<Expectation>,
    /// Origin description
    pub settings: ImportSettings,
}

/// Assemble the configuration for one finished run.
pub fn build_configuration(
    project_id: &str,
    description: &str,
    dialect: Dialect,
    analysis: &ScenarioAnalysis,
    expectations: Vec<Expectation>,
    run_stamp: i64,
) -> MockConfiguration {
    let now = Utc::now();
    MockConfiguration {
        metadata: Metadata {
            project_id: project_id.to_string(),
            version: format!("v{run_stamp}"),
            created_at: now,
            updated_at: now,
            description: description.to_string(),
            provider: "automock".to_string(),
        },
        settings: ImportSettings {
            source: dialect.tag().to_string(),
            import_method: "collection".to_string(),
            scenario_count: analysis.scenario_count(),
            total_expectations: expectations.len(),
            total_endpoints: analysis.endpoint_count(),
            import_timestamp: run_stamp,
        },
        expectations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_increase_strictly() {
        let first = next_version_stamp();
        let second = next_version_stamp();
        let third = next_version_stamp();
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn configuration_round_trips_through_json() {
        let config = build_configuration(
            "shop-api",
            "Shop collection",
            Dialect::Postman,
            &ScenarioAnalysis::default(),
            Vec::new(),
            1700000000000,
        );

        let serialized = serde_json::to_string(&config).expect("serializes");
        assert!(serialized.contains("\"projectId\":\"shop-api\""));
        assert!(serialized.contains("\"version\":\"v1700000000000\""));
        assert!(serialized.contains("\"importMethod\":\"collection\""));

        let back: MockConfiguration = serde_json::from_str(&serialized).expect("deserializes");
        assert_eq!(back, config);
    }

    #[test]
    fn settings_reflect_the_analysis() {
        let analysis = ScenarioAnalysis {
            groups: Vec::new(),
            ungrouped: vec![0, 1, 2],
        };
        let config = build_configuration(
            "p",
            "d",
            Dialect::Insomnia,
            &analysis,
            Vec::new(),
            1,
        );
        assert_eq!(config.settings.source, "insomnia");
        assert_eq!(config.settings.scenario_count, 0);
        assert_eq!(config.settings.total_endpoints, 3);
    }
}
