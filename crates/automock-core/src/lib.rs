//! # AutoMock Core
//!
//! Collection ingestion core for AutoMock: turns an exported API
//! collection (Postman v2.1, Bruno, Insomnia) into a prioritised,
//! MockServer-compatible expectation set by actually executing the
//! collection against the real endpoints.
//!
//! The pipeline runs leaves-first:
//!
//! - **Import**: dialect detection and decoding into one request model,
//!   with scripts rewritten to the canonical `pm.*` surface.
//! - **Run**: strictly sequential execution — pre-script, variable
//!   resolution, real HTTP call, post-script — with response capture and
//!   variable propagation through a per-run scope.
//! - **Scenario detection**: same-endpoint variants grouped and classified
//!   by what differentiates them (auth, status, headers, query, body).
//! - **Expectation emission**: one prioritised expectation per variant and
//!   per ungrouped node, serialized into a [`config::MockConfiguration`]
//!   and handed to an injected [`storage::ConfigStore`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use automock_core::expectation::{self, BuildOptions};
//! use automock_core::import::{parse_collection_file, Dialect};
//! use automock_core::run::{AutoPrompter, CollectionRunner};
//! use automock_core::{config, scenario};
//! use std::path::Path;
//!
//! # async fn example() -> automock_core::Result<()> {
//! let collection = parse_collection_file(Path::new("orders.json"), Dialect::Postman)?;
//! let runner = CollectionRunner::new(AutoPrompter::continuing())?;
//! let mut report = runner.run(collection.requests, collection.seed_variables).await?;
//!
//! let analysis = scenario::detect(&mut report.nodes);
//! let stamp = config::next_version_stamp();
//! let expectations = expectation::build(
//!     &report.nodes,
//!     &analysis,
//!     &BuildOptions::default(),
//!     Dialect::Postman,
//!     stamp,
//! );
//! let configuration = config::build_configuration(
//!     "orders-api",
//!     &collection.name,
//!     Dialect::Postman,
//!     &analysis,
//!     expectations,
//!     stamp,
//! );
//! # let _ = configuration;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod expectation;
pub mod import;
pub mod model;
pub mod run;
pub mod scenario;
pub mod script;
pub mod storage;
pub mod templating;

pub use config::MockConfiguration;
pub use error::{Error, Result};
pub use model::{
    ApiKind, ExecutionNode, Headers, OutboundRequest, RequestRecord, ResponseRecord, VariableScope,
};
