//! Data model for the collection ingestion pipeline
//!
//! These types flow through every pipeline stage: parsers emit
//! [`RequestRecord`]s, the planner wraps them in [`ExecutionNode`]s, the
//! executor fills in [`OutboundRequest`] and [`ResponseRecord`], and the
//! scenario detector and expectation builder consume the finished nodes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Ordered, case-preserving header collection with case-insensitive lookup.
///
/// Header casing from the source collection is kept as-is; lookups ignore
/// case, matching HTTP semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Create an empty header collection
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header, replacing an existing one with the same
    /// case-insensitive name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            entry.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    /// Look up a header value, ignoring name case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether a header with this name is present (case-insensitive).
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of headers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Map every value through `f`, keeping names and order.
    pub fn map_values<F: Fn(&str) -> String>(&self, f: F) -> Self {
        Self(self.0.iter().map(|(n, v)| (n.clone(), f(v))).collect())
    }

    /// The set of header names, lower-cased, for set comparisons.
    pub fn name_set(&self) -> BTreeSet<String> {
        self.0.iter().map(|(n, _)| n.to_ascii_lowercase()).collect()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

/// A normalised request extracted from a collection.
///
/// Invariants: `method` and `url` are non-empty (parsers reject records
/// that would violate this).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    /// Stable identifier within one run
    pub id: String,
    /// Human-readable label from the collection
    pub name: String,
    /// Upper-case HTTP method token
    pub method: String,
    /// Raw URL; may contain `{{name}}` / `${name}` placeholders
    pub url: String,
    /// Request headers
    #[serde(default)]
    pub headers: Headers,
    /// Raw request body, if any
    pub body: Option<String>,
    /// Query parameters
    #[serde(default)]
    pub query_params: IndexMap<String, String>,
    /// Normalised pre-request script source
    pub pre_script: Option<String>,
    /// Normalised post-response script source
    pub post_script: Option<String>,
}

impl RequestRecord {
    /// Whether the record satisfies the non-empty method/url invariant
    pub fn is_valid(&self) -> bool {
        !self.method.is_empty() && !self.url.is_empty()
    }
}

/// The request as actually sent: placeholders substituted from the run scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    /// HTTP method
    pub method: String,
    /// Fully substituted URL
    pub url: String,
    /// Substituted headers
    pub headers: Headers,
    /// Substituted query parameters
    pub query_params: IndexMap<String, String>,
    /// Substituted body
    pub body: Option<String>,
}

/// Recorded response for an executed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    /// HTTP status code
    pub status: u16,
    /// Response headers, first value per name
    pub headers: Headers,
    /// Raw response body text
    pub body: String,
    /// Cookies set by the response
    #[serde(default)]
    pub cookies: IndexMap<String, String>,
    /// Wall-clock elapsed time in milliseconds
    pub duration_ms: u64,
}

impl ResponseRecord {
    /// The body parsed as JSON, if it is JSON.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Whether a node talks to a REST endpoint or a GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiKind {
    /// Plain HTTP/REST request
    Rest,
    /// GraphQL operation
    Graphql,
}

/// A request plus its realised execution state.
///
/// Created by the planner, filled in by the executor and script runtime,
/// classified by the scenario detector, and dropped with the run.
#[derive(Debug, Clone)]
pub struct ExecutionNode {
    /// The parsed request
    pub request: RequestRecord,
    /// REST or GraphQL, assigned by the scenario detector
    pub kind: ApiKind,
    /// Variable names referenced by URL, headers, body and query values
    pub referenced: BTreeSet<String>,
    /// Variable names the pre-script assigns
    pub pre_assigned: BTreeSet<String>,
    /// The request as sent, after placeholder substitution
    pub outbound: Option<OutboundRequest>,
    /// The recorded response, if the node executed
    pub response: Option<ResponseRecord>,
    /// Variable names the post-script bound
    pub variables_produced: BTreeSet<String>,
    /// Whether the node was skipped (unresolved variables, operator choice)
    pub skipped: bool,
}

impl ExecutionNode {
    /// Wrap a request record into a fresh, unexecuted node
    pub fn new(request: RequestRecord) -> Self {
        Self {
            request,
            kind: ApiKind::Rest,
            referenced: BTreeSet::new(),
            pre_assigned: BTreeSet::new(),
            outbound: None,
            response: None,
            variables_produced: BTreeSet::new(),
            skipped: false,
        }
    }

    /// Whether the node executed and has a response to emit from
    pub fn executed(&self) -> bool {
        self.response.is_some()
    }
}

/// Mutable name → value store alive for exactly one collection run.
///
/// Written by the resolver and the script runtime, read by placeholder
/// substitution and script `get` calls. Never shared across runs.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    values: HashMap<String, String>,
}

impl VariableScope {
    /// Create an empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a scope from collection or environment variables
    pub fn seeded<I: IntoIterator<Item = (String, String)>>(seed: I) -> Self {
        Self {
            values: seed.into_iter().collect(),
        }
    }

    /// Insert or update a binding
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Look up a binding
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Whether a binding exists
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the scope has no bindings
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Snapshot of the current bindings, for handing to the script runtime
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values.clone()
    }

    /// Merge bindings produced elsewhere (scripts) into the scope
    pub fn merge<I: IntoIterator<Item = (String, String)>>(&mut self, bindings: I) {
        for (name, value) in bindings {
            self.values.insert(name, value);
        }
    }
}
