//! Expectation emission
//!
//! Transforms executed nodes and scenario analysis into MockServer-shaped
//! expectation records. One expectation per scenario variant, then one per
//! ungrouped node; priorities are a strictly increasing sequence from 1 in
//! emission order, higher priority matching first on the mock side.

use crate::import::Dialect;
use crate::model::{ApiKind, ExecutionNode, ResponseRecord};
use crate::scenario::{path_of, Differentiator, ScenarioAnalysis};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static NON_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

/// Authorization values the invalid-auth matcher accepts
const INVALID_AUTH_VALUES: &[&str] = &["invalid", "expired", "Bearer invalid", "Bearer expired"];

/// JSON body match semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    /// Exact match
    #[serde(rename = "STRICT")]
    Strict,
    /// Subset match: extra fields on the incoming request are ignored
    #[serde(rename = "ONLY_MATCHING_FIELDS")]
    OnlyMatchingFields,
}

/// Path match semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathMatchingStrategy {
    /// The path field is a regular expression
    #[serde(rename = "REGEX")]
    Regex,
}

/// Per-header match rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderMatcher {
    /// Exact value
    Value(String),
    /// Any of these values
    Values {
        /// Accepted values
        values: Vec<String>,
    },
    /// The header must be absent
    Absent {
        /// Always `true`
        not: bool,
    },
}

/// Request body match rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodyMatcher {
    /// JSON body with configurable match semantics
    Json {
        /// Always `"JSON"`
        #[serde(rename = "type")]
        body_type: String,
        /// The JSON value to match
        json: Value,
        /// Exact or subset matching
        #[serde(rename = "matchType")]
        match_type: MatchType,
    },
    /// The request must carry no body
    Absent {
        /// Always `true`
        not: bool,
    },
    /// Literal string body
    Text(String),
}

impl BodyMatcher {
    fn json(json: Value, match_type: MatchType) -> Self {
        Self::Json {
            body_type: "JSON".to_string(),
            json,
            match_type,
        }
    }

    /// Literal body: JSON-typed when parseable, plain text otherwise.
    fn literal(body: &str, match_type: MatchType) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(json) => Self::json(json, match_type),
            Err(_) => Self::Text(body.to_string()),
        }
    }
}

/// Response body value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// JSON body
    Json {
        /// Always `"JSON"`
        #[serde(rename = "type")]
        body_type: String,
        /// The JSON value to return
        json: Value,
    },
    /// Plain text body
    Text(String),
}

/// Request-side matching rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    /// HTTP method, never empty
    pub method: String,
    /// Path (or path regex), never empty
    pub path: String,
    /// Present when `path` is a regex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_matching_strategy: Option<PathMatchingStrategy>,
    /// Per-header match rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<IndexMap<String, HeaderMatcher>>,
    /// Required query parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string_parameters: Option<IndexMap<String, String>>,
    /// Body match rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyMatcher>,
}

/// Response side, copied from the recorded response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    /// HTTP status code
    pub status_code: u16,
    /// Response headers, name to value list
    pub headers: IndexMap<String, Vec<String>>,
    /// Response body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
}

/// How often the expectation may match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Times {
    /// Matches left before the expectation expires
    pub remaining_times: i64,
    /// Whether the expectation never expires
    pub unlimited: bool,
}

/// Artificial response delay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delay {
    /// Delay unit
    pub time_unit: String,
    /// Delay amount
    pub value: u64,
}

/// One MockServer expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    /// Stable id: dialect, request name and run timestamp
    pub id: String,
    /// Higher priority wins when several expectations match
    pub priority: i64,
    /// Request-side matching rules
    pub http_request: HttpRequest,
    /// Canned response
    pub http_response: HttpResponse,
    /// Match-count limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub times: Option<Times>,
    /// Response delay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
}

/// Knobs for expectation emission
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Convert identifier-looking path segments to `[^/]+` regexes
    pub regex_paths: bool,
    /// GraphQL envelope match semantics
    pub graphql_match: MatchType,
    /// Attach the recorded elapsed time as a response delay
    pub include_delay: bool,
    /// Limit how often each expectation matches
    pub times: Option<i64>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            regex_paths: false,
            // Clients commonly add operationName and extension fields the
            // author never wrote, so subset matching is the safer default.
            graphql_match: MatchType::OnlyMatchingFields,
            include_delay: false,
            times: None,
        }
    }
}

/// Emit expectations for the run: scenario variants first (groups in
/// first-appearance order, variants in collection order), ungrouped nodes
/// after. Skipped nodes have no response and emit nothing.
pub fn build(
    nodes: &[ExecutionNode],
    analysis: &ScenarioAnalysis,
    options: &BuildOptions,
    dialect: Dialect,
    run_stamp: i64,
) -> Vec<Expectation> {
    let mut expectations = Vec::new();
    let mut priority = 0i64;

    for group in &analysis.groups {
        for variant in &group.variants {
            let node = &nodes[variant.node_index];
            let Some(response) = &node.response else {
                continue;
            };
            priority += 1;
            expectations.push(build_one(
                node,
                response,
                Some(&variant.differentiator),
                priority,
                options,
                dialect,
                run_stamp,
            ));
        }
    }
    for &index in &analysis.ungrouped {
        let node = &nodes[index];
        let Some(response) = &node.response else {
            continue;
        };
        priority += 1;
        expectations.push(build_one(
            node, response, None, priority, options, dialect, run_stamp,
        ));
    }
    expectations
}

fn build_one(
    node: &ExecutionNode,
    response: &ResponseRecord,
    differentiator: Option<&Differentiator>,
    priority: i64,
    options: &BuildOptions,
    dialect: Dialect,
    run_stamp: i64,
) -> Expectation {
    let (method, url, headers, query_params, body) = match &node.outbound {
        Some(outbound) => (
            outbound.method.as_str(),
            outbound.url.as_str(),
            &outbound.headers,
            &outbound.query_params,
            outbound.body.as_deref(),
        ),
        None => (
            node.request.method.as_str(),
            node.request.url.as_str(),
            &node.request.headers,
            &node.request.query_params,
            node.request.body.as_deref(),
        ),
    };

    let (path, path_matching_strategy) = if options.regex_paths {
        path_to_regex(&path_of(url))
    } else {
        (path_of(url), None)
    };

    let mut header_matchers: IndexMap<String, HeaderMatcher> = IndexMap::new();
    let mut query_matchers: Option<IndexMap<String, String>> = None;
    let mut body_matcher: Option<BodyMatcher> = None;

    match differentiator {
        Some(Differentiator::NoAuth) => {
            header_matchers.insert("Authorization".to_string(), HeaderMatcher::Absent { not: true });
        }
        Some(Differentiator::InvalidAuth) => {
            header_matchers.insert(
                "Authorization".to_string(),
                HeaderMatcher::Values {
                    values: INVALID_AUTH_VALUES.iter().map(|v| v.to_string()).collect(),
                },
            );
        }
        Some(Differentiator::DifferentHeaders | Differentiator::DifferentHeaderValues) => {
            for (name, value) in headers.iter() {
                header_matchers.insert(name.to_string(), HeaderMatcher::Value(value.to_string()));
            }
        }
        Some(Differentiator::NoHeaders) => {}
        Some(Differentiator::DifferentQueryParams) => {
            query_matchers = Some(query_params.clone());
        }
        Some(Differentiator::NoBody) => {
            body_matcher = Some(BodyMatcher::Absent { not: true });
        }
        Some(Differentiator::WithBody | Differentiator::DifferentRequestBody) => {
            if let Some(body) = body {
                body_matcher = Some(BodyMatcher::literal(body, MatchType::Strict));
            }
        }
        Some(
            Differentiator::Status(_)
            | Differentiator::DifferentVariables
            | Differentiator::DifferentQuery
            | Differentiator::Variant,
        ) => {}
        // Ungrouped nodes match on the headers they actually sent, so a
        // chained request keeps its propagated credentials in the mock.
        None => {
            for (name, value) in headers.iter() {
                header_matchers.insert(name.to_string(), HeaderMatcher::Value(value.to_string()));
            }
        }
    }

    // GraphQL bodies always match through the canonical envelope; for GET
    // the envelope migrates into the query string.
    if node.kind == ApiKind::Graphql {
        if let Some(body) = body {
            if let Ok(envelope) = serde_json::from_str::<Value>(body) {
                if method.eq_ignore_ascii_case("GET") {
                    let mut params = query_matchers.take().unwrap_or_default();
                    if let Some(query) = envelope.get("query").and_then(Value::as_str) {
                        params.insert("query".to_string(), query.to_string());
                    }
                    if let Some(variables) = envelope.get("variables") {
                        if !variables.is_null() {
                            params.insert("variables".to_string(), variables.to_string());
                        }
                    }
                    query_matchers = Some(params);
                    body_matcher = None;
                } else {
                    body_matcher = Some(BodyMatcher::json(envelope, options.graphql_match));
                }
            }
        }
    }

    let http_response = HttpResponse {
        status_code: response.status,
        headers: response
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), vec![value.to_string()]))
            .collect(),
        body: if response.body.is_empty() {
            None
        } else {
            Some(match response.body_json() {
                Some(json) => ResponseBody::Json {
                    body_type: "JSON".to_string(),
                    json,
                },
                None => ResponseBody::Text(response.body.clone()),
            })
        },
    };

    Expectation {
        id: format!(
            "{}-{}-{}-{}",
            dialect.tag(),
            slug(&node.request.name),
            run_stamp,
            priority
        ),
        priority,
        http_request: HttpRequest {
            method: method.to_string(),
            path,
            path_matching_strategy,
            headers: (!header_matchers.is_empty()).then_some(header_matchers),
            query_string_parameters: query_matchers.filter(|params| !params.is_empty()),
            body: body_matcher,
        },
        http_response,
        times: options.times.map(|remaining| Times {
            remaining_times: remaining,
            unlimited: false,
        }),
        delay: options.include_delay.then(|| Delay {
            time_unit: "MILLISECONDS".to_string(),
            value: response.duration_ms,
        }),
    }
}

/// Convert identifier-looking path segments (digits present or longer than
/// ten characters) to `[^/]+`. Deliberately loose; callers wanting
/// precision keep exact matching.
fn path_to_regex(path: &str) -> (String, Option<PathMatchingStrategy>) {
    let mut changed = false;
    let converted: Vec<String> = path
        .split('/')
        .map(|segment| {
            if !segment.is_empty()
                && (segment.chars().any(|c| c.is_ascii_digit()) || segment.len() > 10)
            {
                changed = true;
                "[^/]+".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();
    if changed {
        (converted.join("/"), Some(PathMatchingStrategy::Regex))
    } else {
        (path.to_string(), None)
    }
}

fn slug(name: &str) -> String {
    NON_SLUG_RE
        .replace_all(&name.to_ascii_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}
