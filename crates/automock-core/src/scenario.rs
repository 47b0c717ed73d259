//! Scenario detection
//!
//! Groups executed nodes by logical endpoint — `(method, path)` for REST,
//! operation key for GraphQL — and classifies why each member of a group
//! behaves differently from its siblings. Grouping and differentiators are
//! a pure function of the node list.

use crate::model::{ApiKind, ExecutionNode, Headers, OutboundRequest};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;

static OPERATION_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:query|mutation|subscription)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex")
});

/// Fallback operation key when a GraphQL query names no operation
const ANONYMOUS_OPERATION: &str = "anonymous";

/// Why a variant of an endpoint behaves differently from its siblings.
///
/// Closed taxonomy; adding a differentiator is an explicit change here and
/// in the expectation builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Differentiator {
    /// Response status differs from a sibling
    Status(u16),
    /// Authorization header absent here but present on a sibling
    NoAuth,
    /// Authorization value looks invalid or expired while a sibling's is valid
    InvalidAuth,
    /// Header set cardinality differs
    DifferentHeaders,
    /// This variant sends no headers at all
    NoHeaders,
    /// A shared header key carries a different value
    DifferentHeaderValues,
    /// Query-parameter sets differ
    DifferentQueryParams,
    /// This variant has no body while a sibling does
    NoBody,
    /// This variant has a body while a sibling does not
    WithBody,
    /// Bodies differ textually
    DifferentRequestBody,
    /// GraphQL variables differ
    DifferentVariables,
    /// GraphQL query text differs
    DifferentQuery,
    /// No rule fired
    Variant,
}

impl fmt::Display for Differentiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "status-{code}"),
            Self::NoAuth => f.write_str("no-auth"),
            Self::InvalidAuth => f.write_str("invalid-auth"),
            Self::DifferentHeaders => f.write_str("different-headers"),
            Self::NoHeaders => f.write_str("no-headers"),
            Self::DifferentHeaderValues => f.write_str("different-header-values"),
            Self::DifferentQueryParams => f.write_str("different-query-params"),
            Self::NoBody => f.write_str("no-body"),
            Self::WithBody => f.write_str("with-body"),
            Self::DifferentRequestBody => f.write_str("different-request-body"),
            Self::DifferentVariables => f.write_str("different-variables"),
            Self::DifferentQuery => f.write_str("different-query"),
            Self::Variant => f.write_str("variant"),
        }
    }
}

/// One member of a scenario group
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioVariant {
    /// Index into the run's node list
    pub node_index: usize,
    /// Why this variant differs from its siblings
    pub differentiator: Differentiator,
}

/// All variants of one logical endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioGroup {
    /// `METHOD path` for REST, `graphql:<operation>` for GraphQL
    pub base_key: String,
    /// Members, in collection order
    pub variants: Vec<ScenarioVariant>,
}

/// Detector output: groups (≥2 members each) plus the ungrouped nodes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScenarioAnalysis {
    /// Groups in first-appearance order
    pub groups: Vec<ScenarioGroup>,
    /// Indices of executed nodes that belong to no group
    pub ungrouped: Vec<usize>,
}

impl ScenarioAnalysis {
    /// Number of detected scenario groups
    pub fn scenario_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of distinct logical endpoints (grouped or not)
    pub fn endpoint_count(&self) -> usize {
        self.groups.len() + self.ungrouped.len()
    }
}

/// The request surface used for comparison: what was actually sent when
/// the node executed, the parsed record otherwise.
struct Effective<'a> {
    method: &'a str,
    url: &'a str,
    headers: &'a Headers,
    query_params: &'a IndexMap<String, String>,
    body: Option<&'a str>,
}

impl<'a> Effective<'a> {
    fn of(node: &'a ExecutionNode) -> Self {
        match &node.outbound {
            Some(OutboundRequest {
                method,
                url,
                headers,
                query_params,
                body,
            }) => Self {
                method,
                url,
                headers,
                query_params,
                body: body.as_deref(),
            },
            None => Self {
                method: &node.request.method,
                url: &node.request.url,
                headers: &node.request.headers,
                query_params: &node.request.query_params,
                body: node.request.body.as_deref(),
            },
        }
    }
}

/// Strip scheme and host, keeping the path only.
pub fn path_of(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        return parsed.path().to_string();
    }
    let without_query = url.split('?').next().unwrap_or(url);
    if without_query.starts_with('/') {
        without_query.to_string()
    } else {
        format!("/{without_query}")
    }
}

/// Classify a node as REST or GraphQL. Any single signal is sufficient.
pub fn classify(node: &ExecutionNode) -> ApiKind {
    let eff = Effective::of(node);
    let url = eff.url.to_ascii_lowercase();
    if url.contains("/graphql") || url.contains("/gql") || url.contains("?query=") {
        return ApiKind::Graphql;
    }
    if eff
        .headers
        .get("Content-Type")
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("graphql"))
    {
        return ApiKind::Graphql;
    }
    if eff.headers.contains("X-GraphQL-Operation-Name") {
        return ApiKind::Graphql;
    }
    if let Some(body) = eff.body {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
            if map.contains_key("query") || map.contains_key("operationName") {
                return ApiKind::Graphql;
            }
        }
        if body.contains("query ") || body.contains("mutation ") || body.contains("subscription ")
        {
            return ApiKind::Graphql;
        }
    }
    ApiKind::Rest
}

/// GraphQL envelope fields of a node's body, when present.
fn graphql_envelope(body: Option<&str>) -> (Option<String>, Option<Value>) {
    let Some(body) = body else {
        return (None, None);
    };
    match serde_json::from_str::<Value>(body) {
        Ok(value) => (
            value
                .get("query")
                .and_then(Value::as_str)
                .map(str::to_string),
            value.get("variables").cloned(),
        ),
        Err(_) => (Some(body.to_string()), None),
    }
}

/// Derive the grouping key for a GraphQL node: the `operationName` field
/// when present, else the identifier after the operation keyword, else a
/// fixed fallback.
pub fn graphql_operation_key(node: &ExecutionNode) -> String {
    let eff = Effective::of(node);
    if let Some(body) = eff.body {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            if let Some(name) = value.get("operationName").and_then(Value::as_str) {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }
    let (query, _) = graphql_envelope(eff.body);
    query
        .as_deref()
        .and_then(|q| OPERATION_NAME_RE.captures(q))
        .map_or_else(|| ANONYMOUS_OPERATION.to_string(), |caps| caps[1].to_string())
}

fn base_key(node: &ExecutionNode) -> String {
    match node.kind {
        ApiKind::Rest => {
            let eff = Effective::of(node);
            format!("{} {}", eff.method, path_of(eff.url))
        }
        ApiKind::Graphql => format!("graphql:{}", graphql_operation_key(node)),
    }
}

/// Group executed nodes and classify intra-group differences.
///
/// Assigns `kind` on every node as a side effect. Only nodes that executed
/// participate; skipped nodes have nothing to emit from.
pub fn detect(nodes: &mut [ExecutionNode]) -> ScenarioAnalysis {
    for node in nodes.iter_mut() {
        node.kind = classify(node);
    }

    let mut buckets: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (index, node) in nodes.iter().enumerate() {
        if !node.executed() {
            continue;
        }
        buckets.entry(base_key(node)).or_default().push(index);
    }

    let mut analysis = ScenarioAnalysis::default();
    for (key, members) in buckets {
        if members.len() < 2 {
            analysis.ungrouped.extend(members);
            continue;
        }
        let variants = members
            .iter()
            .map(|&index| ScenarioVariant {
                node_index: index,
                differentiator: differentiate(nodes, &members, index),
            })
            .collect();
        analysis.groups.push(ScenarioGroup {
            base_key: key,
            variants,
        });
    }
    analysis
}

/// Run the cascade for one variant against its siblings in listed order;
/// the first rule that fires against any sibling wins.
fn differentiate(nodes: &[ExecutionNode], members: &[usize], index: usize) -> Differentiator {
    for &sibling in members {
        if sibling == index {
            continue;
        }
        if let Some(differentiator) = compare(&nodes[index], &nodes[sibling]) {
            return differentiator;
        }
    }
    Differentiator::Variant
}

fn auth_is_suspect(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.contains("invalid") || lower.contains("expired")
}

/// The fixed differentiator cascade, first match wins.
///
/// Authorization differences are checked ahead of status: an endpoint that
/// answers 401 because the credential is missing is an auth variant, not a
/// status variant, and must end up with the Authorization-absent matcher.
fn compare(node: &ExecutionNode, sibling: &ExecutionNode) -> Option<Differentiator> {
    let this = Effective::of(node);
    let other = Effective::of(sibling);

    // 1. Authorization presence and validity (REST)
    if node.kind == ApiKind::Rest {
        let this_auth = this.headers.get("Authorization");
        let other_auth = other.headers.get("Authorization");
        match (this_auth, other_auth) {
            (None, Some(_)) => return Some(Differentiator::NoAuth),
            (Some(a), Some(b)) if auth_is_suspect(a) && !auth_is_suspect(b) => {
                return Some(Differentiator::InvalidAuth)
            }
            _ => {}
        }
    }

    // 2. Response status
    if let (Some(a), Some(b)) = (&node.response, &sibling.response) {
        if a.status != b.status {
            return Some(Differentiator::Status(a.status));
        }
    }

    // 3. GraphQL envelope differences
    if node.kind == ApiKind::Graphql {
        let (this_query, this_vars) = graphql_envelope(this.body);
        let (other_query, other_vars) = graphql_envelope(other.body);
        if this_vars != other_vars {
            return Some(Differentiator::DifferentVariables);
        }
        if this_query != other_query {
            return Some(Differentiator::DifferentQuery);
        }
    }

    // 4. Header set cardinality, then shared-key value drift
    let this_names = this.headers.name_set();
    let other_names = other.headers.name_set();
    if this_names.len() != other_names.len() {
        return Some(if this_names.is_empty() {
            Differentiator::NoHeaders
        } else {
            Differentiator::DifferentHeaders
        });
    }
    for name in this_names.intersection(&other_names) {
        if this.headers.get(name) != other.headers.get(name) {
            return Some(Differentiator::DifferentHeaderValues);
        }
    }

    // 5. Query parameters
    if this.query_params != other.query_params {
        return Some(Differentiator::DifferentQueryParams);
    }

    // 6. Body presence and content
    match (this.body, other.body) {
        (None, Some(_)) => return Some(Differentiator::NoBody),
        (Some(_), None) => return Some(Differentiator::WithBody),
        (Some(a), Some(b)) if a != b => return Some(Differentiator::DifferentRequestBody),
        _ => {}
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RequestRecord, ResponseRecord};

    fn node(method: &str, url: &str) -> ExecutionNode {
        let mut node = ExecutionNode::new(RequestRecord {
            id: "r".to_string(),
            name: "Request".to_string(),
            method: method.to_string(),
            url: url.to_string(),
            headers: Headers::new(),
            body: None,
            query_params: IndexMap::new(),
            pre_script: None,
            post_script: None,
        });
        node.response = Some(response(200));
        node
    }

    fn response(status: u16) -> ResponseRecord {
        ResponseRecord {
            status,
            headers: Headers::new(),
            body: String::new(),
            cookies: IndexMap::new(),
            duration_ms: 1,
        }
    }

    #[test]
    fn path_strips_scheme_and_host() {
        assert_eq!(path_of("https://api.example.com/users/1?full=true"), "/users/1");
        assert_eq!(path_of("/users/1"), "/users/1");
        assert_eq!(path_of("users/1"), "/users/1");
    }

    #[test]
    fn classifies_graphql_by_url_and_body() {
        assert_eq!(
            classify(&node("POST", "https://api.example.com/graphql")),
            ApiKind::Graphql
        );
        assert_eq!(
            classify(&node("GET", "https://api.example.com/users")),
            ApiKind::Rest
        );

        let mut with_body = node("POST", "https://api.example.com/api");
        with_body.request.body = Some(r#"{"query": "query Q { a }"}"#.to_string());
        assert_eq!(classify(&with_body), ApiKind::Graphql);
    }

    #[test]
    fn singleton_endpoints_form_no_group() {
        let mut nodes = vec![node("GET", "https://api.example.com/users/1")];
        let analysis = detect(&mut nodes);
        assert!(analysis.groups.is_empty());
        assert_eq!(analysis.ungrouped, vec![0]);
    }

    #[test]
    fn status_difference_wins_first() {
        let mut ok = node("GET", "https://api.example.com/items/42");
        ok.response = Some(response(200));
        let mut missing = node("GET", "https://api.example.com/items/42");
        missing.response = Some(response(404));

        let mut nodes = vec![ok, missing];
        let analysis = detect(&mut nodes);
        assert_eq!(analysis.groups.len(), 1);
        let group = &analysis.groups[0];
        assert_eq!(group.base_key, "GET /items/42");
        assert_eq!(group.variants[0].differentiator, Differentiator::Status(200));
        assert_eq!(group.variants[1].differentiator, Differentiator::Status(404));
    }

    #[test]
    fn missing_authorization_is_no_auth_even_when_status_differs() {
        let mut authed = node("GET", "https://api.example.com/api/users/1");
        authed.request.headers.set("Authorization", "Bearer abc");
        authed.response = Some(response(200));
        let mut anonymous = node("GET", "https://api.example.com/api/users/1");
        anonymous.response = Some(response(401));

        let mut nodes = vec![authed, anonymous];
        let analysis = detect(&mut nodes);
        let group = &analysis.groups[0];
        assert_eq!(group.variants[1].differentiator, Differentiator::NoAuth);
        // The authorised variant is a status variant, nothing auth-specific.
        assert_eq!(group.variants[0].differentiator, Differentiator::Status(200));
    }

    #[test]
    fn suspect_auth_values_are_invalid_auth() {
        let mut valid = node("GET", "https://api.example.com/private");
        valid.request.headers.set("Authorization", "Bearer good-token");
        let mut bad = node("GET", "https://api.example.com/private");
        bad.request.headers.set("Authorization", "Bearer expired");

        let mut nodes = vec![valid, bad];
        let analysis = detect(&mut nodes);
        let group = &analysis.groups[0];
        assert_eq!(group.variants[1].differentiator, Differentiator::InvalidAuth);
    }

    #[test]
    fn graphql_groups_by_operation_and_spots_variable_drift() {
        let mut first = node("POST", "https://api.example.com/graphql");
        first.request.body =
            Some(r#"{"query": "query GetUser { user { id } }", "variables": {"id": 1}}"#.to_string());
        let mut second = node("POST", "https://api.example.com/graphql");
        second.request.body =
            Some(r#"{"query": "query GetUser { user { id } }", "variables": {"id": 2}}"#.to_string());

        let mut nodes = vec![first, second];
        let analysis = detect(&mut nodes);
        assert_eq!(analysis.groups.len(), 1);
        let group = &analysis.groups[0];
        assert_eq!(group.base_key, "graphql:GetUser");
        assert_eq!(
            group.variants[0].differentiator,
            Differentiator::DifferentVariables
        );
        assert_eq!(
            group.variants[1].differentiator,
            Differentiator::DifferentVariables
        );
    }

    #[test]
    fn operation_key_prefers_operation_name_field() {
        let mut explicit = node("POST", "https://api.example.com/graphql");
        explicit.request.body =
            Some(r#"{"query": "query Q { a }", "operationName": "Named"}"#.to_string());
        assert_eq!(graphql_operation_key(&explicit), "Named");

        let mut inferred = node("POST", "https://api.example.com/graphql");
        inferred.request.body = Some(r#"{"query": "mutation SaveThing { save }"}"#.to_string());
        assert_eq!(graphql_operation_key(&inferred), "SaveThing");

        let mut anonymous = node("POST", "https://api.example.com/graphql");
        anonymous.request.body = Some(r#"{"query": "{ viewer { id } }"}"#.to_string());
        assert_eq!(graphql_operation_key(&anonymous), "anonymous");
    }

    #[test]
    fn body_presence_differentiates() {
        let with = {
            let mut n = node("POST", "https://api.example.com/things");
            n.request.body = Some(r#"{"a": 1}"#.to_string());
            n.request.headers.set("Content-Type", "application/json");
            n
        };
        let without = {
            let mut n = node("POST", "https://api.example.com/things");
            n.request.headers.set("Content-Type", "application/json");
            n
        };

        let mut nodes = vec![with, without];
        let analysis = detect(&mut nodes);
        let group = &analysis.groups[0];
        assert_eq!(group.variants[0].differentiator, Differentiator::WithBody);
        assert_eq!(group.variants[1].differentiator, Differentiator::NoBody);
    }

    #[test]
    fn query_param_drift_differentiates() {
        let mut first = node("GET", "https://api.example.com/search");
        first.request.query_params.insert("q".to_string(), "one".to_string());
        let mut second = node("GET", "https://api.example.com/search");
        second.request.query_params.insert("q".to_string(), "two".to_string());

        let mut nodes = vec![first, second];
        let analysis = detect(&mut nodes);
        let group = &analysis.groups[0];
        assert_eq!(
            group.variants[0].differentiator,
            Differentiator::DifferentQueryParams
        );
    }

    #[test]
    fn identical_nodes_fall_back_to_variant() {
        let mut nodes = vec![
            node("GET", "https://api.example.com/same"),
            node("GET", "https://api.example.com/same"),
        ];
        let analysis = detect(&mut nodes);
        let group = &analysis.groups[0];
        assert_eq!(group.variants[0].differentiator, Differentiator::Variant);
        assert_eq!(group.variants[1].differentiator, Differentiator::Variant);
    }

    #[test]
    fn detection_is_deterministic() {
        let build = || {
            vec![
                node("GET", "https://api.example.com/a"),
                node("GET", "https://api.example.com/a"),
                node("POST", "https://api.example.com/b"),
            ]
        };
        let mut first = build();
        let mut second = build();
        assert_eq!(detect(&mut first), detect(&mut second));
    }

    #[test]
    fn skipped_nodes_are_excluded() {
        let executed = node("GET", "https://api.example.com/x");
        let mut skipped = node("GET", "https://api.example.com/x");
        skipped.response = None;
        skipped.skipped = true;

        let mut nodes = vec![executed, skipped];
        let analysis = detect(&mut nodes);
        assert!(analysis.groups.is_empty());
        assert_eq!(analysis.ungrouped, vec![0]);
    }
}
