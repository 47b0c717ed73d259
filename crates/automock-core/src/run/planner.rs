//! Execution planning
//!
//! Turns the parsed request list into execution nodes in collection order
//! (no dependency inference) and annotates each with the variable names it
//! references and the names its pre-script assigns.

use crate::model::{ExecutionNode, RequestRecord};
use crate::templating::referenced_variables;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static SET_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"pm\.(?:environment|globals|collectionVariables|variables)\.set\(\s*['"]([A-Za-z_][A-Za-z0-9_]*)['"]"#,
    )
    .expect("valid regex")
});
static ASSIGN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:let\s+|const\s+|var\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*=([^=]|$)")
        .expect("valid regex")
});

/// Produce execution nodes for the requests, in input order.
pub fn plan(requests: Vec<RequestRecord>) -> Vec<ExecutionNode> {
    requests
        .into_iter()
        .map(|request| {
            let mut node = ExecutionNode::new(request);
            node.referenced = collect_references(&node.request);
            node.pre_assigned = scan_assignments(node.request.pre_script.as_deref());
            node
        })
        .collect()
}

/// Variable names referenced by the URL, header values, body and
/// query-parameter values. Pseudo-variables are already excluded by the
/// templating scan.
fn collect_references(request: &RequestRecord) -> BTreeSet<String> {
    let mut names = referenced_variables(&request.url);
    for (_, value) in request.headers.iter() {
        names.extend(referenced_variables(value));
    }
    if let Some(body) = &request.body {
        names.extend(referenced_variables(body));
    }
    for value in request.query_params.values() {
        names.extend(referenced_variables(value));
    }
    names
}

/// Names a pre-script assigns, via `pm.*.set("name", ...)` calls or bare
/// `name = ...` statements.
fn scan_assignments(script: Option<&str>) -> BTreeSet<String> {
    let Some(script) = script else {
        return BTreeSet::new();
    };
    let mut names = BTreeSet::new();
    for caps in SET_CALL_RE.captures_iter(script) {
        names.insert(caps[1].to_string());
    }
    for caps in ASSIGN_RE.captures_iter(script) {
        names.insert(caps[1].to_string());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Headers;
    use indexmap::IndexMap;

    fn record(url: &str) -> RequestRecord {
        RequestRecord {
            id: "r1".to_string(),
            name: "Request".to_string(),
            method: "GET".to_string(),
            url: url.to_string(),
            headers: Headers::new(),
            body: None,
            query_params: IndexMap::new(),
            pre_script: None,
            post_script: None,
        }
    }

    #[test]
    fn collects_references_from_every_surface() {
        let mut request = record("{{baseUrl}}/users/${userId}");
        request.headers.set("Authorization", "Bearer {{token}}");
        request.body = Some(r#"{"group": "{{group}}"}"#.to_string());
        request
            .query_params
            .insert("env".to_string(), "{{environment}}".to_string());

        let nodes = plan(vec![request]);
        let expected: BTreeSet<String> = ["baseUrl", "userId", "token", "group", "environment"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(nodes[0].referenced, expected);
    }

    #[test]
    fn pseudo_variables_are_not_needed() {
        let request = record("https://api.example.com/items?id={{uuid}}&at={{$timestamp}}");
        let nodes = plan(vec![request]);
        assert!(nodes[0].referenced.is_empty());
    }

    #[test]
    fn scans_pre_script_assignments() {
        let mut request = record("https://api.example.com/items");
        request.pre_script = Some(
            r#"
            const attempt = 1;
            retries = attempt + 2;
            pm.environment.set("session", "s-1");
            if (attempt == 3) { console.log("nope"); }
            "#
            .to_string(),
        );

        let nodes = plan(vec![request]);
        let expected: BTreeSet<String> = ["attempt", "retries", "session"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(nodes[0].pre_assigned, expected);
    }

    #[test]
    fn keeps_collection_order() {
        let nodes = plan(vec![record("/a"), record("/b"), record("/c")]);
        let urls: Vec<_> = nodes.iter().map(|n| n.request.url.as_str()).collect();
        assert_eq!(urls, vec!["/a", "/b", "/c"]);
    }
}
