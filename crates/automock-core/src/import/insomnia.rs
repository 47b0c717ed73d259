//! Insomnia export decoding
//!
//! The export is a flat `resources` array. A first sweep collects
//! environment variables; a second decodes `request`, `grpc_request` and
//! `graphql_request` resources, resolving `{{ _.name }}` template tags and
//! bare `_.name` references from the collected environment.

use super::{apply_auth, form_urlencode, query_pairs_from_url, ApiKeyTarget, AuthSpec, ParsedCollection, FORM_CONTENT_TYPE};
use crate::error::{Error, Result};
use crate::model::{Headers, RequestRecord};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

static TEMPLATE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*_\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex"));
static BARE_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\w$.])_\.([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct InsomniaExport {
    #[serde(rename = "__export_format")]
    export_format: Option<i64>,
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(rename = "_type")]
    resource_type: String,
    name: Option<String>,
    url: Option<String>,
    method: Option<String>,
    #[serde(default)]
    headers: Vec<ResourceHeader>,
    body: Option<ResourceBody>,
    authentication: Option<ResourceAuth>,
    #[serde(default)]
    parameters: Vec<ResourceParameter>,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResourceHeader {
    name: String,
    #[serde(default)]
    value: String,
    disabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ResourceBody {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    text: Option<String>,
    params: Option<Vec<ResourceParameter>>,
}

#[derive(Debug, Deserialize)]
struct ResourceParameter {
    name: String,
    #[serde(default)]
    value: String,
    disabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ResourceAuth {
    #[serde(rename = "type")]
    auth_type: Option<String>,
    disabled: Option<bool>,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    key: Option<String>,
    value: Option<String>,
    #[serde(rename = "addTo")]
    add_to: Option<String>,
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

/// Decode an Insomnia export into request records.
pub fn parse(content: &str) -> Result<ParsedCollection> {
    let export: InsomniaExport =
        serde_json::from_str(content).map_err(|e| Error::parse("insomnia", e.to_string()))?;

    if let Some(format) = export.export_format {
        if format < 3 {
            return Err(Error::parse(
                "insomnia",
                format!("export format {format} is too old, version 3 or higher is required"),
            ));
        }
    }

    // First sweep: environment variables, in resource order so sub
    // environments override the base.
    let mut environment = IndexMap::new();
    for resource in &export.resources {
        if resource.resource_type != "environment" {
            continue;
        }
        if let Some(Value::Object(data)) = &resource.data {
            for (key, value) in data {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                environment.insert(key.clone(), rendered);
            }
        }
    }

    // Second sweep: requests.
    let mut requests = Vec::new();
    let mut warnings = Vec::new();
    for resource in &export.resources {
        let converted = match resource.resource_type.as_str() {
            "request" => convert_request(resource, &environment),
            "grpc_request" => convert_grpc(resource, &environment),
            "graphql_request" => convert_graphql(resource, &environment),
            _ => continue,
        };
        let name = resource.name.clone().unwrap_or_else(|| "unnamed".to_string());
        match converted {
            Ok(record) => requests.push(record),
            Err(e) => warnings.push(format!("Skipping request '{name}': {e}")),
        }
    }

    Ok(ParsedCollection {
        name: "insomnia export".to_string(),
        description: None,
        requests,
        seed_variables: environment,
        warnings,
    })
}

/// Resolve `{{ _.name }}` tags and bare `_.name` references from the
/// environment; unknown names are left untouched for run-time resolution.
fn resolve_env(input: &str, environment: &IndexMap<String, String>) -> String {
    let tagged = TEMPLATE_TAG_RE.replace_all(input, |caps: &regex::Captures| {
        match environment.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        }
    });
    BARE_REF_RE
        .replace_all(&tagged, |caps: &regex::Captures| {
            match environment.get(&caps[2]) {
                Some(value) => format!("{}{}", &caps[1], value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn base_record(
    resource: &Resource,
    environment: &IndexMap<String, String>,
) -> Result<(RequestRecord, IndexMap<String, String>)> {
    let raw_url = resource
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::parse("insomnia", "request has no URL"))?;
    let url = resolve_env(raw_url, environment);

    let mut headers = Headers::new();
    for header in &resource.headers {
        if header.disabled.unwrap_or(false) || header.name.is_empty() {
            continue;
        }
        headers.set(header.name.clone(), resolve_env(&header.value, environment));
    }

    let mut query_params = query_pairs_from_url(&url);
    for parameter in &resource.parameters {
        if parameter.disabled.unwrap_or(false) || parameter.name.is_empty() {
            continue;
        }
        query_params.insert(
            parameter.name.clone(),
            resolve_env(&parameter.value, environment),
        );
    }

    let record = RequestRecord {
        id: String::new(),
        name: resource.name.clone().unwrap_or_else(|| "unnamed".to_string()),
        method: resource.method.clone().unwrap_or_default(),
        url,
        headers,
        body: None,
        query_params: IndexMap::new(),
        pre_script: None,
        post_script: None,
    };
    Ok((record, query_params))
}

fn convert_request(
    resource: &Resource,
    environment: &IndexMap<String, String>,
) -> Result<RequestRecord> {
    let (mut record, mut query_params) = base_record(resource, environment)?;
    if record.method.is_empty() {
        return Err(Error::parse("insomnia", "request has no method"));
    }

    if let Some(body) = &resource.body {
        record.body = convert_body(body, environment, &mut record.headers, &mut query_params);
    }

    if let Some(auth) = &resource.authentication {
        if !auth.disabled.unwrap_or(false) {
            if let Some(spec) = convert_auth(auth, environment) {
                apply_auth(spec, &mut record.headers, &mut query_params);
            }
        }
    }

    record.query_params = query_params;
    Ok(record)
}

/// gRPC requests are represented as POST with the gRPC content type so the
/// emitted expectation still matches something observable on the wire.
fn convert_grpc(
    resource: &Resource,
    environment: &IndexMap<String, String>,
) -> Result<RequestRecord> {
    let (mut record, query_params) = base_record(resource, environment)?;
    record.method = "POST".to_string();
    record.headers.set("Content-Type", "application/grpc+proto");
    if let Some(body) = &resource.body {
        record.body = body
            .text
            .as_ref()
            .map(|text| resolve_env(text, environment))
            .filter(|text| !text.is_empty());
    }
    record.query_params = query_params;
    Ok(record)
}

/// GraphQL requests become POSTs carrying the canonical
/// `{query, variables}` envelope.
fn convert_graphql(
    resource: &Resource,
    environment: &IndexMap<String, String>,
) -> Result<RequestRecord> {
    let url = resource
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .map(|u| resolve_env(u, environment))
        .unwrap_or_else(|| "/graphql".to_string());

    let mut headers = Headers::new();
    for header in &resource.headers {
        if header.disabled.unwrap_or(false) || header.name.is_empty() {
            continue;
        }
        headers.set(header.name.clone(), resolve_env(&header.value, environment));
    }
    if !headers.contains("Content-Type") {
        headers.set("Content-Type", "application/json");
    }

    let text = resource
        .body
        .as_ref()
        .and_then(|b| b.text.as_ref())
        .map(|t| resolve_env(t, environment))
        .unwrap_or_default();
    let envelope = match serde_json::from_str::<Value>(&text) {
        Ok(parsed) => json!({
            "query": parsed.get("query").cloned().unwrap_or_else(|| json!("")),
            "variables": parsed.get("variables").cloned().unwrap_or_else(|| json!({})),
        }),
        Err(_) => json!({"query": text, "variables": {}}),
    };

    Ok(RequestRecord {
        id: String::new(),
        name: resource.name.clone().unwrap_or_else(|| "unnamed".to_string()),
        method: "POST".to_string(),
        url,
        headers,
        body: Some(envelope.to_string()),
        query_params: IndexMap::new(),
        pre_script: None,
        post_script: None,
    })
}

fn convert_body(
    body: &ResourceBody,
    environment: &IndexMap<String, String>,
    headers: &mut Headers,
    query_params: &mut IndexMap<String, String>,
) -> Option<String> {
    let is_form = body
        .mime_type
        .as_deref()
        .is_some_and(|m| m.contains("form-urlencoded") || m.contains("form-data"));
    if is_form || body.params.is_some() {
        let params = body.params.as_deref().unwrap_or(&[]);
        let enabled: Vec<(String, String)> = params
            .iter()
            .filter(|p| !p.disabled.unwrap_or(false) && !p.name.is_empty())
            .map(|p| (p.name.clone(), resolve_env(&p.value, environment)))
            .collect();
        if enabled.is_empty() {
            return None;
        }
        for (key, value) in &enabled {
            query_params.insert(key.clone(), value.clone());
        }
        if !headers.contains("Content-Type") {
            headers.set("Content-Type", FORM_CONTENT_TYPE);
        }
        return Some(form_urlencode(
            enabled.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ));
    }
    body.text
        .as_ref()
        .map(|text| resolve_env(text, environment))
        .filter(|text| !text.is_empty())
}

fn convert_auth(
    auth: &ResourceAuth,
    environment: &IndexMap<String, String>,
) -> Option<AuthSpec> {
    let resolve = |value: &Option<String>| -> String {
        value
            .as_ref()
            .map(|v| resolve_env(v, environment))
            .unwrap_or_default()
    };
    match auth.auth_type.as_deref() {
        None | Some("none") => None,
        Some("bearer") => Some(AuthSpec::Bearer(resolve(&auth.token))),
        Some("basic") => Some(AuthSpec::Basic {
            username: resolve(&auth.username),
            password: resolve(&auth.password),
        }),
        Some("apikey") => Some(AuthSpec::ApiKey {
            key: resolve(&auth.key),
            value: resolve(&auth.value),
            add_to: ApiKeyTarget::from_tag(auth.add_to.as_deref().unwrap_or("header")),
        }),
        Some("oauth2") => Some(AuthSpec::OAuth2 {
            access_token: auth
                .access_token
                .as_ref()
                .map(|t| resolve_env(t, environment))
                .filter(|t| !t.is_empty()),
        }),
        Some(other) => Some(AuthSpec::Other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_environment_tags() {
        let content = r#"{
            "__export_format": 4,
            "_type": "export",
            "resources": [
                {
                    "_id": "env_1",
                    "_type": "environment",
                    "name": "Base Environment",
                    "data": {"baseUrl": "https://api.example.com", "token": "t-1", "retries": 3}
                },
                {
                    "_id": "req_1",
                    "_type": "request",
                    "name": "Get Users",
                    "method": "GET",
                    "url": "{{ _.baseUrl }}/users",
                    "headers": [
                        {"name": "Authorization", "value": "Bearer _.token"},
                        {"name": "X-Off", "value": "1", "disabled": true}
                    ]
                }
            ]
        }"#;

        let collection = parse(content).expect("export parses");
        assert_eq!(collection.requests.len(), 1);
        let request = &collection.requests[0];
        assert_eq!(request.url, "https://api.example.com/users");
        assert_eq!(request.headers.get("Authorization"), Some("Bearer t-1"));
        assert!(!request.headers.contains("X-Off"));
        assert_eq!(collection.seed_variables.get("retries"), Some(&"3".to_string()));
    }

    #[test]
    fn rejects_old_export_format() {
        let content = r#"{"__export_format": 2, "resources": []}"#;
        let err = parse(content).expect_err("format 2 is rejected");
        assert!(err.to_string().contains("version 3 or higher"));
    }

    #[test]
    fn grpc_requests_become_posts() {
        let content = r#"{
            "__export_format": 4,
            "resources": [
                {
                    "_id": "grpc_1",
                    "_type": "grpc_request",
                    "name": "SayHello",
                    "url": "grpcb.in:9000/hello.HelloService/SayHello",
                    "body": {"text": "{\"greeting\": \"hi\"}"}
                }
            ]
        }"#;

        let collection = parse(content).expect("export parses");
        let request = &collection.requests[0];
        assert_eq!(request.method, "POST");
        assert_eq!(
            request.headers.get("Content-Type"),
            Some("application/grpc+proto")
        );
        assert_eq!(request.body.as_deref(), Some("{\"greeting\": \"hi\"}"));
    }

    #[test]
    fn graphql_requests_build_canonical_envelope() {
        let content = r#"{
            "__export_format": 4,
            "resources": [
                {
                    "_id": "gql_1",
                    "_type": "graphql_request",
                    "name": "Viewer",
                    "url": "https://api.example.com/graphql",
                    "body": {"text": "{\"query\": \"query Viewer { viewer { id } }\", \"variables\": {\"first\": 1}, \"operationName\": \"Viewer\"}"}
                }
            ]
        }"#;

        let collection = parse(content).expect("export parses");
        let request = &collection.requests[0];
        assert_eq!(request.method, "POST");
        let envelope: Value =
            serde_json::from_str(request.body.as_deref().expect("body")).expect("JSON envelope");
        assert_eq!(envelope["variables"]["first"], serde_json::json!(1));
        assert!(envelope.get("operationName").is_none());
    }

    #[test]
    fn form_body_serialises_with_content_type() {
        let content = r#"{
            "__export_format": 4,
            "resources": [
                {
                    "_id": "req_1",
                    "_type": "request",
                    "name": "Submit",
                    "method": "POST",
                    "url": "https://api.example.com/submit",
                    "body": {
                        "mimeType": "application/x-www-form-urlencoded",
                        "params": [
                            {"name": "a", "value": "1"},
                            {"name": "off", "value": "x", "disabled": true}
                        ]
                    }
                }
            ]
        }"#;

        let collection = parse(content).expect("export parses");
        let request = &collection.requests[0];
        assert_eq!(request.body.as_deref(), Some("a=1"));
        assert_eq!(
            request.headers.get("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.query_params.get("a"), Some(&"1".to_string()));
    }

    #[test]
    fn basic_auth_resolves_environment_references() {
        let content = r#"{
            "__export_format": 4,
            "resources": [
                {
                    "_id": "env_1",
                    "_type": "environment",
                    "name": "Base Environment",
                    "data": {"user": "alice", "pass": "secret"}
                },
                {
                    "_id": "req_1",
                    "_type": "request",
                    "name": "Login",
                    "method": "GET",
                    "url": "https://api.example.com/private",
                    "authentication": {"type": "basic", "username": "{{ _.user }}", "password": "{{ _.pass }}"}
                }
            ]
        }"#;

        let collection = parse(content).expect("export parses");
        let auth = collection.requests[0]
            .headers
            .get("Authorization")
            .expect("auth header");
        assert!(auth.starts_with("Basic "));
        use base64::{engine::general_purpose, Engine as _};
        let decoded = general_purpose::STANDARD
            .decode(auth.trim_start_matches("Basic "))
            .expect("valid base64");
        assert_eq!(decoded, b"alice:secret");
    }
}
