//! Bruno collection decoding
//!
//! Two input shapes: structured `.bru` plain text (top-level blocks, each
//! request starting at `meta {`) and the JSON export with an `items` tree.
//! Lines prefixed with `~` inside key/value blocks are disabled entries.

use super::{
    apply_auth, form_urlencode, query_pairs_from_url, ApiKeyTarget, AuthSpec, ParsedCollection,
    FORM_CONTENT_TYPE,
};
use crate::error::{Error, Result};
use crate::model::{Headers, RequestRecord};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value};

const METHODS: &[&str] = &[
    "get", "post", "put", "delete", "patch", "head", "options", "trace", "connect",
];

/// Decode Bruno content, dispatching on shape.
pub fn parse(content: &str) -> Result<ParsedCollection> {
    if content.trim_start().starts_with('{') {
        parse_export(content)
    } else {
        parse_bru(content)
    }
}

// ---------------------------------------------------------------------------
// Structured .bru text
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Block {
    tag: String,
    content: String,
}

/// Scan top-level `tag { ... }` blocks, tracking brace depth so JSON bodies
/// and script blocks survive intact.
fn scan_blocks(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut lines = content.lines();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        let Some(tag) = trimmed.strip_suffix('{') else {
            continue;
        };
        let tag = tag.trim().to_string();
        if tag.is_empty() || tag.contains(' ') {
            continue;
        }
        let mut depth = 1i32;
        let mut body = String::new();
        for inner in lines.by_ref() {
            let opens = inner.matches('{').count() as i32;
            let closes = inner.matches('}').count() as i32;
            if depth + opens - closes <= 0 {
                break;
            }
            depth += opens - closes;
            body.push_str(inner);
            body.push('\n');
        }
        blocks.push(Block {
            tag,
            content: body,
        });
    }
    blocks
}

/// Parse `key: value` lines; `~`-prefixed lines are disabled and skipped.
fn parse_pairs(content: &str) -> IndexMap<String, String> {
    let mut pairs = IndexMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('~') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            pairs.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    pairs
}

#[derive(Default)]
struct BruRequest {
    name: String,
    method: String,
    url: String,
    headers: Headers,
    query_params: IndexMap<String, String>,
    body: Option<String>,
    graphql_query: Option<String>,
    graphql_vars: Option<String>,
    auth: Option<AuthSpec>,
    pre_script: Option<String>,
    post_script: Option<String>,
}

impl BruRequest {
    fn is_empty(&self) -> bool {
        self.name.is_empty() && self.method.is_empty() && self.url.is_empty()
    }

    fn finish(mut self) -> RequestRecord {
        if let Some(query) = self.graphql_query.take() {
            let variables = self
                .graphql_vars
                .take()
                .and_then(|v| serde_json::from_str::<Value>(&v).ok())
                .unwrap_or_else(|| json!({}));
            let envelope = json!({"query": query.trim(), "variables": variables});
            self.body = Some(envelope.to_string());
        }
        if let Some(auth) = self.auth.take() {
            apply_auth(auth, &mut self.headers, &mut self.query_params);
        }
        RequestRecord {
            id: String::new(),
            name: self.name,
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            query_params: self.query_params,
            pre_script: self.pre_script,
            post_script: self.post_script,
        }
    }
}

fn parse_bru(content: &str) -> Result<ParsedCollection> {
    let blocks = scan_blocks(content);
    if blocks.is_empty() {
        return Err(Error::parse("bruno", "no blocks found in .bru input"));
    }

    let mut requests = Vec::new();
    let mut warnings = Vec::new();
    let mut current = BruRequest::default();

    for block in blocks {
        if block.tag == "meta" && !current.is_empty() {
            requests.push(current.finish());
            current = BruRequest::default();
        }
        apply_block(&mut current, &block, &mut warnings);
    }
    if !current.is_empty() {
        requests.push(current.finish());
    }

    Ok(ParsedCollection {
        name: requests
            .first()
            .map(|r| r.name.clone())
            .unwrap_or_else(|| "bruno collection".to_string()),
        description: None,
        requests,
        seed_variables: IndexMap::new(),
        warnings,
    })
}

fn apply_block(request: &mut BruRequest, block: &Block, warnings: &mut Vec<String>) {
    let tag = block.tag.as_str();
    match tag {
        "meta" => {
            let pairs = parse_pairs(&block.content);
            if let Some(name) = pairs.get("name") {
                request.name = name.clone();
            }
        }
        _ if METHODS.contains(&tag) => {
            request.method = tag.to_ascii_uppercase();
            let pairs = parse_pairs(&block.content);
            if let Some(url) = pairs.get("url") {
                request.url = url.clone();
                for (key, value) in query_pairs_from_url(url) {
                    request.query_params.entry(key).or_insert(value);
                }
            }
        }
        "query" => {
            for (key, value) in parse_pairs(&block.content) {
                request.query_params.insert(key, value);
            }
        }
        "headers" => {
            for (key, value) in parse_pairs(&block.content) {
                request.headers.set(key, value);
            }
        }
        "body" | "body:json" | "body:text" | "body:xml" | "body:sparql" => {
            let raw = block.content.trim();
            if !raw.is_empty() {
                request.body = Some(raw.to_string());
            }
        }
        "body:form-urlencoded" | "body:multipart-form" => {
            let pairs = parse_pairs(&block.content);
            if !pairs.is_empty() {
                request.body = Some(form_urlencode(
                    pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                ));
                for (key, value) in pairs {
                    request.query_params.insert(key, value);
                }
                if !request.headers.contains("Content-Type") {
                    request.headers.set("Content-Type", FORM_CONTENT_TYPE);
                }
            }
        }
        "body:graphql" => {
            request.graphql_query = Some(block.content.clone());
        }
        "body:graphql:vars" => {
            request.graphql_vars = Some(block.content.clone());
        }
        "script:pre-request" => {
            request.pre_script = Some(block.content.trim().to_string());
        }
        "script:post-response" | "tests" => {
            let source = block.content.trim().to_string();
            match &mut request.post_script {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(&source);
                }
                None => request.post_script = Some(source),
            }
        }
        "docs" => {}
        _ if tag.starts_with("auth:") => {
            request.auth = Some(parse_bru_auth(tag, &block.content));
        }
        other => {
            warnings.push(format!("Ignoring unrecognised .bru block '{other}'"));
        }
    }
}

fn parse_bru_auth(tag: &str, content: &str) -> AuthSpec {
    let pairs = parse_pairs(content);
    let get = |key: &str| pairs.get(key).cloned().unwrap_or_default();
    match tag {
        "auth:bearer" => AuthSpec::Bearer(get("token")),
        "auth:basic" => AuthSpec::Basic {
            username: get("username"),
            password: get("password"),
        },
        "auth:apikey" => {
            let target = pairs
                .get("placement")
                .or_else(|| pairs.get("addTo"))
                .cloned()
                .unwrap_or_else(|| "header".to_string());
            AuthSpec::ApiKey {
                key: get("key"),
                value: get("value"),
                add_to: ApiKeyTarget::from_tag(&target),
            }
        }
        "auth:oauth2" => AuthSpec::OAuth2 {
            access_token: pairs
                .get("access_token")
                .or_else(|| pairs.get("accessToken"))
                .cloned(),
        },
        other => AuthSpec::Other(other.trim_start_matches("auth:").to_string()),
    }
}

// ---------------------------------------------------------------------------
// JSON export
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BrunoExport {
    name: Option<String>,
    #[serde(default)]
    items: Vec<ExportItem>,
}

#[derive(Debug, Deserialize)]
struct ExportItem {
    name: Option<String>,
    #[serde(default)]
    items: Vec<ExportItem>,
    request: Option<ExportRequest>,
}

#[derive(Debug, Deserialize)]
struct ExportRequest {
    method: Option<String>,
    url: Option<String>,
    #[serde(default)]
    headers: Vec<ExportPair>,
    #[serde(default)]
    params: Vec<ExportPair>,
    body: Option<ExportBody>,
    auth: Option<ExportAuth>,
    script: Option<ExportScript>,
}

#[derive(Debug, Deserialize)]
struct ExportPair {
    name: String,
    #[serde(default)]
    value: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ExportBody {
    mode: Option<String>,
    json: Option<Value>,
    text: Option<String>,
    xml: Option<String>,
    #[serde(default, rename = "formUrlEncoded")]
    form_url_encoded: Vec<ExportPair>,
    #[serde(default, rename = "multipartForm")]
    multipart_form: Vec<ExportPair>,
    graphql: Option<ExportGraphql>,
}

#[derive(Debug, Deserialize)]
struct ExportGraphql {
    query: Option<String>,
    variables: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ExportAuth {
    mode: Option<String>,
    bearer: Option<Value>,
    basic: Option<Value>,
    apikey: Option<Value>,
    oauth2: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ExportScript {
    req: Option<String>,
    res: Option<String>,
}

fn parse_export(content: &str) -> Result<ParsedCollection> {
    let export: BrunoExport =
        serde_json::from_str(content).map_err(|e| Error::parse("bruno", e.to_string()))?;

    let mut requests = Vec::new();
    let mut warnings = Vec::new();
    collect_export_items(&export.items, &mut requests, &mut warnings);

    Ok(ParsedCollection {
        name: export.name.unwrap_or_else(|| "bruno collection".to_string()),
        description: None,
        requests,
        seed_variables: IndexMap::new(),
        warnings,
    })
}

fn collect_export_items(
    items: &[ExportItem],
    requests: &mut Vec<RequestRecord>,
    warnings: &mut Vec<String>,
) {
    for item in items {
        if let Some(request) = &item.request {
            let name = item.name.clone().unwrap_or_else(|| "unnamed".to_string());
            match convert_export_request(&name, request) {
                Ok(record) => requests.push(record),
                Err(e) => warnings.push(format!("Skipping request '{name}': {e}")),
            }
        } else if !item.items.is_empty() {
            collect_export_items(&item.items, requests, warnings);
        }
    }
}

fn convert_export_request(name: &str, request: &ExportRequest) -> Result<RequestRecord> {
    let url = request
        .url
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::parse("bruno", "request has no URL"))?;

    let mut headers: Headers = request
        .headers
        .iter()
        .filter(|h| h.enabled && !h.name.is_empty())
        .map(|h| (h.name.clone(), h.value.clone()))
        .collect();

    let mut query_params: IndexMap<String, String> = query_pairs_from_url(&url);
    for param in request.params.iter().filter(|p| p.enabled && !p.name.is_empty()) {
        query_params.insert(param.name.clone(), param.value.clone());
    }

    let body = request
        .body
        .as_ref()
        .and_then(|body| convert_export_body(body, &mut headers, &mut query_params));

    if let Some(auth) = &request.auth {
        if let Some(spec) = convert_export_auth(auth) {
            apply_auth(spec, &mut headers, &mut query_params);
        }
    }

    let (pre_script, post_script) = match &request.script {
        Some(script) => (
            script.req.clone().filter(|s| !s.trim().is_empty()),
            script.res.clone().filter(|s| !s.trim().is_empty()),
        ),
        None => (None, None),
    };

    Ok(RequestRecord {
        id: String::new(),
        name: name.to_string(),
        method: request.method.clone().unwrap_or_default(),
        url,
        headers,
        body,
        query_params,
        pre_script,
        post_script,
    })
}

fn convert_export_body(
    body: &ExportBody,
    headers: &mut Headers,
    query_params: &mut IndexMap<String, String>,
) -> Option<String> {
    match body.mode.as_deref() {
        Some("json") => body.json.as_ref().map(|json| match json {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        Some("text") => body.text.clone(),
        Some("xml") => body.xml.clone(),
        Some("formUrlEncoded") => {
            form_pairs_body(&body.form_url_encoded, headers, query_params)
        }
        Some("multipartForm") => form_pairs_body(&body.multipart_form, headers, query_params),
        Some("graphql") => {
            let graphql = body.graphql.as_ref()?;
            let query = graphql.query.clone().unwrap_or_default();
            let variables = match &graphql.variables {
                Some(Value::String(s)) => {
                    serde_json::from_str(s).unwrap_or_else(|_| json!({}))
                }
                Some(other) => other.clone(),
                None => json!({}),
            };
            Some(json!({"query": query, "variables": variables}).to_string())
        }
        _ => body.text.clone(),
    }
}

fn form_pairs_body(
    pairs: &[ExportPair],
    headers: &mut Headers,
    query_params: &mut IndexMap<String, String>,
) -> Option<String> {
    let enabled: Vec<(&str, &str)> = pairs
        .iter()
        .filter(|p| p.enabled && !p.name.is_empty())
        .map(|p| (p.name.as_str(), p.value.as_str()))
        .collect();
    if enabled.is_empty() {
        return None;
    }
    for (key, value) in &enabled {
        query_params.insert((*key).to_string(), (*value).to_string());
    }
    if !headers.contains("Content-Type") {
        headers.set("Content-Type", FORM_CONTENT_TYPE);
    }
    Some(form_urlencode(enabled))
}

fn convert_export_auth(auth: &ExportAuth) -> Option<AuthSpec> {
    let str_field = |section: &Option<Value>, key: &str| -> Option<String> {
        section
            .as_ref()?
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    match auth.mode.as_deref() {
        Some("none") | None => None,
        Some("bearer") => Some(AuthSpec::Bearer(
            str_field(&auth.bearer, "token").unwrap_or_default(),
        )),
        Some("basic") => Some(AuthSpec::Basic {
            username: str_field(&auth.basic, "username").unwrap_or_default(),
            password: str_field(&auth.basic, "password").unwrap_or_default(),
        }),
        Some("apikey") => {
            let target = str_field(&auth.apikey, "placement")
                .or_else(|| str_field(&auth.apikey, "addTo"))
                .unwrap_or_else(|| "header".to_string());
            Some(AuthSpec::ApiKey {
                key: str_field(&auth.apikey, "key").unwrap_or_default(),
                value: str_field(&auth.apikey, "value").unwrap_or_default(),
                add_to: ApiKeyTarget::from_tag(&target),
            })
        }
        Some("oauth2") => Some(AuthSpec::OAuth2 {
            access_token: str_field(&auth.oauth2, "accessToken")
                .or_else(|| str_field(&auth.oauth2, "access_token")),
        }),
        Some(other) => Some(AuthSpec::Other(other.to_string())),
    }
}
