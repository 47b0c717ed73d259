//! Postman collection (v2.1) decoding
//!
//! The `item` tree may recurse through folders; each leaf carries a
//! `request` object plus an optional `event` list holding pre-request and
//! test scripts.

use super::{
    apply_auth, form_urlencode, query_pairs_from_url, ApiKeyTarget, AuthSpec, ParsedCollection,
    FORM_CONTENT_TYPE,
};
use crate::error::{Error, Result};
use crate::model::{Headers, RequestRecord};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Postman collection structure
#[derive(Debug, Deserialize)]
struct PostmanCollection {
    info: CollectionInfo,
    item: Vec<CollectionItem>,
    #[serde(default)]
    variable: Vec<Variable>,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    name: String,
    description: Option<String>,
}

/// Collection item: a request leaf or a folder of further items
#[derive(Debug, Deserialize)]
struct CollectionItem {
    name: String,
    #[serde(default)]
    item: Vec<CollectionItem>,
    request: Option<PostmanRequest>,
    #[serde(default)]
    event: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct PostmanRequest {
    method: String,
    #[serde(default)]
    header: Vec<Header>,
    url: Option<UrlOrString>,
    #[serde(default)]
    body: Option<RequestBody>,
    auth: Option<Auth>,
}

/// URL as a plain string or a structured object with a `raw` field
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UrlOrString {
    String(String),
    Structured(StructuredUrl),
}

#[derive(Debug, Deserialize)]
struct StructuredUrl {
    raw: Option<String>,
    protocol: Option<String>,
    host: Option<Vec<String>>,
    path: Option<Vec<Value>>,
    #[serde(default)]
    query: Vec<QueryParam>,
}

#[derive(Debug, Deserialize)]
struct QueryParam {
    key: Option<String>,
    value: Option<String>,
    #[serde(default)]
    disabled: bool,
}

#[derive(Debug, Deserialize)]
struct Header {
    key: String,
    value: String,
    #[serde(default)]
    disabled: bool,
}

#[derive(Debug, Deserialize)]
struct RequestBody {
    mode: Option<String>,
    raw: Option<String>,
    urlencoded: Option<Vec<FormParam>>,
    formdata: Option<Vec<FormParam>>,
}

#[derive(Debug, Deserialize)]
struct FormParam {
    key: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    disabled: bool,
}

#[derive(Debug, Deserialize)]
struct Auth {
    #[serde(rename = "type")]
    auth_type: String,
    #[serde(flatten)]
    config: Value,
}

#[derive(Debug, Deserialize)]
struct Variable {
    key: String,
    value: Option<String>,
    #[serde(default)]
    disabled: bool,
}

/// Script attached to an item, keyed by `listen`
#[derive(Debug, Deserialize)]
struct Event {
    listen: String,
    script: Option<EventScript>,
}

#[derive(Debug, Deserialize)]
struct EventScript {
    #[serde(default)]
    exec: ScriptLines,
}

/// `script.exec` is usually an array of lines, occasionally a single string
#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
enum ScriptLines {
    #[default]
    Empty,
    One(String),
    Many(Vec<String>),
}

impl ScriptLines {
    fn join(&self) -> Option<String> {
        let joined = match self {
            Self::Empty => return None,
            Self::One(line) => line.clone(),
            Self::Many(lines) => lines.join("\n"),
        };
        if joined.trim().is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

/// Decode a Postman collection into request records.
pub fn parse(content: &str) -> Result<ParsedCollection> {
    let collection: PostmanCollection = serde_json::from_str(content)
        .map_err(|e| Error::parse("postman", e.to_string()))?;

    let mut seed_variables = IndexMap::new();
    for var in &collection.variable {
        if !var.disabled {
            if let Some(value) = &var.value {
                seed_variables.insert(var.key.clone(), value.clone());
            }
        }
    }

    let mut requests = Vec::new();
    let mut warnings = Vec::new();
    collect_items(&collection.item, &mut requests, &mut warnings);

    Ok(ParsedCollection {
        name: collection.info.name,
        description: collection.info.description,
        requests,
        seed_variables,
        warnings,
    })
}

/// Walk the item tree depth-first, in declared order.
fn collect_items(
    items: &[CollectionItem],
    requests: &mut Vec<RequestRecord>,
    warnings: &mut Vec<String>,
) {
    for item in items {
        if let Some(request) = &item.request {
            match convert_request(item, request) {
                Ok(record) => requests.push(record),
                Err(e) => warnings.push(format!("Skipping request '{}': {}", item.name, e)),
            }
        } else if !item.item.is_empty() {
            collect_items(&item.item, requests, warnings);
        }
    }
}

fn convert_request(item: &CollectionItem, request: &PostmanRequest) -> Result<RequestRecord> {
    let url = match &request.url {
        Some(UrlOrString::String(s)) => s.clone(),
        Some(UrlOrString::Structured(structured)) => build_url(structured),
        None => String::new(),
    };
    if url.is_empty() {
        return Err(Error::parse("postman", "request has no URL"));
    }

    let mut headers: Headers = request
        .header
        .iter()
        .filter(|h| !h.disabled && !h.key.is_empty())
        .map(|h| (h.key.clone(), h.value.clone()))
        .collect();

    let mut query_params = match &request.url {
        Some(UrlOrString::Structured(structured)) if !structured.query.is_empty() => structured
            .query
            .iter()
            .filter(|q| !q.disabled && q.key.is_some())
            .map(|q| {
                (
                    q.key.clone().unwrap_or_default(),
                    q.value.clone().unwrap_or_default(),
                )
            })
            .collect(),
        _ => query_pairs_from_url(&url),
    };

    let body = convert_body(request.body.as_ref(), &mut headers, &mut query_params);

    if let Some(auth) = &request.auth {
        apply_auth(convert_auth(auth), &mut headers, &mut query_params);
    }

    let mut pre_script = None;
    let mut post_script = None;
    for event in &item.event {
        let Some(source) = event.script.as_ref().and_then(|s| s.exec.join()) else {
            continue;
        };
        match event.listen.as_str() {
            "prerequest" => pre_script = Some(source),
            "test" => post_script = Some(source),
            _ => {}
        }
    }

    Ok(RequestRecord {
        id: String::new(),
        name: item.name.clone(),
        method: request.method.clone(),
        url,
        headers,
        body,
        query_params,
        pre_script,
        post_script,
    })
}

fn build_url(structured: &StructuredUrl) -> String {
    if let Some(raw) = &structured.raw {
        return raw.clone();
    }

    let mut url = String::new();
    if let Some(protocol) = &structured.protocol {
        url.push_str(protocol);
        url.push_str("://");
    }
    if let Some(host) = &structured.host {
        url.push_str(&host.join("."));
    }
    if let Some(path) = &structured.path {
        let segments: Vec<String> = path
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                Value::Object(obj) => obj
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                other => other.to_string(),
            })
            .collect();
        if !segments.is_empty() {
            url.push('/');
            url.push_str(&segments.join("/"));
        }
    }
    let query: Vec<String> = structured
        .query
        .iter()
        .filter(|q| !q.disabled && q.key.is_some())
        .map(|q| {
            format!(
                "{}={}",
                q.key.as_deref().unwrap_or_default(),
                q.value.as_deref().unwrap_or_default()
            )
        })
        .collect();
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.join("&"));
    }
    url
}

fn convert_body(
    body: Option<&RequestBody>,
    headers: &mut Headers,
    query_params: &mut IndexMap<String, String>,
) -> Option<String> {
    let body = body?;
    match body.mode.as_deref() {
        Some("raw") | None => body.raw.clone().filter(|raw| !raw.is_empty()),
        Some("urlencoded") => form_body(body.urlencoded.as_deref(), headers, query_params),
        Some("formdata") => form_body(body.formdata.as_deref(), headers, query_params),
        Some(_) => body.raw.clone().filter(|raw| !raw.is_empty()),
    }
}

fn form_body(
    params: Option<&[FormParam]>,
    headers: &mut Headers,
    query_params: &mut IndexMap<String, String>,
) -> Option<String> {
    let params = params?;
    let enabled: Vec<(&str, &str)> = params
        .iter()
        .filter(|p| !p.disabled && !p.key.is_empty())
        .map(|p| (p.key.as_str(), p.value.as_str()))
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

fn convert_auth(auth: &Auth) -> AuthSpec {
    match auth.auth_type.as_str() {
        "bearer" => AuthSpec::Bearer(
            auth_param(&auth.config, "bearer", "token").unwrap_or_default(),
        ),
        "basic" => AuthSpec::Basic {
            username: auth_param(&auth.config, "basic", "username").unwrap_or_default(),
            password: auth_param(&auth.config, "basic", "password").unwrap_or_default(),
        },
        "apikey" => {
            let target = auth_param(&auth.config, "apikey", "in")
                .or_else(|| auth_param(&auth.config, "apikey", "addTo"))
                .unwrap_or_else(|| "header".to_string());
            AuthSpec::ApiKey {
                key: auth_param(&auth.config, "apikey", "key")
                    .unwrap_or_else(|| "X-Api-Key".to_string()),
                value: auth_param(&auth.config, "apikey", "value").unwrap_or_default(),
                add_to: ApiKeyTarget::from_tag(&target),
            }
        }
        "oauth2" => AuthSpec::OAuth2 {
            access_token: auth_param(&auth.config, "oauth2", "accessToken"),
        },
        other => AuthSpec::Other(other.to_string()),
    }
}

/// Pull a parameter out of a Postman auth block.
///
/// v2.1 stores them as `[{key, value}]` arrays; some exporters emit a plain
/// object instead, so both shapes are accepted.
fn auth_param(config: &Value, section: &str, key: &str) -> Option<String> {
    let section = config.get(section)?;
    match section {
        Value::Array(entries) => entries.iter().find_map(|entry| {
            (entry.get("key").and_then(Value::as_str) == Some(key))
                .then(|| entry.get("value"))
                .flatten()
                .map(value_to_string)
        }),
        Value::Object(map) => map.get(key).map(value_to_string),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
