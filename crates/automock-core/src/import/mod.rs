//! Collection import: dialect detection and decoding
//!
//! Each supported dialect decodes into the same ordered [`RequestRecord`]
//! list; scripts are normalised to the canonical `pm.*` surface on the way
//! out so the rest of the pipeline sees a single script API.

pub mod bruno;
pub mod environment;
pub mod insomnia;
pub mod postman;

use crate::error::{Error, Result};
use crate::model::{Headers, RequestRecord};
use crate::script::normalize::normalize_script;
use indexmap::IndexMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Supported collection dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Postman collection v2.1 (JSON)
    Postman,
    /// Bruno collection (`.bru` text or JSON export)
    Bruno,
    /// Insomnia export (JSON)
    Insomnia,
}

impl Dialect {
    /// Lower-case tag used in ids and settings
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Postman => "postman",
            Self::Bruno => "bruno",
            Self::Insomnia => "insomnia",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postman" => Ok(Self::Postman),
            "bruno" => Ok(Self::Bruno),
            "insomnia" => Ok(Self::Insomnia),
            other => Err(Error::UnsupportedDialect(other.to_string())),
        }
    }
}

/// Result of decoding one collection file
#[derive(Debug)]
pub struct ParsedCollection {
    /// Collection name, when the format carries one
    pub name: String,
    /// Collection description, when present
    pub description: Option<String>,
    /// Ordered request records, in declared collection order
    pub requests: Vec<RequestRecord>,
    /// Collection- or environment-level variables seeding the run scope
    pub seed_variables: IndexMap<String, String>,
    /// Non-fatal problems encountered while decoding
    pub warnings: Vec<String>,
}

/// Parse collection bytes for a declared dialect.
///
/// Records come back in collection order with stable ids assigned, scripts
/// already normalised to the canonical surface. Invalid records (empty
/// method or URL) are dropped with a warning rather than aborting the
/// whole import.
pub fn parse_collection(content: &str, dialect: Dialect) -> Result<ParsedCollection> {
    let mut collection = match dialect {
        Dialect::Postman => postman::parse(content)?,
        Dialect::Bruno => bruno::parse(content)?,
        Dialect::Insomnia => insomnia::parse(content)?,
    };

    if collection.requests.is_empty() {
        return Err(Error::parse(dialect.tag(), "collection contains no requests"));
    }

    let mut requests = Vec::with_capacity(collection.requests.len());
    for (index, mut record) in collection.requests.drain(..).enumerate() {
        if !record.is_valid() {
            collection.warnings.push(format!(
                "Skipping request '{}': missing method or URL",
                record.name
            ));
            continue;
        }
        record.id = format!("{}-{:03}", dialect.tag(), index + 1);
        record.method = record.method.to_ascii_uppercase();
        record.pre_script = record.pre_script.map(|s| normalize_script(&s));
        record.post_script = record.post_script.map(|s| normalize_script(&s));
        requests.push(record);
    }
    collection.requests = requests;

    if collection.requests.is_empty() {
        return Err(Error::parse(dialect.tag(), "no usable requests after decoding"));
    }

    Ok(collection)
}

/// Read and parse a collection file.
pub fn parse_collection_file(path: &Path, dialect: Dialect) -> Result<ParsedCollection> {
    let content = std::fs::read_to_string(path)?;
    parse_collection(&content, dialect)
}

/// Guess the dialect from file content (and extension, when available).
///
/// Used when the operator does not declare a dialect tag.
pub fn detect_dialect(content: &str, path: Option<&Path>) -> Option<Dialect> {
    if let Some(ext) = path.and_then(|p| p.extension()).and_then(|e| e.to_str()) {
        if ext.eq_ignore_ascii_case("bru") {
            return Some(Dialect::Bruno);
        }
    }

    let trimmed = content.trim_start();
    if !trimmed.starts_with('{') {
        // Structured .bru text starts each request at a meta block
        if trimmed.contains("meta {") {
            return Some(Dialect::Bruno);
        }
        return None;
    }

    let json: serde_json::Value = serde_json::from_str(content).ok()?;
    let obj = json.as_object()?;

    if obj.contains_key("__export_format")
        || (obj.get("_type").is_some() && obj.contains_key("resources"))
    {
        return Some(Dialect::Insomnia);
    }
    if obj.contains_key("info") && obj.contains_key("item") {
        return Some(Dialect::Postman);
    }
    if obj.contains_key("items") {
        return Some(Dialect::Bruno);
    }
    None
}

/// Where an API key credential is injected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiKeyTarget {
    /// Sent as a request header
    Header,
    /// Appended to the query string
    Query,
}

impl ApiKeyTarget {
    pub(crate) fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("query") {
            Self::Query
        } else {
            Self::Header
        }
    }
}

/// Dialect-independent authentication declaration
#[derive(Debug, Clone)]
pub(crate) enum AuthSpec {
    Bearer(String),
    Basic { username: String, password: String },
    ApiKey { key: String, value: String, add_to: ApiKeyTarget },
    OAuth2 { access_token: Option<String> },
    Other(String),
}

/// Convert an auth declaration into concrete headers or query parameters.
///
/// Unknown auth kinds become an `X-Auth-Type` marker header so the scenario
/// detector can still tell authenticated variants apart.
pub(crate) fn apply_auth(
    auth: AuthSpec,
    headers: &mut Headers,
    query_params: &mut IndexMap<String, String>,
) {
    use base64::{engine::general_purpose, Engine as _};

    match auth {
        AuthSpec::Bearer(token) => {
            headers.set("Authorization", format!("Bearer {token}"));
        }
        AuthSpec::Basic { username, password } => {
            let credentials = general_purpose::STANDARD.encode(format!("{username}:{password}"));
            headers.set("Authorization", format!("Basic {credentials}"));
        }
        AuthSpec::ApiKey { key, value, add_to } => match add_to {
            ApiKeyTarget::Header => headers.set(key, value),
            ApiKeyTarget::Query => {
                query_params.insert(key, value);
            }
        },
        AuthSpec::OAuth2 { access_token } => {
            if let Some(token) = access_token {
                headers.set("Authorization", format!("Bearer {token}"));
            } else {
                headers.set("X-Auth-Type", "oauth2");
            }
        }
        AuthSpec::Other(kind) => {
            headers.set("X-Auth-Type", kind);
        }
    }
}

/// Serialise form pairs into `a=b&c=d` form.
pub(crate) fn form_urlencode<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// The form-urlencoded content type added when a form body has none.
pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Parse the query-string portion of a URL into ordered pairs.
pub(crate) fn query_pairs_from_url(url: &str) -> IndexMap<String, String> {
    let mut params = IndexMap::new();
    if let Some((_, query)) = url.split_once('?') {
        let query = query.split('#').next().unwrap_or(query);
        for pair in query.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(key.to_string(), value.to_string());
        }
    }
    params
}
