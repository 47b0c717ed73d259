//! Real HTTP execution for planned nodes
//!
//! Substitutes placeholders from the run scope, performs the request with
//! a 30-second deadline and records status, headers, body, cookies and
//! elapsed time. On operator-approved failure a placeholder response keeps
//! the pipeline moving.

use crate::error::{Error, Result};
use crate::model::{Headers, OutboundRequest, RequestRecord, ResponseRecord, VariableScope};
use crate::templating::substitute;
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, SET_COOKIE};
use reqwest::{Client, Method};
use serde_json::json;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Total deadline for one outbound request, issue to full body receipt.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Stateless-per-request HTTP executor
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    /// Build the executor and its HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Substitute placeholders in URL, headers, query values and body.
    ///
    /// Adds the form-urlencoded Content-Type when a body looks like form
    /// pairs (`=` present, no `{`) and no Content-Type is declared.
    pub fn prepare(request: &RequestRecord, scope: &VariableScope) -> OutboundRequest {
        let url = substitute(&request.url, scope);
        let mut headers = request.headers.map_values(|value| substitute(value, scope));
        let query_params: IndexMap<String, String> = request
            .query_params
            .iter()
            .map(|(name, value)| (name.clone(), substitute(value, scope)))
            .collect();
        let body = request.body.as_ref().map(|body| substitute(body, scope));

        if let Some(body) = &body {
            if body.contains('=') && !body.contains('{') && !headers.contains("Content-Type") {
                headers.set("Content-Type", "application/x-www-form-urlencoded");
            }
        }

        OutboundRequest {
            method: request.method.clone(),
            url,
            headers,
            query_params,
            body,
        }
    }

    /// Perform the prepared request and record the response.
    pub async fn execute(
        &self,
        outbound: &OutboundRequest,
        request_name: &str,
    ) -> Result<ResponseRecord> {
        let method = Method::from_bytes(outbound.method.as_bytes())
            .map_err(|e| Error::api(request_name, format!("invalid method '{}': {e}", outbound.method)))?;

        let url = effective_url(outbound);
        let mut header_map = HeaderMap::new();
        for (name, value) in outbound.headers.iter() {
            let header_name = HeaderName::from_str(name)
                .map_err(|e| Error::api(request_name, format!("invalid header name '{name}': {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| Error::api(request_name, format!("invalid value for header '{name}': {e}")))?;
            header_map.insert(header_name, header_value);
        }

        let mut builder = self.client.request(method, &url).headers(header_map);
        if let Some(body) = &outbound.body {
            builder = builder.body(body.clone());
        }

        debug!(request = request_name, url = %url, "executing request");
        let started = Instant::now();
        let send = timeout(REQUEST_TIMEOUT, builder.send()).await;
        let response = match send {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(Error::api(request_name, e.to_string())),
            Err(_) => {
                return Err(Error::api(
                    request_name,
                    format!("request timed out after {}s", REQUEST_TIMEOUT.as_secs()),
                ))
            }
        };

        let status = response.status().as_u16();
        let mut headers = Headers::new();
        let mut cookies = IndexMap::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else { continue };
            if name == &SET_COOKIE {
                if let Some((cookie_name, cookie_value)) = parse_cookie(value) {
                    cookies.insert(cookie_name, cookie_value);
                }
            }
            if !headers.contains(name.as_str()) {
                headers.set(name.as_str(), value);
            }
        }

        let body = match timeout(REQUEST_TIMEOUT, response.text()).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(Error::api(request_name, e.to_string())),
            Err(_) => {
                return Err(Error::api(
                    request_name,
                    format!("response body timed out after {}s", REQUEST_TIMEOUT.as_secs()),
                ))
            }
        };

        Ok(ResponseRecord {
            status,
            headers,
            body,
            cookies,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Placeholder recorded when the operator chooses to continue past an
    /// execution failure.
    pub fn placeholder_response(message: &str) -> ResponseRecord {
        let mut headers = Headers::new();
        headers.set("Content-Type", "application/json");
        ResponseRecord {
            status: 500,
            headers,
            body: json!({"error": "request execution failed", "message": message}).to_string(),
            cookies: IndexMap::new(),
            duration_ms: 0,
        }
    }
}

/// Rebuild the URL with the merged query parameters when the node carries
/// any; the parsers already folded URL-inline parameters into the map.
fn effective_url(outbound: &OutboundRequest) -> String {
    if outbound.query_params.is_empty() {
        return outbound.url.clone();
    }
    let base = outbound.url.split('?').next().unwrap_or(&outbound.url);
    let query = outbound
        .query_params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{base}?{query}")
}

fn parse_cookie(value: &str) -> Option<(String, String)> {
    let first = value.split(';').next()?;
    let (name, value) = first.split_once('=')?;
    Some((name.trim().to_string(), value.trim().to_string()))
}
