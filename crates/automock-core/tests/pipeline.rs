//! End-to-end pipeline tests against an in-process HTTP server

use automock_core::expectation::{self, BuildOptions, HeaderMatcher};
use automock_core::import::{parse_collection, Dialect};
use automock_core::run::{AutoPrompter, CollectionRunner};
use automock_core::scenario::{self, Differentiator};
use automock_core::{config, templating};
use axum::extract::Json as ExtractJson;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;

async fn login() -> impl IntoResponse {
    Json(json!({"token": "T1"}))
}

async fn me(headers: HeaderMap) -> impl IntoResponse {
    match headers.get("authorization") {
        Some(value) if value == "Bearer T1" => {
            (StatusCode::OK, Json(json!({"user": "alice"})))
        }
        _ => (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))),
    }
}

async fn echo(ExtractJson(body): ExtractJson<Value>) -> impl IntoResponse {
    Json(body)
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/echo", post(echo));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

#[tokio::test]
async fn post_script_bindings_flow_into_later_requests() {
    let addr = spawn_server().await;
    let content = format!(
        r#"{{
            "info": {{"name": "Auth flow"}},
            "item": [
                {{
                    "name": "Login",
                    "request": {{
                        "method": "POST",
                        "url": "http://{addr}/login",
                        "header": [{{"key": "Content-Type", "value": "application/json"}}],
                        "body": {{"mode": "raw", "raw": "{{\"user\": \"alice\"}}"}}
                    }},
                    "event": [
                        {{
                            "listen": "test",
                            "script": {{"exec": ["pm.environment.set(\"tok\", pm.response.json().token);"]}}
                        }}
                    ]
                }},
                {{
                    "name": "Who am I",
                    "request": {{
                        "method": "GET",
                        "url": "http://{addr}/me",
                        "header": [{{"key": "Authorization", "value": "Bearer {{{{tok}}}}"}}]
                    }}
                }}
            ]
        }}"#
    );

    let collection = parse_collection(&content, Dialect::Postman).expect("parses");
    let runner = CollectionRunner::new(AutoPrompter::continuing()).expect("runner builds");
    let mut report = runner
        .run(collection.requests, collection.seed_variables)
        .await
        .expect("run completes");

    assert!(!report.aborted);
    assert_eq!(report.executed, 2);

    // The login node produced the token binding.
    assert!(report.nodes[0]
        .variables_produced
        .contains("tok"));

    // The outbound request for node 2 carried the literal substituted header.
    let outbound = report.nodes[1].outbound.as_ref().expect("node 2 executed");
    assert_eq!(outbound.headers.get("Authorization"), Some("Bearer T1"));
    assert!(!templating::has_unresolved(
        outbound.headers.get("Authorization").expect("header")
    ));
    assert_eq!(report.nodes[1].response.as_ref().expect("response").status, 200);

    // The emitted expectation for /me keeps the propagated credential.
    let analysis = scenario::detect(&mut report.nodes);
    assert!(analysis.groups.is_empty());
    let stamp = config::next_version_stamp();
    let expectations = expectation::build(
        &report.nodes,
        &analysis,
        &BuildOptions::default(),
        Dialect::Postman,
        stamp,
    );
    assert_eq!(expectations.len(), 2);

    let me_expectation = expectations
        .iter()
        .find(|e| e.http_request.path == "/me")
        .expect("expectation for /me");
    let headers = me_expectation
        .http_request
        .headers
        .as_ref()
        .expect("header matchers");
    assert_eq!(
        headers.get("Authorization"),
        Some(&HeaderMatcher::Value("Bearer T1".to_string()))
    );
}

#[tokio::test]
async fn auth_pair_produces_a_no_auth_scenario() {
    let addr = spawn_server().await;
    let content = format!(
        r#"{{
            "info": {{"name": "Auth pair"}},
            "item": [
                {{
                    "name": "Me authorised",
                    "request": {{
                        "method": "GET",
                        "url": "http://{addr}/me",
                        "header": [{{"key": "Authorization", "value": "Bearer T1"}}]
                    }}
                }},
                {{
                    "name": "Me anonymous",
                    "request": {{
                        "method": "GET",
                        "url": "http://{addr}/me"
                    }}
                }}
            ]
        }}"#
    );

    let collection = parse_collection(&content, Dialect::Postman).expect("parses");
    let runner = CollectionRunner::new(AutoPrompter::continuing()).expect("runner builds");
    let mut report = runner
        .run(collection.requests, collection.seed_variables)
        .await
        .expect("run completes");

    assert_eq!(report.nodes[0].response.as_ref().expect("response").status, 200);
    assert_eq!(report.nodes[1].response.as_ref().expect("response").status, 401);

    let analysis = scenario::detect(&mut report.nodes);
    assert_eq!(analysis.groups.len(), 1);
    let group = &analysis.groups[0];
    assert_eq!(group.base_key, "GET /me");
    assert_eq!(group.variants[1].differentiator, Differentiator::NoAuth);

    let stamp = config::next_version_stamp();
    let expectations = expectation::build(
        &report.nodes,
        &analysis,
        &BuildOptions::default(),
        Dialect::Postman,
        stamp,
    );
    assert_eq!(expectations.len(), 2);

    let unauthorized = expectations
        .iter()
        .find(|e| e.http_response.status_code == 401)
        .expect("401 expectation");
    assert_eq!(
        unauthorized
            .http_request
            .headers
            .as_ref()
            .expect("matchers")
            .get("Authorization"),
        Some(&HeaderMatcher::Absent { not: true })
    );

    let authorised = expectations
        .iter()
        .find(|e| e.http_response.status_code == 200)
        .expect("200 expectation");
    assert!(authorised.http_request.headers.is_none());

    let mut priorities: Vec<_> = expectations.iter().map(|e| e.priority).collect();
    priorities.sort_unstable();
    priorities.dedup();
    assert_eq!(priorities.len(), expectations.len(), "priorities are unique");
}

#[tokio::test]
async fn failed_requests_record_placeholders_when_continuing() {
    let content = r#"{
        "info": {"name": "Unreachable"},
        "item": [
            {
                "name": "Nowhere",
                "request": {
                    "method": "GET",
                    "url": "http://127.0.0.1:1/unreachable"
                }
            }
        ]
    }"#;

    let collection = parse_collection(content, Dialect::Postman).expect("parses");
    let runner = CollectionRunner::new(AutoPrompter::continuing()).expect("runner builds");
    let report = runner
        .run(collection.requests, collection.seed_variables)
        .await
        .expect("run completes");

    assert!(!report.aborted);
    let response = report.nodes[0].response.as_ref().expect("placeholder recorded");
    assert_eq!(response.status, 500);
    let body = response.body_json().expect("placeholder body is JSON");
    assert_eq!(body["error"], "request execution failed");
}

#[tokio::test]
async fn declining_to_continue_abandons_the_run() {
    let content = r#"{
        "info": {"name": "Unreachable"},
        "item": [
            {
                "name": "Nowhere",
                "request": {"method": "GET", "url": "http://127.0.0.1:1/unreachable"}
            },
            {
                "name": "Never reached",
                "request": {"method": "GET", "url": "http://127.0.0.1:1/next"}
            }
        ]
    }"#;

    let collection = parse_collection(content, Dialect::Postman).expect("parses");
    let runner = CollectionRunner::new(AutoPrompter::aborting()).expect("runner builds");
    let report = runner
        .run(collection.requests, collection.seed_variables)
        .await
        .expect("run returns a report");

    assert!(report.aborted);
    assert_eq!(report.executed, 0);
    assert!(report.nodes[1].response.is_none());
}

#[tokio::test]
async fn unresolved_variables_skip_the_node_and_keep_going() {
    let addr = spawn_server().await;
    let content = format!(
        r#"{{
            "info": {{"name": "Partial"}},
            "item": [
                {{
                    "name": "Needs a secret",
                    "request": {{
                        "method": "GET",
                        "url": "http://{addr}/me",
                        "header": [{{"key": "Authorization", "value": "Bearer {{{{automock_missing_secret}}}}"}}]
                    }}
                }},
                {{
                    "name": "Login",
                    "request": {{
                        "method": "POST",
                        "url": "http://{addr}/login",
                        "body": {{"mode": "raw", "raw": "{{}}"}}
                    }}
                }}
            ]
        }}"#
    );

    let collection = parse_collection(&content, Dialect::Postman).expect("parses");
    let runner = CollectionRunner::new(AutoPrompter::continuing()).expect("runner builds");
    let mut report = runner
        .run(collection.requests, collection.seed_variables)
        .await
        .expect("run completes");

    assert!(!report.aborted);
    assert_eq!(report.skipped, 1);
    assert!(report.nodes[0].skipped);
    assert!(report.nodes[0].response.is_none());
    assert_eq!(report.nodes[1].response.as_ref().expect("login ran").status, 200);

    // Skipped nodes emit nothing.
    let analysis = scenario::detect(&mut report.nodes);
    let expectations = expectation::build(
        &report.nodes,
        &analysis,
        &BuildOptions::default(),
        Dialect::Postman,
        config::next_version_stamp(),
    );
    assert_eq!(expectations.len(), 1);
    assert_eq!(expectations[0].http_request.path, "/login");
}

#[tokio::test]
async fn bruno_scripts_normalise_and_execute() {
    let addr = spawn_server().await;
    let content = format!(
        r#"meta {{
  name: Login
}}

post {{
  url: http://{addr}/login
}}

body:json {{
  {{ "user": "alice" }}
}}

script:post-response {{
  bru.setEnvVar('k', res.body.token);
}}

meta {{
  name: Echo the binding
}}

post {{
  url: http://{addr}/echo
}}

headers {{
  Content-Type: application/json
}}

body:json {{
  {{ "value": "{{{{k}}}}" }}
}}
"#
    );

    let collection = parse_collection(&content, Dialect::Bruno).expect("parses");
    // Normalisation rewrote the Bruno idiom before execution.
    assert_eq!(
        collection.requests[0].post_script.as_deref(),
        Some("pm.environment.set('k', pm.response.json().token);")
    );

    let runner = CollectionRunner::new(AutoPrompter::continuing()).expect("runner builds");
    let report = runner
        .run(collection.requests, collection.seed_variables)
        .await
        .expect("run completes");

    let echo_body = report.nodes[1]
        .outbound
        .as_ref()
        .expect("echo executed")
        .body
        .as_deref()
        .expect("echo body");
    assert!(echo_body.contains(r#""value": "T1""#), "body was: {echo_body}");
    let echoed = report.nodes[1].response.as_ref().expect("echo response");
    assert_eq!(echoed.body_json().expect("echo JSON")["value"], json!("T1"));
}
