//! Sandboxed evaluator for collection scripts
//!
//! Each invocation builds a fresh QuickJS runtime inside
//! `tokio::task::spawn_blocking`, installs the canonical `pm.*` surface via
//! a JS prelude backed by plain objects, evaluates the user script, then
//! reads the variable object and produced-name list back out. The engine
//! installs no host bindings, so the network, filesystem and process
//! environment are unreachable from script code. A panic in the evaluator
//! surfaces as a join error and becomes a script failure, never a pipeline
//! abort.

use super::ScriptKind;
use crate::error::{Error, Result};
use crate::model::{Headers, OutboundRequest, RequestRecord, ResponseRecord};
use rquickjs::{CatchResultExt, Context, Runtime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default per-script evaluation budget
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Request context handed to a script
#[derive(Debug, Clone, Serialize)]
pub struct ScriptRequest {
    /// HTTP method
    pub method: String,
    /// Request URL
    pub url: String,
    /// Header pairs, original casing
    pub headers: Headers,
    /// Raw body, when present
    pub body: Option<String>,
}

impl ScriptRequest {
    /// Context for a pre-script, before placeholder substitution
    pub fn from_record(record: &RequestRecord) -> Self {
        Self {
            method: record.method.clone(),
            url: record.url.clone(),
            headers: record.headers.clone(),
            body: record.body.clone(),
        }
    }

    /// Context for a post-script: the request as actually sent
    pub fn from_outbound(outbound: &OutboundRequest) -> Self {
        Self {
            method: outbound.method.clone(),
            url: outbound.url.clone(),
            headers: outbound.headers.clone(),
            body: outbound.body.clone(),
        }
    }
}

/// Response context handed to a post-script
#[derive(Debug, Clone, Serialize)]
pub struct ScriptResponse {
    /// HTTP status code
    pub status: u16,
    /// Header pairs, first value per name
    pub headers: Headers,
    /// Raw body text
    pub body: String,
}

impl From<&ResponseRecord> for ScriptResponse {
    fn from(response: &ResponseRecord) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
        }
    }
}

/// Everything a script invocation can see
#[derive(Debug, Clone, Serialize)]
pub struct ScriptInput {
    /// Bound request context
    pub request: ScriptRequest,
    /// Bound response context, for post-scripts
    pub response: Option<ScriptResponse>,
    /// Snapshot of the run's variable scope
    pub vars: HashMap<String, String>,
}

/// Side effects of one script invocation
#[derive(Debug, Default)]
pub struct ScriptOutcome {
    /// Final variable bindings, merged back into the run scope
    pub bindings: HashMap<String, String>,
    /// Names written through `pm.*.set` during this invocation
    pub produced: Vec<String>,
    /// `console.*` output: (level, message) pairs
    pub logs: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct Harvest {
    vars: HashMap<String, serde_json::Value>,
    produced: Vec<String>,
    logs: Vec<(String, String)>,
}

/// Installs the canonical surface: variable stores, request/response
/// context and a console that buffers into the harvest object.
const PRELUDE: &str = r#"
(function () {
    const ctx = globalThis.__automock;
    ctx.produced = [];
    ctx.logs = [];
    const toLog = (v) => {
        if (v === undefined) return 'undefined';
        if (v === null) return 'null';
        if (typeof v === 'object') { try { return JSON.stringify(v); } catch (e) { return String(v); } }
        return String(v);
    };
    const store = {
        get: function (name) {
            return Object.prototype.hasOwnProperty.call(ctx.vars, name) ? ctx.vars[name] : undefined;
        },
        set: function (name, value) {
            ctx.vars[name] = String(value);
            if (ctx.produced.indexOf(name) < 0) ctx.produced.push(name);
        },
        has: function (name) {
            return Object.prototype.hasOwnProperty.call(ctx.vars, name);
        },
    };
    const headerGet = (pairs) => function (name) {
        if (name === undefined || name === null) return undefined;
        const wanted = String(name).toLowerCase();
        for (const pair of pairs) {
            if (String(pair[0]).toLowerCase() === wanted) return pair[1];
        }
        return undefined;
    };
    const request = {
        method: ctx.request.method,
        url: ctx.request.url,
        body: ctx.request.body === null ? undefined : ctx.request.body,
        headers: { get: headerGet(ctx.request.headers) },
        json: function () {
            try { return JSON.parse(ctx.request.body); } catch (e) { return null; }
        },
    };
    const response = ctx.response ? {
        code: function () { return ctx.response.status; },
        text: function () { return ctx.response.body; },
        json: function () {
            try { return JSON.parse(ctx.response.body); } catch (e) { return null; }
        },
        headers: { get: headerGet(ctx.response.headers) },
    } : undefined;
    globalThis.pm = {
        environment: store,
        globals: store,
        collectionVariables: store,
        variables: { get: store.get },
        request: request,
        response: response,
    };
    globalThis.console = {
        log: function () { ctx.logs.push(['log', Array.prototype.map.call(arguments, toLog).join(' ')]); },
        warn: function () { ctx.logs.push(['warn', Array.prototype.map.call(arguments, toLog).join(' ')]); },
        error: function () { ctx.logs.push(['error', Array.prototype.map.call(arguments, toLog).join(' ')]); },
    };
})();
"#;

const HARVEST: &str =
    "JSON.stringify({vars: __automock.vars, produced: __automock.produced, logs: __automock.logs})";

/// Single-threaded evaluator for normalised scripts.
///
/// A fresh runtime per invocation keeps script state confined to the
/// provided variable snapshot and the diagnostic sink.
#[derive(Debug, Clone)]
pub struct ScriptEngine {
    timeout: Duration,
}

impl ScriptEngine {
    /// Engine with the default evaluation budget
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }

    /// Engine with a custom evaluation budget
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Evaluate one script to completion or failure.
    ///
    /// Thrown values, evaluation panics and timeouts all come back as
    /// [`Error::Script`] carrying the script kind and request name.
    pub async fn execute(
        &self,
        script: &str,
        input: ScriptInput,
        kind: ScriptKind,
        request_name: &str,
    ) -> Result<ScriptOutcome> {
        let payload = serde_json::to_string(&input)?;
        let source = script.to_string();
        let budget = self.timeout;

        debug!(request = request_name, %kind, "evaluating script");
        let handle = tokio::task::spawn_blocking(move || evaluate(&source, &payload, budget));
        // The interrupt handler stops runaway scripts; the outer timeout is
        // a backstop for the blocking task itself.
        let joined = tokio::time::timeout(budget + Duration::from_millis(500), handle).await;

        let harvest = match joined {
            Err(_) => {
                return Err(Error::script(
                    kind,
                    request_name,
                    format!("script exceeded the {}ms budget", budget.as_millis()),
                ))
            }
            Ok(Err(join_error)) => {
                return Err(Error::script(
                    kind,
                    request_name,
                    format!("script evaluator panicked: {join_error}"),
                ))
            }
            Ok(Ok(Err(message))) => return Err(Error::script(kind, request_name, message)),
            Ok(Ok(Ok(harvest))) => harvest,
        };

        let bindings = harvest
            .vars
            .into_iter()
            .map(|(name, value)| {
                let rendered = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, rendered)
            })
            .collect();

        for (level, message) in &harvest.logs {
            match level.as_str() {
                "warn" => warn!(request = request_name, %kind, "script: {message}"),
                "error" => warn!(request = request_name, %kind, "script error: {message}"),
                _ => debug!(request = request_name, %kind, "script: {message}"),
            }
        }

        Ok(ScriptOutcome {
            bindings,
            produced: harvest.produced,
            logs: harvest.logs,
        })
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn evaluate(script: &str, payload: &str, budget: Duration) -> std::result::Result<Harvest, String> {
    let runtime = Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;
    let deadline = Instant::now() + budget;
    runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));
    let context = Context::full(&runtime).map_err(|e| format!("failed to create context: {e}"))?;

    context.with(|ctx| {
        let literal = serde_json::to_string(payload)
            .map_err(|e| format!("failed to encode context: {e}"))?;
        let bootstrap = format!("globalThis.__automock = JSON.parse({literal});");
        ctx.eval::<rquickjs::Value, _>(bootstrap.as_str())
            .catch(&ctx)
            .map_err(|e| e.to_string())?;
        ctx.eval::<rquickjs::Value, _>(PRELUDE)
            .catch(&ctx)
            .map_err(|e| e.to_string())?;
        ctx.eval::<rquickjs::Value, _>(script)
            .catch(&ctx)
            .map_err(|e| e.to_string())?;
        let harvested: String = ctx.eval(HARVEST).catch(&ctx).map_err(|e| e.to_string())?;
        serde_json::from_str(&harvested).map_err(|e| format!("failed to read script state: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_with_response(body: &str, vars: &[(&str, &str)]) -> ScriptInput {
        let mut headers = Headers::new();
        headers.set("Content-Type", "application/json");
        ScriptInput {
            request: ScriptRequest {
                method: "POST".to_string(),
                url: "https://api.example.com/login".to_string(),
                headers: headers.clone(),
                body: Some(r#"{"user":"alice"}"#.to_string()),
            },
            response: Some(ScriptResponse {
                status: 200,
                headers,
                body: body.to_string(),
            }),
            vars: vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn set_binds_and_records_produced() {
        let engine = ScriptEngine::new();
        let outcome = engine
            .execute(
                r#"pm.environment.set("tok", pm.response.json().token);"#,
                input_with_response(r#"{"token":"T1"}"#, &[]),
                ScriptKind::Post,
                "Login",
            )
            .await
            .expect("script runs");

        assert_eq!(outcome.bindings.get("tok"), Some(&"T1".to_string()));
        assert_eq!(outcome.produced, vec!["tok".to_string()]);
    }

    #[tokio::test]
    async fn variables_get_reads_any_store() {
        let engine = ScriptEngine::new();
        let outcome = engine
            .execute(
                r#"pm.environment.set("copy", pm.variables.get("seeded"));"#,
                input_with_response("{}", &[("seeded", "from-scope")]),
                ScriptKind::Pre,
                "Copy",
            )
            .await
            .expect("script runs");

        assert_eq!(outcome.bindings.get("copy"), Some(&"from-scope".to_string()));
    }

    #[tokio::test]
    async fn set_coerces_values_to_strings() {
        let engine = ScriptEngine::new();
        let outcome = engine
            .execute(
                r#"pm.environment.set("n", 42); pm.environment.set("b", true);"#,
                input_with_response("{}", &[]),
                ScriptKind::Post,
                "Coerce",
            )
            .await
            .expect("script runs");

        assert_eq!(outcome.bindings.get("n"), Some(&"42".to_string()));
        assert_eq!(outcome.bindings.get("b"), Some(&"true".to_string()));
    }

    #[tokio::test]
    async fn response_accessors_follow_contract() {
        let engine = ScriptEngine::new();
        let outcome = engine
            .execute(
                r#"
                pm.environment.set("code", pm.response.code());
                pm.environment.set("text", pm.response.text());
                pm.environment.set("json", pm.response.json() === null ? "null" : "object");
                "#,
                input_with_response("plain text body", &[]),
                ScriptKind::Post,
                "Accessors",
            )
            .await
            .expect("script runs");

        assert_eq!(outcome.bindings.get("code"), Some(&"200".to_string()));
        assert_eq!(outcome.bindings.get("text"), Some(&"plain text body".to_string()));
        assert_eq!(outcome.bindings.get("json"), Some(&"null".to_string()));
    }

    #[tokio::test]
    async fn header_lookup_is_case_insensitive() {
        let engine = ScriptEngine::new();
        let outcome = engine
            .execute(
                r#"
                pm.environment.set("req", pm.request.headers.get("content-TYPE"));
                pm.environment.set("res", pm.response.headers.get("CONTENT-type"));
                "#,
                input_with_response("{}", &[]),
                ScriptKind::Post,
                "Headers",
            )
            .await
            .expect("script runs");

        assert_eq!(outcome.bindings.get("req"), Some(&"application/json".to_string()));
        assert_eq!(outcome.bindings.get("res"), Some(&"application/json".to_string()));
    }

    #[tokio::test]
    async fn request_json_parses_body() {
        let engine = ScriptEngine::new();
        let outcome = engine
            .execute(
                r#"pm.environment.set("user", pm.request.json().user);"#,
                input_with_response("{}", &[]),
                ScriptKind::Pre,
                "RequestJson",
            )
            .await
            .expect("script runs");

        assert_eq!(outcome.bindings.get("user"), Some(&"alice".to_string()));
    }

    #[tokio::test]
    async fn thrown_values_surface_as_script_errors() {
        let engine = ScriptEngine::new();
        let err = engine
            .execute(
                r#"throw new Error("boom");"#,
                input_with_response("{}", &[]),
                ScriptKind::Post,
                "Thrower",
            )
            .await
            .expect_err("script throws");

        match err {
            Error::Script { kind, request, message } => {
                assert_eq!(kind, ScriptKind::Post);
                assert_eq!(request, "Thrower");
                assert!(message.contains("boom"), "message was: {message}");
            }
            other => panic!("expected script error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn runaway_scripts_are_interrupted() {
        let engine = ScriptEngine::with_timeout(Duration::from_millis(200));
        let err = engine
            .execute(
                "while (true) {}",
                input_with_response("{}", &[]),
                ScriptKind::Pre,
                "Spinner",
            )
            .await
            .expect_err("infinite loop is interrupted");
        assert!(matches!(err, Error::Script { .. }));
    }

    #[tokio::test]
    async fn console_output_is_captured() {
        let engine = ScriptEngine::new();
        let outcome = engine
            .execute(
                r#"console.log("hello", {a: 1}); console.warn("careful");"#,
                input_with_response("{}", &[]),
                ScriptKind::Pre,
                "Logger",
            )
            .await
            .expect("script runs");

        assert_eq!(
            outcome.logs,
            vec![
                ("log".to_string(), r#"hello {"a":1}"#.to_string()),
                ("warn".to_string(), "careful".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn host_bindings_are_absent() {
        let engine = ScriptEngine::new();
        let outcome = engine
            .execute(
                r#"
                pm.environment.set("fetch", typeof fetch);
                pm.environment.set("require", typeof require);
                pm.environment.set("process", typeof process);
                "#,
                input_with_response("{}", &[]),
                ScriptKind::Pre,
                "Sandbox",
            )
            .await
            .expect("script runs");

        assert_eq!(outcome.bindings.get("fetch"), Some(&"undefined".to_string()));
        assert_eq!(outcome.bindings.get("require"), Some(&"undefined".to_string()));
        assert_eq!(outcome.bindings.get("process"), Some(&"undefined".to_string()));
    }
}
