//! Collection run pipeline
//!
//! Strictly sequential over execution nodes: pre-script, variable
//! resolution, real HTTP call, post-script. Post-script bindings of node
//! *i* are visible to every later node and never to earlier ones. The
//! variable scope lives exactly as long as one run.

pub mod executor;
pub mod planner;
pub mod resolver;

pub use executor::{HttpExecutor, REQUEST_TIMEOUT};
pub use planner::plan;
pub use resolver::{AutoPrompter, Prompter};

use crate::error::Result;
use crate::model::{ExecutionNode, RequestRecord, VariableScope};
use crate::script::{ScriptEngine, ScriptInput, ScriptKind, ScriptRequest, ScriptResponse};
use indexmap::IndexMap;
use tracing::{info, warn};

/// Outcome of one collection run
#[derive(Debug)]
pub struct RunReport {
    /// All nodes, executed or skipped, in collection order
    pub nodes: Vec<ExecutionNode>,
    /// Whether the operator abandoned the run midway
    pub aborted: bool,
    /// Nodes that completed an HTTP round trip (real or placeholder)
    pub executed: usize,
    /// Nodes skipped over unresolved variables
    pub skipped: usize,
}

/// Sequential pipeline driver for one collection run.
pub struct CollectionRunner<P> {
    engine: ScriptEngine,
    executor: HttpExecutor,
    prompter: P,
}

impl<P: Prompter> CollectionRunner<P> {
    /// Build a runner around the given prompter
    pub fn new(prompter: P) -> Result<Self> {
        Ok(Self {
            engine: ScriptEngine::new(),
            executor: HttpExecutor::new()?,
            prompter,
        })
    }

    /// Replace the script engine (custom evaluation budget)
    pub fn with_engine(mut self, engine: ScriptEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Execute the requests in declared order.
    ///
    /// Per-node faults (scripts, resolution, transport) recover at
    /// operator discretion; when the operator declines, the run is
    /// abandoned and the scope discarded with it.
    pub async fn run(
        &self,
        requests: Vec<RequestRecord>,
        seed: IndexMap<String, String>,
    ) -> Result<RunReport> {
        let mut scope = VariableScope::seeded(seed);
        let mut nodes = plan(requests);
        let total = nodes.len();
        let mut aborted = false;
        let mut executed = 0usize;
        let mut skipped = 0usize;

        for (index, node) in nodes.iter_mut().enumerate() {
            let name = node.request.name.clone();
            info!(
                request = %name,
                method = %node.request.method,
                "executing node {}/{total}",
                index + 1
            );

            // Pre-script: bindings enter the scope; failures log and move on.
            if let Some(pre) = node.request.pre_script.clone() {
                let input = ScriptInput {
                    request: ScriptRequest::from_record(&node.request),
                    response: None,
                    vars: scope.snapshot(),
                };
                match self.engine.execute(&pre, input, ScriptKind::Pre, &name).await {
                    Ok(outcome) => scope.merge(outcome.bindings),
                    Err(e) => warn!("{e}"),
                }
            }

            // Variable resolution: scope, process environment, prompt.
            if let Err(e) = resolver::resolve_node(node, &mut scope, &self.prompter).await {
                warn!("{e}");
                let message =
                    format!("{e}. Skip this request and continue with the remaining ones?");
                if self.prompter.confirm_continue(&message).await {
                    node.skipped = true;
                    skipped += 1;
                    continue;
                }
                aborted = true;
                break;
            }

            // Real HTTP call, with a placeholder fallback on operator
            // approval.
            let outbound = HttpExecutor::prepare(&node.request, &scope);
            match self.executor.execute(&outbound, &name).await {
                Ok(response) => {
                    node.outbound = Some(outbound);
                    node.response = Some(response);
                    executed += 1;
                }
                Err(e) => {
                    warn!("{e}");
                    let message =
                        format!("{e}. Record a placeholder 500 response and continue?");
                    if self.prompter.confirm_continue(&message).await {
                        node.response =
                            Some(HttpExecutor::placeholder_response(&e.to_string()));
                        node.outbound = Some(outbound);
                        executed += 1;
                    } else {
                        aborted = true;
                        break;
                    }
                }
            }

            // Post-script: bindings enter the scope and count as produced.
            if let Some(post) = node.request.post_script.clone() {
                let input = ScriptInput {
                    request: node
                        .outbound
                        .as_ref()
                        .map(ScriptRequest::from_outbound)
                        .unwrap_or_else(|| ScriptRequest::from_record(&node.request)),
                    response: node.response.as_ref().map(ScriptResponse::from),
                    vars: scope.snapshot(),
                };
                match self.engine.execute(&post, input, ScriptKind::Post, &name).await {
                    Ok(outcome) => {
                        scope.merge(outcome.bindings);
                        node.variables_produced = outcome.produced.into_iter().collect();
                    }
                    Err(e) => warn!("{e}"),
                }
            }
        }

        if aborted {
            info!("run abandoned by operator, discarding variable scope");
        }

        Ok(RunReport {
            nodes,
            aborted,
            executed,
            skipped,
        })
    }
}
