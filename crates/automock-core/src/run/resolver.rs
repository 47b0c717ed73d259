//! Variable resolution
//!
//! For each node every referenced variable is obtained from, in order: the
//! current run scope (bindings from prior nodes and scripts), the process
//! environment, and finally an interactive prompt. Pre-script bindings have
//! already entered the scope by the time the resolver runs.

use crate::error::{Error, Result};
use crate::model::{ExecutionNode, VariableScope};
use async_trait::async_trait;
use tracing::debug;

/// Operator interaction surface used during a run.
///
/// The CLI backs this with real terminal prompts; tests script it.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask the operator for a variable value. `None` means the operator
    /// declined or prompting is unavailable.
    async fn prompt_variable(&self, name: &str, request_name: &str) -> Option<String>;

    /// Ask whether the run should continue past a recoverable failure.
    async fn confirm_continue(&self, message: &str) -> bool;
}

/// Non-interactive prompter: never supplies variables, answers every
/// continue question with a fixed policy.
#[derive(Debug, Clone)]
pub struct AutoPrompter {
    continue_on_failure: bool,
}

impl AutoPrompter {
    /// Prompter that keeps going past per-node failures
    pub fn continuing() -> Self {
        Self {
            continue_on_failure: true,
        }
    }

    /// Prompter that aborts on the first per-node failure
    pub fn aborting() -> Self {
        Self {
            continue_on_failure: false,
        }
    }
}

#[async_trait]
impl Prompter for AutoPrompter {
    async fn prompt_variable(&self, _name: &str, _request_name: &str) -> Option<String> {
        None
    }

    async fn confirm_continue(&self, _message: &str) -> bool {
        self.continue_on_failure
    }
}

/// Resolve every referenced variable of `node` into the scope.
///
/// Fails with [`Error::VariableResolution`] on the first variable no
/// source can supply.
pub async fn resolve_node(
    node: &ExecutionNode,
    scope: &mut VariableScope,
    prompter: &dyn Prompter,
) -> Result<()> {
    for name in &node.referenced {
        if scope.contains(name) {
            continue;
        }
        if let Ok(value) = std::env::var(name) {
            debug!(variable = %name, "resolved from process environment");
            scope.set(name.clone(), value);
            continue;
        }
        match prompter.prompt_variable(name, &node.request.name).await {
            Some(value) => {
                debug!(variable = %name, "resolved interactively");
                scope.set(name.clone(), value);
            }
            None => return Err(Error::variable(name.clone(), node.request.name.clone())),
        }
    }
    Ok(())
}
