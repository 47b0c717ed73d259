//! Script normalisation and the sandboxed script runtime

pub mod normalize;
pub mod runtime;

pub use runtime::{ScriptEngine, ScriptInput, ScriptOutcome, ScriptRequest, ScriptResponse};

use std::fmt;

/// Which script of a request is being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Pre-request script
    Pre,
    /// Post-response script
    Post,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => f.write_str("pre-request"),
            Self::Post => f.write_str("post-response"),
        }
    }
}
