//! Error types for AutoMock Core

use crate::script::ScriptKind;

/// Result type alias for AutoMock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for AutoMock
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The declared collection dialect is not one AutoMock understands.
    #[error("Unsupported collection dialect: {0}")]
    UnsupportedDialect(String),

    /// Decoding a collection produced nothing usable.
    #[error("Failed to parse {dialect} collection: {message}")]
    Parse {
        /// Dialect that was being decoded
        dialect: String,
        /// What went wrong
        message: String,
    },

    /// A referenced variable could not be obtained from any source.
    #[error("Could not resolve variable '{name}' for request '{request}'")]
    VariableResolution {
        /// Variable name that stayed unresolved
        name: String,
        /// Request the variable was needed for
        request: String,
    },

    /// A pre- or post-script threw or the evaluator panicked.
    #[error("{kind} script failed for request '{request}': {message}")]
    Script {
        /// Whether the pre- or post-script failed
        kind: ScriptKind,
        /// Request the script belongs to
        request: String,
        /// Underlying evaluation error
        message: String,
    },

    /// The real HTTP call for a node failed (connection, timeout, IO).
    #[error("API execution failed for request '{request}': {message}")]
    ApiExecution {
        /// Request that failed
        request: String,
        /// Underlying transport error
        message: String,
    },

    /// The injected configuration store rejected the write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Regex error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Create a parse error for the given dialect
    pub fn parse<S: Into<String>>(dialect: &str, message: S) -> Self {
        Self::Parse {
            dialect: dialect.to_string(),
            message: message.into(),
        }
    }

    /// Create a variable resolution error
    pub fn variable<S: Into<String>, R: Into<String>>(name: S, request: R) -> Self {
        Self::VariableResolution {
            name: name.into(),
            request: request.into(),
        }
    }

    /// Create a script execution error
    pub fn script<S: Into<String>>(kind: ScriptKind, request: &str, message: S) -> Self {
        Self::Script {
            kind,
            request: request.to_string(),
            message: message.into(),
        }
    }

    /// Create an API execution error
    pub fn api<S: Into<String>>(request: &str, message: S) -> Self {
        Self::ApiExecution {
            request: request.to_string(),
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage(message.into())
    }
}
