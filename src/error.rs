//! Engine error taxonomy.
//!
//! Kinds, not types: every failure surfaced by the engine folds into one of
//! these variants. Within a request the first fatal error ends the request;
//! recoverable ones (a missing source file, a mid-pipeline regex failure)
//! are reported in-band and execution continues where defined.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Parse failure, unknown action, missing target.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Malformed regex in a pattern or grep target.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Symbol, file or folder not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem unavailable or permission denied.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest failed to parse; treated as no previous state upstream.
    #[error("manifest corrupt: {0}")]
    ManifestCorrupt(String),

    /// A producer or package-manager invocation exited non-zero.
    #[error("external tool failure: {0}")]
    ExternalToolFailure(String),

    /// Cooperative cancellation.
    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// Stable kind discriminator used in JSON error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidQuery(_) => "invalid_query",
            EngineError::InvalidPattern(_) => "invalid_pattern",
            EngineError::NotFound(_) => "not_found",
            EngineError::Io(_) => "io",
            EngineError::ManifestCorrupt(_) => "manifest_corrupt",
            EngineError::ExternalToolFailure(_) => "external_tool_failure",
            EngineError::Cancelled => "cancelled",
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
