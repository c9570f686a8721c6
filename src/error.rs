//! Error type shared by every pipeline operation.
//!
//! User functions return [`anyhow::Result`]; the engine wraps their failures in
//! [`Error::ElementCompute`] (sequential stages) or [`Error::WorkerFailure`]
//! (parallel stages) so callers can tell where a pass went wrong. Nothing in the
//! crate retries on error: a failed pass is simply over.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building, iterating, or persisting a pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// A source cannot begin a pass (missing file, bad directory, invalid pattern).
    #[error("source `{source_name}` unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// A per-element function failed while computing an element.
    #[error("step `{step}` failed: {source}")]
    ElementCompute {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    /// A parallel stage aborted because one of its workers failed.
    #[error("worker in parallel step `{step}` failed: {reason}")]
    WorkerFailure { step: String, reason: String },

    /// Malformed or incompatible persisted data or pipeline definition.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid operator parameter (e.g. a zero batch size).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error during a pass or while writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn compute(step: &str, source: anyhow::Error) -> Self {
        Self::ElementCompute {
            step: step.to_string(),
            source,
        }
    }

    pub(crate) fn unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn serialization(msg: impl ToString) -> Self {
        Self::Serialization(msg.to_string())
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
