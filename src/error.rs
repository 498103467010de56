//! Error taxonomy of the simulation core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the threshold calculator and the outbreak engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A parameter is missing, malformed or outside its valid range.
    ///
    /// Always reported before any simulation state is built.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The requested run does not fit the memory or time budget.
    ///
    /// Callers may retry with a smaller input.
    #[error("resource limit exceeded: {0}")]
    ResourceExhausted(String),

    /// The engine broke one of its own invariants. This is a defect.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

impl Error {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Status code a serving layer should attach to this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidParameter { .. } => 400,
            Self::ResourceExhausted(_) => 413,
            Self::InvariantViolation(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Body of an error response: `{ "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}
