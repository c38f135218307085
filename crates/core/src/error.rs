//! Error types for the factlayer domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::any::Any;
use thiserror::Error;

/// Failures that end a request in the fallback response.
#[derive(Debug, Error)]
pub enum Error {
    // --- Generation boundary errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Provider failed: {0}")]
    Provider(String),

    #[error("Generation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider returned an empty completion")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("Store lookup failed in {validator}: {source}")]
    Store {
        validator: &'static str,
        #[source]
        source: MemoryError,
    },

    #[error("Malformed fact {fact_id}: {reason}")]
    MalformedFact { fact_id: String, reason: String },

    #[error("Internal validator failure: {0}")]
    Internal(String),
}
