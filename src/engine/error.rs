//! Engine error taxonomy.
//!
//! Three kinds cover everything the engine can fail with: a referenced
//! entity is missing, the caller handed us an out-of-domain value, or the
//! store could not complete a read or write. Store errors arrive as
//! `anyhow::Error` and convert via `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
