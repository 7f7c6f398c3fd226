//! Typed errors for the provider boundary and the entity hooks.

use thiserror::Error;

/// Failure raised by an entity's parameter or transaction hooks.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A field the entity's SQL templates need is absent from the record.
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("{0}")]
    Message(String),
}

impl HandlerError {
    /// Ad-hoc hook failure with a caller-supplied message.
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Message(message.into())
    }
}

/// Failure at the Connection Provider boundary. Driver errors pass through
/// verbatim so failure replies carry the driver's own text.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    /// No connection could be supplied (pool closed, backend unreachable).
    #[error("{0}")]
    Unavailable(String),
}
