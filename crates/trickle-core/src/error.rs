//! Error types for trickle.

use thiserror::Error;

use crate::models::{EntityType, HookKind};

/// Result type alias using trickle's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for trickle operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A second hook of the same kind was registered for an entity type.
    ///
    /// This is a programming error and must abort startup.
    #[error("Duplicate {kind} handler registered for entity type {entity_type}")]
    DuplicateHandler {
        entity_type: EntityType,
        kind: HookKind,
    },

    /// A user-supplied hook failed
    #[error("Handler error: {0}")]
    Handler(String),

    /// The object store rejected a query, save, or delete
    #[error("Store error: {0}")]
    Store(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The event host refused a callback registration
    #[error("Trigger registration error: {0}")]
    TriggerRegistration(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a [`Error::Handler`] from anything displayable.
    ///
    /// Intended for use inside user hooks:
    ///
    /// ```
    /// use trickle_core::Error;
    ///
    /// let err = Error::handler("legacy payload missing `sku`");
    /// assert_eq!(err.to_string(), "Handler error: legacy payload missing `sku`");
    /// ```
    pub fn handler(msg: impl std::fmt::Display) -> Self {
        Error::Handler(msg.to_string())
    }

    /// Build a [`Error::Store`] from anything displayable.
    pub fn store(msg: impl std::fmt::Display) -> Self {
        Error::Store(msg.to_string())
    }
}
