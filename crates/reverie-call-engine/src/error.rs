//! Error types for the call orchestration engine
//!
//! The engine-level taxonomy mirrors how failures are handled: validation
//! and uniqueness problems are reported to the caller and never retried,
//! adapter failures carry their own transient/permanent split, and anything
//! else is an orchestration fault caught at the task boundary.

use reverie_adapters::AdapterError;
use reverie_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Uniqueness violated: {0}")]
    Uniqueness(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Orchestration error: {0}")]
    Orchestration(String),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),
}

impl EngineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }

    pub fn database(msg: impl std::fmt::Display) -> Self {
        EngineError::Database(msg.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        EngineError::Session(msg.into())
    }

    pub fn orchestration(msg: impl Into<String>) -> Self {
        EngineError::Orchestration(msg.into())
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Uniqueness(msg) => EngineError::Uniqueness(msg),
            other => EngineError::Validation(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let message = db.message();
            if message.contains("UNIQUE constraint failed") {
                return EngineError::Uniqueness(message.to_string());
            }
        }
        EngineError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Database(format!("snapshot encoding: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_uniqueness_maps_through() {
        let err: EngineError = CoreError::uniqueness("duplicate entry").into();
        assert!(matches!(err, EngineError::Uniqueness(_)));

        let err: EngineError = CoreError::precondition("bad phone").into();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn adapter_errors_wrap() {
        let err: EngineError = AdapterError::transient("stt down").into();
        assert!(matches!(err, EngineError::Adapter(AdapterError::Transient(_))));
    }
}
