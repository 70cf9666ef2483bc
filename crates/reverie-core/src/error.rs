//! Error types for reverie-core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Uniqueness violated: {0}")]
    Uniqueness(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Invalid rating: {0}")]
    InvalidRating(i64),
}

impl CoreError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        CoreError::Precondition(msg.into())
    }

    pub fn uniqueness(msg: impl Into<String>) -> Self {
        CoreError::Uniqueness(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
