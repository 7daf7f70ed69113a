//! Error types for Spendlens

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("AI configuration error: {0}")]
    AiConfiguration(String),
}

/// Record-level problems that reject a whole batch during normalization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("transaction {index}: unsupported currency '{found}', expected {expected}")]
    UnsupportedCurrency {
        index: usize,
        found: String,
        expected: String,
    },

    #[error("transaction {index}: missing timestamp field 'ts'")]
    MissingTimestamp { index: usize },

    #[error("transaction {index}: invalid timestamp '{value}'")]
    InvalidTimestamp { index: usize, value: String },

    #[error("transaction {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

impl Error {
    /// True for errors that reject the input batch (as opposed to I/O or AI failures)
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
