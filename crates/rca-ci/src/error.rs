//! Error types for rca-ci

use thiserror::Error;

/// Errors raised while constructing collaborators.
#[derive(Error, Debug)]
pub enum CiError {
    /// A step or artifact glob failed to compile
    #[error("invalid glob pattern {pattern:?}: {message}")]
    InvalidGlob { pattern: String, message: String },

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Required setting is missing or malformed
    #[error("invalid setting {name}: {message}")]
    InvalidSetting { name: String, message: String },
}

impl From<reqwest::Error> for CiError {
    fn from(err: reqwest::Error) -> Self {
        CiError::HttpClient(err.to_string())
    }
}

/// Result type for rca-ci constructors
pub type Result<T> = std::result::Result<T, CiError>;
