//! Cloud control-plane error types

use thiserror::Error;

/// Errors returned by a [`CloudApi`](crate::CloudApi) implementation
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Control plane unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the failure may go away on its own (network, overloaded API)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CloudError::ApiError(_) | CloudError::Unavailable(_) | CloudError::Timeout(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
