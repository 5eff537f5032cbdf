use thiserror::Error;

/// Crate-wide error taxonomy. Every public trait method in this crate
/// returns `AppResult<T>`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("vector store error: {0}")]
    VectorError(String),

    #[error("analysis cache error: {0}")]
    CacheError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<surrealdb::Error> for AppError {
    fn from(e: surrealdb::Error) -> Self {
        AppError::Internal(format!("surrealdb: {e}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(std::time::Duration::from_secs(0))
        } else {
            AppError::ProviderError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::ParseError(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(format!("io: {e}"))
    }
}

impl From<url::ParseError> for AppError {
    fn from(e: url::ParseError) -> Self {
        AppError::Validation(format!("invalid url: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(std::time::Duration::from_secs(0))
    }
}
