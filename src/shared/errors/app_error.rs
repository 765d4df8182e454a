use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Provider is rate-limited or unhealthy; recoverable via the fallback chain.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider gave no response within the deadline; excluded from the
    /// current request and not retried inside it.
    #[error("Provider timeout: {0}")]
    ProviderTimeout(String),

    /// Not enough agreeing sources. Callers see an absent value, never a default.
    #[error("Consensus failure: {0}")]
    ConsensusFailure(String),

    /// A stored cache entry could not be decoded; treated as a miss.
    #[error("Cache corruption: {0}")]
    CacheCorruption(String),

    /// Missing or invalid provider setup; fatal for the affected category.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::ProviderTimeout("request timed out".to_string())
        } else if err.is_connect() {
            AppError::ProviderUnavailable("failed to connect to provider".to_string())
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                429 => AppError::ProviderUnavailable("too many requests".to_string()),
                _ => AppError::ApiError(format!("HTTP {}: {}", status, err)),
            }
        } else {
            AppError::ApiError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::CacheError(err.to_string())
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
