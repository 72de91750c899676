//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while calling the model
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Check if another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => is_retryable_status(*status),
            LlmError::Network(_) => true,
            LlmError::InvalidResponse(_) | LlmError::Config(_) | LlmError::Json(_) => false,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// HTTP statuses worth another attempt
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );

        assert!(
            LlmError::ApiError {
                status: 503,
                message: "Unavailable".to_string()
            }
            .is_retryable()
        );

        assert!(
            LlmError::ApiError {
                status: 408,
                message: "Request timeout".to_string()
            }
            .is_retryable()
        );

        // 4xx errors other than 408/429 are final
        assert!(
            !LlmError::ApiError {
                status: 401,
                message: "Unauthorized".to_string()
            }
            .is_retryable()
        );

        assert!(!LlmError::InvalidResponse("no choices".to_string()).is_retryable());
        assert!(!LlmError::Config("missing key".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));

        let err = LlmError::ApiError {
            status: 500,
            message: "Server error".to_string(),
        };
        assert_eq!(err.retry_after(), None);
    }
}
