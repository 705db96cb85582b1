//! Error types for each layer of the pipeline

use thiserror::Error;

/// HTTP statuses that will not change on a retry
const TERMINAL_STATUSES: [u16; 4] = [400, 401, 403, 404];

/// Failure of an outward HTTP call
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("{0} not configured")]
    NotConfigured(&'static str),
}

impl FetchError {
    /// Whether another attempt could succeed
    ///
    /// 400/401/403/404 are terminal, any other status is retryable, as are
    /// transport failures and timeouts. Decode and configuration errors are
    /// terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => !TERMINAL_STATUSES.contains(status),
            FetchError::Transport(_) | FetchError::Timeout => true,
            FetchError::Decode(_) | FetchError::NotConfigured(_) => false,
        }
    }

    /// HTTP status, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short message suitable for a toast or status line
    pub fn user_message(&self) -> String {
        match self.status() {
            Some(status) if status >= 500 => "Server error. Please try again later.".to_string(),
            Some(429) => "Too many requests. Please wait before trying again.".to_string(),
            Some(404) => "Resource not found.".to_string(),
            Some(status) if status >= 400 => "Request failed. Please check your input.".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Webhook payload rejected before it reaches storage
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Storage backend failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Hosted store error: {0}")]
    Remote(#[from] FetchError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    Invalid(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Address could not be generated
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid local part: {0}")]
    InvalidLocalPart(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> FetchError {
        FetchError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_client_errors_are_terminal() {
        for code in [400, 401, 403, 404] {
            assert!(!status(code).is_retryable(), "{} should be terminal", code);
        }
    }

    #[test]
    fn test_other_failures_are_retryable() {
        for code in [405, 408, 409, 422, 429, 500, 502, 503] {
            assert!(status(code).is_retryable(), "{} should be retryable", code);
        }
        assert!(FetchError::Transport("connection reset".into()).is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(!FetchError::Decode("eof".into()).is_retryable());
        assert!(!FetchError::NotConfigured("Mailsac API key").is_retryable());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(status(503).user_message(), "Server error. Please try again later.");
        assert_eq!(
            status(429).user_message(),
            "Too many requests. Please wait before trying again."
        );
        assert_eq!(status(404).user_message(), "Resource not found.");
        assert_eq!(status(401).user_message(), "Request failed. Please check your input.");
        assert_eq!(FetchError::Timeout.user_message(), "Request timed out");
    }

    #[test]
    fn test_missing_fields_message() {
        let err = IngestError::MissingFields(vec!["to", "text"]);
        assert_eq!(err.to_string(), "Missing required fields: to, text");
    }
}
