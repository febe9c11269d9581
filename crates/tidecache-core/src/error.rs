use thiserror::Error;

/// Failure of a single remote fetch, as reported by an injected fetch function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Classify an HTTP-style status code returned by the backend.
    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 => FetchError::Unauthorized,
            403 => FetchError::AccessDenied(truncated),
            404 => FetchError::NotFound(truncated),
            429 => FetchError::RateLimited,
            500..=599 => FetchError::Server(truncated),
            _ => FetchError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }
}

/// Errors surfaced by explicit sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No signed-in identity available")]
    IdentityMissing,

    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Write failed: {0}")]
    Write(#[source] anyhow::Error),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_rate_limit() {
        assert_eq!(FetchError::from_status(429, "slow down"), FetchError::RateLimited);
        assert!(FetchError::from_status(429, "").is_rate_limited());
    }

    #[test]
    fn test_from_status_maps_server_errors() {
        match FetchError::from_status(503, "unavailable") {
            FetchError::Server(body) => assert_eq!(body, "unavailable"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(FetchError::from_status(401, ""), FetchError::Unauthorized);
    }

    #[test]
    fn test_from_status_truncates_long_bodies() {
        let body = "x".repeat(2000);
        match FetchError::from_status(404, &body) {
            FetchError::NotFound(msg) => {
                assert!(msg.starts_with(&"x".repeat(500)));
                assert!(msg.ends_with("(truncated, 2000 total bytes)"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = FetchError::truncate_body(&body);
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_unknown_status_is_invalid_response() {
        match FetchError::from_status(418, "teapot") {
            FetchError::InvalidResponse(msg) => assert_eq!(msg, "Status 418: teapot"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
