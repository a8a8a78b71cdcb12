use crate::retry::Interrupted;

/// Failure signals raised by the query channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The endpoint answered with HTTP 429
    #[error("rate limited by the query endpoint")]
    RateLimited,

    /// The endpoint rejected the query (HTTP 400), or the identifier could not be embedded
    #[error("malformed query: {0}")]
    MalformedRequest(String),

    /// Any other network, HTTP or decoding failure
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("retry deadline exceeded")]
    DeadlineExceeded,
}

impl QueryError {
    /// Only rate limiting is worth retrying; everything else fails the same way twice.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::RateLimited)
    }
}

impl From<Interrupted> for QueryError {
    fn from(reason: Interrupted) -> Self {
        match reason {
            Interrupted::Cancelled => QueryError::Cancelled,
            Interrupted::DeadlineExceeded => QueryError::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(QueryError::RateLimited.is_retryable());
        assert!(!QueryError::MalformedRequest("bad".to_string()).is_retryable());
        assert!(!QueryError::Transport("reset".to_string()).is_retryable());
        assert!(!QueryError::Cancelled.is_retryable());
        assert!(!QueryError::DeadlineExceeded.is_retryable());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            QueryError::MalformedRequest("Lexical error at line 1".to_string()).to_string(),
            "malformed query: Lexical error at line 1"
        );
        assert_eq!(
            QueryError::Transport("HTTP 503".to_string()).to_string(),
            "transport failure: HTTP 503"
        );
    }

    #[test]
    fn test_from_interrupted() {
        assert_eq!(QueryError::from(Interrupted::Cancelled), QueryError::Cancelled);
        assert_eq!(
            QueryError::from(Interrupted::DeadlineExceeded),
            QueryError::DeadlineExceeded
        );
    }
}
