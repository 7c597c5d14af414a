/// Errors raised while fetching crash data.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or the body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The request could not be built (bad URL, bad credential value).
    #[error("invalid request: {0}")]
    Request(String),

    /// The response arrived but was not a crash batch.
    #[error("could not decode crash data: {0}")]
    Decode(String),

    /// Reading a local source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transient failures persisted through every retry.
    #[error("upstream unavailable after {attempts} attempts: {message}")]
    Upstream { attempts: u32, message: String },

    /// The background fetch task panicked.
    #[error("fetch task failed: {0}")]
    Task(String),
}

impl FetchError {
    /// Whether retrying the same request might succeed: connection
    /// failures, timeouts, HTTP 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            FetchError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Whether the remote source could not be reached or refused to serve,
    /// as opposed to serving something unreadable.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            FetchError::Upstream { .. } | FetchError::Http(_) | FetchError::Status { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> FetchError {
        FetchError::Status {
            status: code,
            url: "https://example.test".to_string(),
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
        assert!(status(404).is_upstream_failure());
    }

    #[test]
    fn test_decode_is_not_upstream() {
        let err = FetchError::Decode("not json".to_string());
        assert!(!err.is_transient());
        assert!(!err.is_upstream_failure());
    }
}
