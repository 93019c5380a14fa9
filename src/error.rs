use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single network fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("request was dropped before completing")]
    Canceled,

    #[error("{0}")]
    Other(String),
}

/// The watch page did not have the expected structure
#[derive(Debug, Error)]
pub enum PageError {
    #[error("player data not found")]
    PlayerDataNotFound,

    #[error("invalid player data: {0}")]
    InvalidPlayerData(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("no captions available")]
    NoCaptions,

    #[error("caption download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("error parsing caption XML: {0}")]
    Xml(String),
}

/// Any failure below the service boundary
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("invalid YouTube URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Captions(#[from] CaptionError),

    #[error("{0}")]
    Summarize(eyre::Report),
}

/// Operation the service was performing when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchTranscript,
    FetchMetadata,
    Summarize,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::FetchTranscript => write!(f, "Failed to fetch transcript"),
            Operation::FetchMetadata => write!(f, "Failed to fetch video metadata"),
            Operation::Summarize => write!(f, "Failed to generate summary"),
        }
    }
}

/// Error returned by the service façades: one line, operation prefix plus cause
#[derive(Debug, Error)]
#[error("{operation}: {source}")]
pub struct ServiceError {
    pub operation: Operation,
    #[source]
    pub source: VideoError,
}

impl ServiceError {
    pub fn new(operation: Operation, source: impl Into<VideoError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    /// Whether trying again could succeed: only network failures qualify,
    /// not bad URLs or pages without player data
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.source,
            VideoError::Fetch(_) | VideoError::Captions(CaptionError::Fetch(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_message() {
        let err = ServiceError::new(Operation::FetchTranscript, PageError::PlayerDataNotFound);
        assert_eq!(err.to_string(), "Failed to fetch transcript: player data not found");
    }

    #[test]
    fn test_timeout_message_is_single_line() {
        let err = ServiceError::new(
            Operation::FetchMetadata,
            FetchError::Timeout {
                url: "https://www.youtube.com/watch?v=x".to_string(),
                timeout: Duration::from_secs(10),
            },
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to fetch video metadata: request to"));
        assert!(!msg.contains('\n'));
    }

    #[test]
    fn test_only_network_failures_are_retryable() {
        let timeout = || FetchError::Timeout {
            url: "https://www.youtube.com/watch?v=x".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert!(ServiceError::new(Operation::FetchTranscript, timeout()).is_retryable());
        assert!(ServiceError::new(Operation::FetchTranscript, CaptionError::Fetch(timeout())).is_retryable());

        let invalid = VideoError::InvalidUrl("https://www.youtube.com/playlist?list=PL1".to_string());
        assert!(!ServiceError::new(Operation::FetchTranscript, invalid).is_retryable());
        assert!(!ServiceError::new(Operation::FetchMetadata, PageError::PlayerDataNotFound).is_retryable());
        assert!(!ServiceError::new(Operation::FetchTranscript, CaptionError::Xml("bad".to_string())).is_retryable());
    }

    #[test]
    fn test_no_captions_message() {
        let err = VideoError::from(CaptionError::NoCaptions);
        assert_eq!(err.to_string(), "no captions available");
    }
}
