use std::error::Error;
use std::fmt;

/// Error type for chain peer requests
#[derive(Debug)]
pub enum PeerError {
    /// Error from the reqwest HTTP client
    HttpError(reqwest::Error),
    /// Error parsing JSON
    JsonError(serde_json::Error),
    /// Peer answered with an error status
    ApiError(String),
    /// Peer answered with an unexpected body
    ResponseError(String),
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::HttpError(e) => write!(f, "HTTP error: {}", e),
            PeerError::JsonError(e) => write!(f, "JSON error: {}", e),
            PeerError::ApiError(msg) => write!(f, "Peer error: {}", msg),
            PeerError::ResponseError(msg) => write!(f, "Response error: {}", msg),
        }
    }
}

impl Error for PeerError {}

impl From<reqwest::Error> for PeerError {
    fn from(error: reqwest::Error) -> Self {
        PeerError::HttpError(error)
    }
}

impl From<serde_json::Error> for PeerError {
    fn from(error: serde_json::Error) -> Self {
        PeerError::JsonError(error)
    }
}
