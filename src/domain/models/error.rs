use serde_json::Value;
use thiserror::Error;

/// Failures surfaced by the request executor and stored on cache entries.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RequestError {
    /// No response was received from the API.
    #[error("network request failed: {0}")]
    Network(String),

    /// The API responded with a non-2xx status. The body is kept verbatim so
    /// field level validation messages can be displayed.
    #[error("api responded with status {status}: {body}")]
    Api { status: u16, body: Value },

    #[error("failed to decode api response: {0}")]
    Decode(String),

    /// The request could not be built from the caller's arguments.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        if let RequestError::Api { status, .. } = self {
            return Some(*status);
        }

        return None;
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io failed for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode value for storage: {0}")]
    Encode(#[from] serde_json::Error),
}
