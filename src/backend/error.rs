//! Errors raised by vector-database backends.
//!
//! These surface to clients as JSON-RPC `-32000` tool execution errors, so
//! messages stay short and never include request bodies.

use thiserror::Error;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur while talking to the vector database.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The HTTP request to the backend failed.
    #[error("request to vector database failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error status.
    #[error("vector database returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// The requested collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// The backend answered with a body we could not interpret.
    #[error("invalid response from vector database: {0}")]
    InvalidResponse(String),

    /// The backend client could not be configured.
    #[error("invalid backend configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let error = BackendError::Api {
            status: 422,
            message: "bad embeddings".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("422"));
        assert!(msg.contains("bad embeddings"));
    }

    #[test]
    fn not_found_display() {
        let error = BackendError::CollectionNotFound("docs".to_string());
        assert_eq!(error.to_string(), "collection not found: docs");
    }
}
