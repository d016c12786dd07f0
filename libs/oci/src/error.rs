//! Error types for the OCI wire layer.

use thiserror::Error;

/// Errors from blob client and codec operations.
#[derive(Debug, Error)]
pub enum OciError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Manifest or blob not found in the registry (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The registry refused the request (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Registry returned an unexpected status code.
    #[error("unexpected status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Digest mismatch between expected and recomputed content.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Manifest body failed structural decoding.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// The manifest response carried no `Docker-Content-Digest` header.
    #[error("registry response is missing the Docker-Content-Digest header")]
    MissingDigestHeader,

    /// The manifest media type is not supported by this registry profile.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
}
