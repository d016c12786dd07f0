//! Error types for the restore engine.
//!
//! Per-reference failures during a batch restore are stored and surfaced as
//! diagnostics rather than raised, so every variant is `Clone` and carries
//! owned strings instead of error sources.

use thiserror::Error;

use bicep_oci::OciError;

/// Errors raised by reference parsing, restore, and publish operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    /// Reference string failed to parse.
    #[error("malformed module reference: {0}")]
    Malformed(String),

    /// The reference scheme is not valid for the invoked operation.
    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    /// OCI registry support is behind a disabled feature flag.
    #[error("registry references require the experimental registry feature to be enabled")]
    FeatureDisabled,

    /// The registry has no manifest for the reference.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// The artifact exists but is not a Bicep module.
    #[error("artifact is not a Bicep module: {0}")]
    NotABicepModule(String),

    /// Digest verification failed.
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityError { expected: String, actual: String },

    /// Manifest body failed structural decoding.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Network failure other than not-found.
    #[error("registry transport failure: {0}")]
    Transport(String),

    /// Filesystem failure while populating the cache.
    #[error("local I/O failure: {0}")]
    LocalIo(String),

    /// The scheduler no longer accepts requests.
    #[error("restore scheduler already disposed")]
    AlreadyDisposed,

    /// Anything else, with the original description preserved.
    #[error("unhandled restore failure: {0}")]
    Unhandled(String),
}

impl RestoreError {
    /// Map a wire-layer failure onto a diagnostic kind.
    pub fn from_oci(err: OciError) -> Self {
        match err {
            OciError::DigestMismatch { expected, actual } => {
                RestoreError::IntegrityError { expected, actual }
            }
            OciError::InvalidManifest(detail) => RestoreError::InvalidManifest(detail),
            OciError::NotFound(what) => RestoreError::ModuleNotFound(what),
            OciError::Http(e) => RestoreError::Transport(e.to_string()),
            OciError::Forbidden(_)
            | OciError::UnexpectedStatus { .. }
            | OciError::MissingDigestHeader => RestoreError::Transport(err.to_string()),
            OciError::UnsupportedMediaType(_) => RestoreError::Unhandled(err.to_string()),
        }
    }
}

impl From<std::io::Error> for RestoreError {
    fn from(err: std::io::Error) -> Self {
        RestoreError::LocalIo(err.to_string())
    }
}

/// Result type alias for restore operations.
pub type Result<T> = std::result::Result<T, RestoreError>;
