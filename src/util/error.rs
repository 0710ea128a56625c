//! Error types for the lightmap baker.

use thiserror::Error;

/// Main error type for baking operations.
///
/// Geometric degeneracy, packing failures and ray misses are not errors:
/// they are skipped, logged and counted in the bake statistics instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The bake was cancelled through the progress collaborator
    #[error("Bake cancelled")]
    Cancelled,

    /// Growing photon storage failed
    #[error("Photon storage exhausted: {0}")]
    PhotonStorage(String),

    /// Photon dump file is truncated or malformed
    #[error("Invalid photon dump: {0}")]
    InvalidPhotonDump(String),

    /// An evicted buffer could not be written out or read back
    #[error("Swap failed: {0}")]
    Swap(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a swap error.
    pub fn swap(msg: impl Into<String>) -> Self {
        Self::Swap(msg.into())
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(e: std::collections::TryReserveError) -> Self {
        Self::PhotonStorage(e.to_string())
    }
}

/// Result type alias for baking operations.
pub type Result<T> = std::result::Result<T, Error>;
