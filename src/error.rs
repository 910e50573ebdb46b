//! Error types for load test setup and sampling.

use thiserror::Error;

/// Result type alias using LoadTestError.
pub type LoadTestResult<T> = Result<T, LoadTestError>;

/// Primary error type for session setup and sampling.
///
/// All of these are fatal for the run: a misconfigured target invalidates
/// every session identically, so the caller aborts instead of retrying.
#[derive(Debug, Error)]
pub enum LoadTestError {
    /// Invalid static parameters (degenerate extent, non-positive area or ratio).
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The requested sample cannot fit inside the supplied extent or bounds.
    #[error("Requested sample cannot fit: {0}")]
    Range(String),

    /// A user-specified layer is absent from the service.
    #[error("Layer '{name}' not found. Available layers: {available:?}")]
    LayerNotFound { name: String, available: Vec<String> },

    /// A user-specified tile matrix set is not linked by the chosen layer.
    #[error("Tile matrix set '{name}' is not available for layer '{layer}'. Available sets: {available:?}")]
    TileMatrixSetNotFound {
        name: String,
        layer: String,
        available: Vec<String>,
    },

    /// A user-specified tile matrix is absent from the chosen set.
    #[error("Tile matrix '{name}' not found in set '{set}'. Available matrices: {available:?}")]
    TileMatrixNotFound {
        name: String,
        set: String,
        available: Vec<String>,
    },

    /// The capabilities document is malformed or missing required metadata.
    #[error("Capabilities document error: {0}")]
    Capabilities(String),
}
