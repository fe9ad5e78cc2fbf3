//! Error types for state_tree

use thiserror::Error;

/// Result type alias for state_tree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur around reconciliation
///
/// Reconciliation itself never fails; these cover conversion, configuration
/// and I/O at the edges.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cyclic value at {path}")]
    Cyclic { path: String },

    #[error("Value of kind {kind} has no JSON representation")]
    Unrepresentable { kind: String },
}
