//! Error types shared by the node implementations

use std::path::PathBuf;
use std::time::Duration;

/// Result alias used across the library
pub type NodesResult<T> = Result<T, NodesError>;

/// Failure of a single `lms` invocation
///
/// Every subprocess call maps its failure into one of these variants
/// instead of propagating an I/O error, so callers can decide whether the
/// failure is fatal (loading) or degrades to a fallback (listing).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CliError {
    /// The executable could not be found
    #[error("lms executable not found: {0}")]
    NotFound(String),

    /// The process could not be spawned or its output could not be read
    #[error("failed to run lms: {0}")]
    Spawn(String),

    /// The process did not finish within its timeout
    #[error("lms timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Library error type
#[derive(Debug, thiserror::Error)]
pub enum NodesError {
    #[error(transparent)]
    Cli(#[from] CliError),

    /// The requested file is not present in any searched model folder
    #[error("could not find {name} in any model directory (searched: {})", .searched.join(", "))]
    ModelNotFound { name: String, searched: Vec<String> },

    /// No folder is configured for the requested kind
    #[error("no model folder configured for '{0}'")]
    UnknownFolder(String),

    /// Every load strategy failed for the file
    #[error("could not load model {path:?}: {}", .attempts.join("; "))]
    LoadFailed {
        path: PathBuf,
        attempts: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
