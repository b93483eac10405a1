//! Error handling for the spinesim CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] spinesim_storage::StorageError),

    /// Core pipeline error
    #[error("Core error: {0}")]
    Core(#[from] spinesim_core::CoreError),

    /// Model / runner error
    #[error("Model error: {0}")]
    Model(#[from] spinesim_model::ModelError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("Error: {0}")]
    Generic(#[from] anyhow::Error),
}
