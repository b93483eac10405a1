//! Error types for the accelerator core

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur inside the pipeline and its controller.
///
/// Invariant violations indicate a simulator bug, not a workload problem;
/// callers are expected to abort on them.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage layer error
    #[error("Storage error: {source}")]
    Storage {
        #[from]
        /// Source storage error
        source: spinesim_storage::StorageError,
    },

    /// More spine ids in a batch than physical lanes
    #[error("Invalid batch: {spines} spine ids for {lanes} physical lanes")]
    InvalidBatch {
        /// Spine ids supplied
        spines: usize,
        /// Physical lanes available
        lanes: usize,
    },

    /// Internal pipeline invariant broken
    #[error("Invariant violation in {stage}: {reason}")]
    Invariant {
        /// Pipeline stage that detected the violation
        stage: &'static str,
        /// What was violated
        reason: String,
    },

    /// Batch cursor outside the FIFO array
    #[error("Batch cursor {cursor} out of range (batches needed: {batches_needed})")]
    BatchCursorOutOfRange {
        /// Offending cursor value
        cursor: i32,
        /// Batches needed for the current site
        batches_needed: usize,
    },

    /// Output spine buffer capacity exceeded
    #[error("Output spine capacity exceeded: {capacity} entries")]
    OutputSpineFull {
        /// Configured capacity limit
        capacity: usize,
    },

    /// Invalid configuration handed to a pipeline component
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },
}

impl CoreError {
    /// Create an invariant violation error
    pub fn invariant(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Invariant {
            stage,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}
