//! Error types for layer models and the network runner

use thiserror::Error;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while configuring or running layers
#[derive(Error, Debug)]
pub enum ModelError {
    /// Core pipeline error
    #[error("Core error: {source}")]
    Core {
        #[from]
        /// Source core error
        source: spinesim_core::CoreError,
    },

    /// Storage layer error
    #[error("Storage error: {source}")]
    Storage {
        #[from]
        /// Source storage error
        source: spinesim_storage::StorageError,
    },

    /// Invalid layer configuration
    #[error("Configuration error at layer {layer}: {reason}")]
    Config {
        /// Layer id the error refers to
        layer: i64,
        /// Reason for the configuration error
        reason: String,
    },

    /// Configuration JSON could not be parsed
    #[error("Configuration parse error: {source}")]
    ConfigParse {
        #[from]
        /// Source JSON error
        source: serde_json::Error,
    },

    /// A site's compute loop never quiesced
    #[error("Layer {layer} site ({h_out}, {w_out}) exceeded {ticks} ticks without quiescing")]
    QuiescenceTimeout {
        /// Layer id
        layer: u32,
        /// Output row of the stuck site
        h_out: usize,
        /// Output column of the stuck site
        w_out: usize,
        /// Tick cap that was hit
        ticks: u64,
    },

    /// Statistics CSV error
    #[error("CSV error: {source}")]
    Csv {
        #[from]
        /// Source CSV error
        source: csv::Error,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Source I/O error
        source: std::io::Error,
    },
}

impl ModelError {
    /// Create a configuration error for one layer
    pub fn config(layer: i64, reason: impl Into<String>) -> Self {
        Self::Config {
            layer,
            reason: reason.into(),
        }
    }
}
