//! Layer models and the network runner for the spinesim simulator
//!
//! Sits between the CLI and the core: parses the layer configuration JSON,
//! derives per-layer geometry, generates the per-site input batches, drives
//! the core through every output site, and writes per-layer statistics.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod conv;
pub mod error;
pub mod fc;
pub mod network;
pub mod summary;

pub use config::{parse_config, parse_config_str, LayerKind, LayerSpec, WeightQuant};
pub use conv::ConvLayer;
pub use error::{ModelError, Result};
pub use fc::FcLayer;
pub use network::{run_network, LayerReport, RunOptions};
pub use summary::{append_cache_summary, append_layer_summary};
