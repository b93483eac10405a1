//! Event-driven pipeline model of the spike-stream convolution accelerator
//!
//! The accelerator executes one layer for one output site at a time by
//! streaming timestamped spike entries through a fixed-function pipeline:
//! physical input-spine lanes feed per-batch FIFOs through a minimum-timestamp
//! finder, a global merger hands the smallest live entry plus its weight row
//! to a bank of 128 integrate-fire-reset processing elements, and produced
//! spikes are collected, tile-sorted and written back as a linear output
//! spine.
//!
//! Every stage is a plain struct; one synchronous tick runs each stage once
//! in fixed order. Concurrency is emulated with one-deep latches and a
//! valid/ready handshake, so no threads and no locks are involved.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod clock;
pub mod constants;
pub mod core;
pub mod cost;
pub mod error;
pub mod fifo;
pub mod filter;
pub mod input_spine;
pub mod lut;
pub mod merger;
pub mod min_finder;
pub mod output_queue;
pub mod output_spine;
pub mod pe;
pub mod pe_array;
pub mod picker;
pub mod provider;
pub mod stats;
pub mod tiled_output;

pub use crate::core::{Core, CoreParams};
pub use cache::{CacheConfig, CacheSim, CacheStats, EvictionPolicy, LineAddr};
pub use clock::{ClockCore, PipelineSignals};
pub use cost::{IoShadow, MemTiming};
pub use error::{CoreError, Result};
pub use fifo::IntermediateFifo;
pub use filter::FilterBuffer;
pub use input_spine::InputSpineBuffer;
pub use lut::WeightLut;
pub use merger::GlobalMerger;
pub use min_finder::{MinFinderBatch, MinFinderOutcome};
pub use output_queue::{LinePacket, OutputQueue};
pub use output_spine::{OutputSorter, OutputSpine};
pub use pe::Pe;
pub use pe_array::PeArray;
pub use picker::SmallestTsPicker;
pub use provider::InputWeightProvider;
pub use stats::{LayerCycleStats, StageStats};
pub use tiled_output::TiledOutputBuffer;

pub use spinesim_storage::Entry;
