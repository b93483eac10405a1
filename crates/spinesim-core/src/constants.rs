//! Hardware-configured sizes of the modeled accelerator

/// Physical input-spine lanes per core
pub const PHYS_LANES: usize = 16;

/// Entries one physical lane can hold
pub const ISB_ENTRIES: usize = 2048;

/// Capacity of one intermediate FIFO, in entries
pub const FIFO_CAPACITY_ENTRIES: usize = 128;

/// Intermediate FIFOs per core; also the maximum batches per site
pub const MAX_BATCHES: usize = 4;

/// Processing elements per array; also weights per filter row
pub const NUM_PE: usize = 128;

/// Total weight rows resident in the filter buffer
pub const FILTER_ROWS: usize = 4608;

/// Per-tile output buffers per spine
pub const TILES_PER_SPINE: usize = 8;

/// Depth of each per-PE mini FIFO in the tiled output buffer
pub const PE_FIFO_DEPTH: usize = 4;

/// Capacity limit of the per-site output spine buffer
pub const OUTPUT_SPINE_MAX_ENTRIES: usize = 65536;

/// Default total-entry capacity of the output queue
pub const DEFAULT_OUTPUT_QUEUE_CAPACITY: usize = 4096;

/// Tick-cap safety for one site's compute loop
pub const MAX_TICKS_PER_SITE: u64 = 10_000_000;
