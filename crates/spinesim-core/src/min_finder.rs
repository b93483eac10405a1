//! Stage 4: drain the input-spine buffer into the current batch's FIFO

use crate::error::{CoreError, Result};
use crate::fifo::IntermediateFifo;
use crate::input_spine::InputSpineBuffer;

/// What one min-finder tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinFinderOutcome {
    /// Cursor is past the last batch; nothing to do
    PastLastBatch,
    /// The target FIFO was full; stalled without popping
    FifoFull,
    /// One entry moved from the ISB into the batch FIFO
    Pushed,
    /// The ISB ran dry: the batch was marked drained and the cursor advanced
    BatchDrained,
}

/// Shapes the merged input stream into per-batch FIFOs.
///
/// Pinning each batch's stream to its own FIFO preserves per-FIFO
/// monotonicity: the ISB yields non-decreasing timestamps and each batch is
/// drained contiguously.
pub struct MinFinderBatch;

impl MinFinderBatch {
    /// One stage-4 tick for batch `*batch_cursor`.
    ///
    /// The FIFO-full check happens before the pop, so a stalled tick never
    /// loses an entry.
    pub fn run(
        isb: &mut InputSpineBuffer,
        fifos: &mut [IntermediateFifo],
        batch_cursor: &mut i32,
        input_drained: &mut [bool],
        batches_needed: usize,
    ) -> Result<MinFinderOutcome> {
        let cursor = *batch_cursor;
        if cursor >= batches_needed as i32 {
            return Ok(MinFinderOutcome::PastLastBatch);
        }
        if cursor < 0 || cursor as usize >= fifos.len() {
            return Err(CoreError::BatchCursorOutOfRange {
                cursor,
                batches_needed,
            });
        }
        let b = cursor as usize;

        if fifos[b].full() {
            return Ok(MinFinderOutcome::FifoFull);
        }

        match isb.pop_smallest() {
            Some(entry) => {
                if !fifos[b].push(entry) {
                    return Err(CoreError::invariant(
                        "min_finder",
                        "FIFO push failed although not full",
                    ));
                }
                Ok(MinFinderOutcome::Pushed)
            }
            None => {
                if isb.all_empty() {
                    input_drained[b] = true;
                    *batch_cursor = cursor + 1;
                    Ok(MinFinderOutcome::BatchDrained)
                } else {
                    Err(CoreError::invariant(
                        "min_finder",
                        "pop returned nothing while lanes still hold entries",
                    ))
                }
            }
        }
    }
}
