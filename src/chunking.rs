//! Row-chunk planning with halo overlap.
//!
//! A chunk is a horizontal band of rows processed on its own. Each 3x3 step
//! corrupts one more row at the band's cut edges, so every band is extended
//! by a halo of extra rows above and below. After processing, the halo is
//! cropped away and only the band's core rows are kept.

use ndarray::{s, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;

/// Row ranges of one chunk.
///
/// `slice_start..slice_end` is the halo-inclusive range handed to a worker,
/// `core_start..core_end` the range kept after cropping.
/// Always `slice_start <= core_start < core_end <= slice_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpec {
    pub slice_start: usize,
    pub core_start: usize,
    pub core_end: usize,
    pub slice_end: usize,
}

impl ChunkSpec {
    /// Rows in the halo-inclusive slice.
    pub fn slice_len(&self) -> usize {
        self.slice_end - self.slice_start
    }

    /// Rows kept after cropping.
    pub fn core_len(&self) -> usize {
        self.core_end - self.core_start
    }

    /// Offset of the first core row inside the slice.
    pub fn halo_top(&self) -> usize {
        self.core_start - self.slice_start
    }

    /// Keep only the core rows of a processed slice.
    ///
    /// # Arguments
    /// * `processed` - Pipeline output for this chunk's slice
    ///
    /// # Returns
    /// View of rows `[halo_top, halo_top + core_len)`
    pub fn crop<'a>(&self, processed: ArrayView3<'a, f32>) -> Result<ArrayView3<'a, f32>> {
        let rows = processed.dim().0;
        if rows != self.slice_len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "chunk slice {}..{} has {} rows after processing, expected {}",
                self.slice_start,
                self.slice_end,
                rows,
                self.slice_len()
            )));
        }
        let top = self.halo_top();
        let bottom = top + self.core_len();
        Ok(processed.slice_move(s![top..bottom, .., ..]))
    }
}

/// Halo rows needed so chunked results match whole-image results.
///
/// Sums the support radius of every step: consecutive neighbourhood steps
/// widen the corrupted border by one ring each. Never less than 1.
pub fn required_halo(pipeline: &Pipeline) -> usize {
    let total: usize = pipeline.steps().iter().map(|s| s.support_radius()).sum();
    total.max(1)
}

/// Split `height` rows into at most `n_chunks` contiguous bands.
///
/// The chunk count is clamped to `height`. Core sizes differ by at most one
/// row: the first `height % n` chunks get the extra row. Each slice extends
/// its core by `halo` rows on both sides, clipped to the image.
///
/// # Arguments
/// * `height` - Image height in rows
/// * `n_chunks` - Requested chunk count
/// * `halo` - Overlap rows added above and below each core
///
/// # Returns
/// Chunk specs in row order; the position is the chunk's index. Empty when
/// `height` or `n_chunks` is zero.
pub fn split_rows(height: usize, n_chunks: usize, halo: usize) -> Vec<ChunkSpec> {
    let n = n_chunks.min(height);
    if n == 0 {
        return Vec::new();
    }

    let base = height / n;
    let extra = height % n;

    let mut chunks = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let size = base + usize::from(i < extra);
        let end = start + size;
        chunks.push(ChunkSpec {
            slice_start: start.saturating_sub(halo),
            core_start: start,
            core_end: end,
            slice_end: end.saturating_add(halo).min(height),
        });
        start = end;
    }

    chunks
}
