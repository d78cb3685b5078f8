//! Chunk dispatch and reassembly.
//!
//! One invocation moves through these stages:
//!
//! ```text
//! Planning -> Dispatching -> AwaitingAll -> Reordering -> Cropping -> Assembled
//! ```
//!
//! Workers may finish in any order. Results are sorted back into row order
//! by chunk index before the halos are cropped and the cores stacked. The
//! call blocks until every chunk is back or the first failure arrives; on a
//! failure the remaining chunks are cancelled if they have not started and
//! discarded if they have.

use crossbeam::channel;
use ndarray::{concatenate, s, Array3, ArrayView3, Axis};
use tracing::{debug, warn};

use crate::chunking::{split_rows, ChunkSpec};
use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::pool::WorkerPool;
use crate::task::{CancelToken, ChunkTask, Job};

/// A processed chunk tagged with its position in the plan.
#[derive(Debug, Clone)]
pub struct ProcessedChunk {
    pub index: usize,
    pub buffer: Array3<f32>,
}

/// Run `pipeline` over `image` in `chunks` row bands on `pool`.
///
/// # Arguments
/// * `pool` - Pool that executes the chunk tasks
/// * `image` - Grayscale source image (height, width, 1)
/// * `pipeline` - Steps applied to every chunk
/// * `chunks` - Requested chunk count, clamped to the image height
/// * `halo` - Overlap rows around each chunk core
///
/// # Returns
/// Reassembled image with the same height as `image`
pub fn dispatch(
    pool: &dyn WorkerPool,
    image: ArrayView3<f32>,
    pipeline: &Pipeline,
    chunks: usize,
    halo: usize,
) -> Result<Array3<f32>> {
    let height = image.dim().0;
    let specs = split_rows(height, chunks, halo);
    debug!(height, chunks = specs.len(), halo, backend = %pool.backend(), "planned chunks");

    if specs.is_empty() {
        return Ok(image.to_owned());
    }

    let (reply, results) = channel::unbounded();
    let cancel = CancelToken::new();

    for (index, spec) in specs.iter().enumerate() {
        let task = ChunkTask {
            index,
            buffer: image.slice(s![spec.slice_start..spec.slice_end, .., ..]).to_owned(),
            spec: *spec,
            pipeline: pipeline.clone(),
        };
        let job = Job {
            task,
            cancel: cancel.clone(),
            reply: reply.clone(),
        };
        if let Err(e) = pool.submit(job) {
            cancel.cancel();
            return Err(e);
        }
    }
    // Only jobs hold senders now: if they all vanish, recv fails instead of hanging.
    drop(reply);
    debug!(submitted = specs.len(), "awaiting chunks");

    let mut processed = Vec::with_capacity(specs.len());
    while processed.len() < specs.len() {
        match results.recv() {
            Ok(outcome) => match outcome.result {
                Ok(buffer) => processed.push(ProcessedChunk {
                    index: outcome.index,
                    buffer,
                }),
                Err(e) => {
                    cancel.cancel();
                    warn!(chunk = outcome.index, error = %e, "chunk failed, aborting invocation");
                    return Err(into_worker_failure(outcome.index, e));
                }
            },
            Err(_) => {
                cancel.cancel();
                return Err(PipelineError::WorkerFailure {
                    index: None,
                    message: format!(
                        "pool dropped results: {} of {} chunks returned",
                        processed.len(),
                        specs.len()
                    ),
                });
            }
        }
    }

    let assembled = reassemble(processed, &specs)?;
    debug!(rows = assembled.dim().0, "assembled");
    Ok(assembled)
}

fn into_worker_failure(index: usize, error: PipelineError) -> PipelineError {
    match error {
        e @ PipelineError::WorkerFailure { .. } => e,
        other => PipelineError::worker(index, other.to_string()),
    }
}

/// Restore row order, crop halos and stack the chunk cores.
///
/// # Arguments
/// * `chunks` - Processed chunks in any order, exactly one per spec
/// * `specs` - The plan the chunks were cut from, in row order
///
/// # Returns
/// The cores concatenated along the row axis
pub fn reassemble(mut chunks: Vec<ProcessedChunk>, specs: &[ChunkSpec]) -> Result<Array3<f32>> {
    if chunks.len() != specs.len() {
        return Err(PipelineError::ShapeMismatch(format!(
            "expected {} chunks, got {}",
            specs.len(),
            chunks.len()
        )));
    }

    chunks.sort_by_key(|c| c.index);

    let mut cores = Vec::with_capacity(chunks.len());
    for (position, (chunk, spec)) in chunks.iter().zip(specs).enumerate() {
        if chunk.index != position {
            return Err(PipelineError::ShapeMismatch(format!(
                "chunk {} is missing or duplicated",
                position
            )));
        }
        cores.push(spec.crop(chunk.buffer.view())?);
    }

    concatenate(Axis(0), &cores)
        .map_err(|e| PipelineError::ShapeMismatch(format!("cannot stack chunk cores: {}", e)))
}
