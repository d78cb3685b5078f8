//! Chunk tasks and their results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender;
use ndarray::Array3;

use crate::chunking::ChunkSpec;
use crate::error::Result;
use crate::pipeline::Pipeline;

/// Everything a worker needs to process one chunk.
///
/// The buffer is an owned copy of the chunk's halo-inclusive rows, never a
/// view into the source image.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub index: usize,
    pub buffer: Array3<f32>,
    pub spec: ChunkSpec,
    pub pipeline: Pipeline,
}

impl ChunkTask {
    /// Run the pipeline over the chunk's slice.
    ///
    /// Returns the full processed slice; the halo is cropped by the
    /// dispatcher.
    pub fn process(&self) -> Result<Array3<f32>> {
        self.pipeline.apply(self.buffer.view())
    }
}

/// Result reported by a worker for one chunk.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub index: usize,
    pub result: Result<Array3<f32>>,
}

/// Shared flag that tells workers to skip chunks they have not started.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A task submitted to a pool along with where to send its outcome.
pub struct Job {
    pub task: ChunkTask,
    pub cancel: CancelToken,
    pub reply: Sender<ChunkOutcome>,
}

impl Job {
    /// Send the outcome back. A closed channel means the dispatcher already
    /// gave up on this invocation, so the result is dropped.
    pub fn complete(self, result: Result<Array3<f32>>) {
        let _ = self.reply.send(ChunkOutcome {
            index: self.task.index,
            result,
        });
    }
}
