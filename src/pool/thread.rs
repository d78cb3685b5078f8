//! Shared-memory pool backed by a dedicated rayon thread pool.

use std::panic::{self, AssertUnwindSafe};

use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};
use tracing::warn;

use super::{Backend, InFlight, WorkerPool};
use crate::error::{PipelineError, Result};
use crate::task::Job;

/// Runs each chunk task on a rayon worker thread.
///
/// Tasks own private copies of their rows, so workers never share pixel
/// data and no locking is needed on it.
pub struct ThreadPool {
    pool: rayon::ThreadPool,
    workers: usize,
    in_flight: InFlight,
}

impl ThreadPool {
    pub fn new(workers: usize) -> std::result::Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("halo-worker-{}", i))
            .build()?;

        Ok(Self {
            pool,
            workers,
            in_flight: InFlight::default(),
        })
    }
}

impl WorkerPool for ThreadPool {
    fn backend(&self) -> Backend {
        Backend::Threads
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn submit(&self, job: Job) -> Result<()> {
        let in_flight = self.in_flight.clone();
        in_flight.start();

        self.pool.spawn(move || {
            if !job.cancel.is_cancelled() {
                let index = job.task.index;
                // rayon aborts the process on a panicking spawned job
                let result = panic::catch_unwind(AssertUnwindSafe(|| job.task.process()))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        warn!(chunk = index, %message, "worker thread panicked");
                        Err(PipelineError::worker(index, format!("panicked: {}", message)))
                    });
                job.complete(result);
            }
            in_flight.finish();
        });

        Ok(())
    }

    fn drain(&self) {
        self.in_flight.wait_idle();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.in_flight.wait_idle();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkSpec;
    use crate::pipeline::Pipeline;
    use crate::task::{CancelToken, ChunkTask};
    use ndarray::Array3;

    fn job(index: usize, cancel: &CancelToken, reply: &crossbeam::channel::Sender<crate::task::ChunkOutcome>) -> Job {
        Job {
            task: ChunkTask {
                index,
                buffer: Array3::from_elem((2, 3, 1), index as f32),
                spec: ChunkSpec { slice_start: 0, core_start: 0, core_end: 2, slice_end: 2 },
                pipeline: "brightness:1".parse().unwrap(),
            },
            cancel: cancel.clone(),
            reply: reply.clone(),
        }
    }

    #[test]
    fn test_thread_pool_runs_all_jobs() {
        let pool = ThreadPool::new(3).unwrap();
        let (tx, rx) = crossbeam::channel::unbounded();
        let cancel = CancelToken::new();

        for i in 0..8 {
            pool.submit(job(i, &cancel, &tx)).unwrap();
        }
        drop(tx);

        let mut indices: Vec<usize> = rx
            .iter()
            .map(|outcome| {
                let buf = outcome.result.unwrap();
                assert_eq!(buf[[0, 0, 0]], outcome.index as f32 + 1.0);
                outcome.index
            })
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());

        pool.drain();
        assert_eq!(pool.in_flight.pending(), 0);
    }

    #[test]
    fn test_cancelled_jobs_are_skipped() {
        let pool = ThreadPool::new(1).unwrap();
        let (tx, rx) = crossbeam::channel::unbounded();
        let cancel = CancelToken::new();
        cancel.cancel();

        pool.submit(job(0, &cancel, &tx)).unwrap();
        drop(tx);
        pool.drain();

        assert!(rx.iter().next().is_none());
    }

    #[test]
    fn test_shape_error_is_reported() {
        let pool = ThreadPool::new(1).unwrap();
        let (tx, rx) = crossbeam::channel::unbounded();
        let mut bad = job(0, &CancelToken::new(), &tx);
        bad.task.buffer = Array3::zeros((2, 2, 2));
        bad.task.pipeline = Pipeline::new(vec![crate::pipeline::FilterStep::Sobel]);

        pool.submit(bad).unwrap();
        let outcome = rx.recv().unwrap();

        assert!(matches!(outcome.result, Err(PipelineError::ShapeMismatch(_))));
    }
}
