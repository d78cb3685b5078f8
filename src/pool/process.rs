//! Isolated pool of `halo-worker` child processes.
//!
//! Each child is owned by a feeder thread. Feeders pull jobs from one shared
//! queue, write the task frame to their child's stdin and block on the
//! result frame from its stdout. Nothing but frames crosses the boundary, so
//! a crashing child cannot touch the coordinator's memory.

use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

use super::{Backend, InFlight, WorkerPool};
use crate::error::{PipelineError, Result};
use crate::task::Job;
use crate::wire::{encode_frame, read_frame, write_encoded, ResultFrame, TaskFrame};

pub struct ProcessPool {
    jobs: Option<Sender<Job>>,
    backlog: Receiver<Job>,
    feeders: Vec<JoinHandle<()>>,
    workers: usize,
    alive: Arc<AtomicUsize>,
    in_flight: InFlight,
}

impl ProcessPool {
    /// Start `workers` children of `program`.
    ///
    /// Fails if any child cannot be started; children already started are
    /// shut down again.
    pub fn spawn(program: &Path, workers: usize) -> io::Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        let alive = Arc::new(AtomicUsize::new(0));
        let in_flight = InFlight::default();

        let mut pool = Self {
            jobs: Some(tx),
            backlog: rx.clone(),
            feeders: Vec::with_capacity(workers),
            workers,
            alive: alive.clone(),
            in_flight: in_flight.clone(),
        };

        for id in 0..workers {
            let mut child = Command::new(program)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()?;

            let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
                (Some(stdin), Some(stdout)) => (stdin, stdout),
                _ => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "worker pipes unavailable"));
                }
            };

            alive.fetch_add(1, Ordering::SeqCst);
            let feeder = Feeder {
                id,
                child,
                stdin: BufWriter::new(stdin),
                stdout: BufReader::new(stdout),
                jobs: rx.clone(),
                alive: alive.clone(),
                in_flight: in_flight.clone(),
            };

            let handle = std::thread::Builder::new()
                .name(format!("halo-feeder-{}", id))
                .spawn(move || feeder.run())?;
            pool.feeders.push(handle);
        }

        debug!(workers, program = %program.display(), "worker processes started");
        Ok(pool)
    }
}

impl WorkerPool for ProcessPool {
    fn backend(&self) -> Backend {
        Backend::Processes
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn submit(&self, job: Job) -> Result<()> {
        let index = job.task.index;
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| PipelineError::worker(index, "pool is shut down"))?;

        self.in_flight.start();
        if jobs.send(job).is_err() {
            self.in_flight.finish();
            return Err(PipelineError::worker(index, "no live worker processes"));
        }

        // The last feeder may have retired between our send and now.
        if self.alive.load(Ordering::SeqCst) == 0 {
            fail_backlog(&self.backlog, &self.in_flight);
        }
        Ok(())
    }

    fn drain(&self) {
        self.in_flight.wait_idle();
    }

    fn is_healthy(&self) -> bool {
        self.alive.load(Ordering::SeqCst) == self.workers
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        // Closing the queue lets every feeder finish its backlog and exit.
        self.jobs.take();
        for handle in self.feeders.drain(..) {
            if handle.join().is_err() {
                warn!("feeder thread panicked");
            }
        }
    }
}

// ============================================================================
// Feeder
// ============================================================================

struct Feeder {
    id: usize,
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    jobs: Receiver<Job>,
    alive: Arc<AtomicUsize>,
    in_flight: InFlight,
}

impl Feeder {
    fn run(mut self) {
        while let Ok(job) = self.jobs.recv() {
            if job.cancel.is_cancelled() {
                drop(job);
                self.in_flight.finish();
                continue;
            }

            let index = job.task.index;
            match self.exchange(&job) {
                Ok(result) => {
                    job.complete(result);
                    self.in_flight.finish();
                }
                Err(e) => {
                    warn!(worker = self.id, chunk = index, error = %e, "worker process failed");
                    job.complete(Err(PipelineError::worker(index, format!("worker process failed: {}", e))));
                    self.in_flight.finish();
                    self.retire();
                    return;
                }
            }
        }
        self.shutdown();
    }

    /// Send one task and wait for its result.
    ///
    /// The outer error means the child is unusable; the inner result is the
    /// pipeline outcome reported by a healthy child. A task that cannot be
    /// framed fails on its own without touching the child.
    fn exchange(&mut self, job: &Job) -> io::Result<Result<ndarray::Array3<f32>>> {
        let index = job.task.index;
        let bytes = match TaskFrame::from_task(&job.task)
            .and_then(|frame| encode_frame(&frame).map_err(PipelineError::from))
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(worker = self.id, chunk = index, error = %e, "chunk cannot be sent to worker");
                return Ok(Err(PipelineError::worker(index, format!("cannot frame chunk: {}", e))));
            }
        };
        write_encoded(&mut self.stdin, &bytes)?;

        let frame: ResultFrame = read_frame(&mut self.stdout)?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "worker closed its output"))?;

        if frame.index as usize != index {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("result for chunk {} answered task {}", frame.index, index),
            ));
        }

        Ok(match frame.outcome {
            Ok(payload) => payload.into_array(),
            Err(message) => Err(PipelineError::worker(index, message)),
        })
    }

    /// Leave the pool after the child broke. The last feeder to leave fails
    /// every queued job so no dispatcher waits forever.
    fn retire(mut self) {
        let remaining = self.alive.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            fail_backlog(&self.jobs, &self.in_flight);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    fn shutdown(mut self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
        // Dropping stdin ends the child's read loop.
        drop(self.stdin);
        match self.child.wait() {
            Ok(status) if !status.success() => {
                warn!(worker = self.id, %status, "worker process exited with failure");
            }
            Err(e) => warn!(worker = self.id, error = %e, "failed to reap worker process"),
            _ => {}
        }
    }
}

/// Fail every job still waiting in the queue.
fn fail_backlog(jobs: &Receiver<Job>, in_flight: &InFlight) {
    for job in jobs.try_iter() {
        let index = job.task.index;
        job.complete(Err(PipelineError::worker(index, "no live worker processes")));
        in_flight.finish();
    }
}
