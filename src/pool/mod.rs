//! Persistent worker pools and the process-wide pool manager.
//!
//! Two pool variants run chunk tasks:
//! - [`ThreadPool`]: rayon threads in this process, each task on its own copy
//! - [`ProcessPool`]: `halo-worker` child processes fed over pipes
//!
//! [`PoolManager`] caches one pool keyed by `(backend, workers)`. A request
//! with a different key builds a new pool, then drains and shuts down the
//! old one. The cache sits behind a mutex and [`PoolManager::acquire`] hands
//! out a lease that holds it, so concurrent invocations are serialized and a
//! pool is never replaced while a dispatch is using it.

pub mod process;
pub mod thread;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use ndarray::{Array3, ArrayView3};
use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunking::required_halo;
use crate::config::PoolConfig;
use crate::dispatch::dispatch;
use crate::error::{PipelineError, Result};
use crate::filters::grayscale;
use crate::pipeline::Pipeline;
use crate::task::Job;

pub use process::ProcessPool;
pub use thread::ThreadPool;

/// Execution strategy for a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Whole image on the calling thread.
    Serial,
    /// Shared-memory rayon thread pool.
    Threads,
    /// Isolated worker processes.
    Processes,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Serial => "serial",
            Backend::Threads => "threads",
            Backend::Processes => "processes",
        })
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(Backend::Serial),
            "threads" | "thread" => Ok(Backend::Threads),
            "processes" | "process" | "multiprocessing" | "futures" => Ok(Backend::Processes),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// A pool that runs chunk tasks and reports each outcome on the job's
/// reply channel, in whatever order the tasks finish.
pub trait WorkerPool: Send {
    fn backend(&self) -> Backend;

    fn workers(&self) -> usize;

    /// Queue a job. Errors only when the pool can no longer accept work.
    fn submit(&self, job: Job) -> Result<()>;

    /// Block until every submitted job has finished.
    fn drain(&self);

    fn is_healthy(&self) -> bool {
        true
    }
}

// ============================================================================
// In-flight tracking
// ============================================================================

/// Counter of submitted-but-unfinished jobs, shared with the workers.
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlight(Arc<(Mutex<usize>, Condvar)>);

impl InFlight {
    pub fn start(&self) {
        *self.0 .0.lock() += 1;
    }

    pub fn finish(&self) {
        let (count, cvar) = &*self.0;
        let mut n = count.lock();
        *n = n.saturating_sub(1);
        if *n == 0 {
            cvar.notify_all();
        }
    }

    pub fn wait_idle(&self) {
        let (count, cvar) = &*self.0;
        let mut n = count.lock();
        while *n > 0 {
            cvar.wait(&mut n);
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        *self.0 .0.lock()
    }
}

// ============================================================================
// Pool manager
// ============================================================================

/// Exclusive access to the cached pool for the duration of one dispatch.
pub type PoolLease<'a> = MappedMutexGuard<'a, dyn WorkerPool>;

/// Owner of the cached worker pool.
pub struct PoolManager {
    config: PoolConfig,
    slot: Mutex<Option<Box<dyn WorkerPool>>>,
    builds: AtomicUsize,
}

static GLOBAL: OnceLock<PoolManager> = OnceLock::new();

impl PoolManager {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(None),
            builds: AtomicUsize::new(0),
        }
    }

    /// Process-wide manager configured from the environment.
    pub fn global() -> &'static PoolManager {
        GLOBAL.get_or_init(|| PoolManager::new(PoolConfig::from_env()))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Backend and worker count of the cached pool, if any.
    pub fn current(&self) -> Option<(Backend, usize)> {
        self.slot.lock().as_ref().map(|p| (p.backend(), p.workers()))
    }

    /// Number of pools this manager has built.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Get a pool for `(backend, workers)`, reusing the cached one when it
    /// matches and is healthy.
    ///
    /// A replacement pool is built before the old one is touched: if the
    /// build fails the cache is left exactly as it was. On success the old
    /// pool is drained and dropped, then the new one is cached. Old and new
    /// pools coexist while this happens, so a process pool swap briefly runs
    /// both sets of children.
    pub fn acquire(&self, backend: Backend, workers: usize) -> Result<PoolLease<'_>> {
        let mut slot = self.slot.lock();

        let reusable = slot
            .as_ref()
            .is_some_and(|p| p.backend() == backend && p.workers() == workers && p.is_healthy());

        if !reusable {
            let fresh = self.build(backend, workers)?;
            if let Some(old) = slot.take() {
                info!(backend = %old.backend(), workers = old.workers(), "shutting down worker pool");
                old.drain();
                drop(old);
            }
            *slot = Some(fresh);
        }

        MutexGuard::try_map(slot, |s| s.as_deref_mut()).map_err(|_| PipelineError::PoolRebuild {
            backend,
            workers,
            reason: "pool slot is empty".to_string(),
        })
    }

    fn build(&self, backend: Backend, workers: usize) -> Result<Box<dyn WorkerPool>> {
        let rebuild_error = |reason: String| PipelineError::PoolRebuild {
            backend,
            workers,
            reason,
        };

        if workers == 0 {
            return Err(rebuild_error("worker count must be positive".to_string()));
        }

        let pool: Box<dyn WorkerPool> = match backend {
            Backend::Serial => {
                return Err(rebuild_error("the serial backend has no pool".to_string()));
            }
            Backend::Threads => Box::new(ThreadPool::new(workers).map_err(|e| rebuild_error(e.to_string()))?),
            Backend::Processes => {
                let program = self
                    .config
                    .worker_program()
                    .ok_or_else(|| rebuild_error("halo-worker executable not found".to_string()))?;
                Box::new(ProcessPool::spawn(&program, workers).map_err(|e| rebuild_error(e.to_string()))?)
            }
        };

        self.builds.fetch_add(1, Ordering::Relaxed);
        info!(%backend, workers, "built worker pool");
        Ok(pool)
    }

    /// Run a pipeline with the given backend.
    ///
    /// The image is converted to grayscale first. Worker counts above the
    /// image height are clamped to the height.
    pub fn run(
        &self,
        image: ArrayView3<f32>,
        pipeline: &Pipeline,
        workers: usize,
        backend: Backend,
    ) -> Result<Array3<f32>> {
        self.run_with_halo(image, pipeline, workers, backend, None)
    }

    /// Like [`run`](Self::run) with an explicit halo instead of
    /// [`required_halo`].
    pub fn run_with_halo(
        &self,
        image: ArrayView3<f32>,
        pipeline: &Pipeline,
        workers: usize,
        backend: Backend,
        halo: Option<usize>,
    ) -> Result<Array3<f32>> {
        let gray = grayscale(image)?;

        if backend == Backend::Serial {
            return pipeline.apply(gray.view());
        }

        if workers == 0 {
            return Err(PipelineError::PoolRebuild {
                backend,
                workers,
                reason: "worker count must be positive".to_string(),
            });
        }

        let height = gray.dim().0;
        if height == 0 {
            debug!("empty image, nothing to dispatch");
            return Ok(gray);
        }

        let workers = workers.min(height);
        let halo = halo.unwrap_or_else(|| required_halo(pipeline));

        let pool = self.acquire(backend, workers)?;
        dispatch(&*pool, gray.view(), pipeline, workers, halo)
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        if let Some(pool) = self.slot.get_mut().take() {
            pool.drain();
        }
    }
}
