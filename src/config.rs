//! Pool configuration.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the worker executable.
pub const WORKER_BIN_ENV: &str = "HALO_WORKER_BIN";

/// File name of the worker executable.
pub const WORKER_BIN_NAME: &str = if cfg!(windows) { "halo-worker.exe" } else { "halo-worker" };

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolConfig {
    /// Explicit path to the `halo-worker` executable.
    pub worker_program: Option<PathBuf>,
}

impl PoolConfig {
    /// Read configuration from `HALO_WORKER_BIN`; unset or empty means
    /// "search next to the current executable".
    pub fn from_env() -> Self {
        let worker_program = env::var_os(WORKER_BIN_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self { worker_program }
    }

    pub fn with_worker_program(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(path.into());
        self
    }

    /// Resolve the worker executable.
    ///
    /// An explicit path is returned as is. Otherwise the binary is looked up
    /// beside the current executable and then one directory up, which is
    /// where cargo puts binaries relative to test harnesses in `deps/`.
    pub fn worker_program(&self) -> Option<PathBuf> {
        if let Some(path) = &self.worker_program {
            return Some(path.clone());
        }

        let exe = env::current_exe().ok()?;
        let dir = exe.parent()?;
        candidate(dir).or_else(|| dir.parent().and_then(candidate))
    }
}

fn candidate(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(WORKER_BIN_NAME);
    path.is_file().then_some(path)
}
