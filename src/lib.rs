//! Halo Pipeline
//!
//! Ordered 3x3 image filter pipelines that give the same result whether they
//! run on one thread or split into row chunks across a worker pool, with
//! Python bindings via PyO3 and WASM bindings for JavaScript.
//!
//! ## Image Format
//! Buffers are `f32` arrays shaped (height, width, channels):
//! - **Grayscale**: (height, width, 1) - single channel
//! - **RGB**: (height, width, 3) - 3 color channels
//! - **RGBA**: (height, width, 4) - 3 color channels + alpha
//!
//! Values use the 0.0-255.0 range. Filters never clip; clipping and
//! quantization happen only in [`filters::to_u8`].
//!
//! ## Execution
//! - [`run_pipeline`]: whole image on the calling thread
//! - [`run_pipeline_concurrent`]: row chunks with a halo of overlap rows on
//!   a cached thread or process pool, reassembled in row order
//!
//! Both collapse the input to grayscale before any step runs.

pub mod chunking;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod pool;
pub mod task;
pub mod wire;

#[cfg(feature = "wasm")]
pub mod wasm;

use ndarray::{Array3, ArrayView3};

pub use chunking::{required_halo, split_rows, ChunkSpec};
pub use config::PoolConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{FilterStep, Pipeline};
pub use pool::{Backend, PoolManager, WorkerPool};

/// Run a pipeline serially on the calling thread.
///
/// # Arguments
/// * `image` - Image with 1, 3, or 4 channels
/// * `pipeline` - Ordered filter steps
///
/// # Returns
/// Single-channel result with the input's height and width
pub fn run_pipeline(image: ArrayView3<f32>, pipeline: &Pipeline) -> Result<Array3<f32>> {
    let gray = filters::grayscale(image)?;
    pipeline.apply(gray.view())
}

/// Run a pipeline on the process-wide worker pool.
///
/// The pool is reused across calls with the same backend and worker count.
/// `Backend::Serial` behaves like [`run_pipeline`].
pub fn run_pipeline_concurrent(
    image: ArrayView3<f32>,
    pipeline: &Pipeline,
    workers: usize,
    backend: Backend,
) -> Result<Array3<f32>> {
    PoolManager::global().run(image, pipeline, workers, backend)
}

// Python bindings (only when python feature is enabled)
#[cfg(feature = "python")]
mod python {
    use std::collections::HashMap;

    use numpy::{IntoPyArray, PyArray3, PyReadonlyArray3};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    use crate::error::PipelineError;
    use crate::filters::{to_u8, u8_to_f32};
    use crate::pipeline::Pipeline;
    use crate::pool::Backend;

    type Steps = Vec<(String, HashMap<String, f32>)>;

    fn to_py_err(err: PipelineError) -> PyErr {
        match err {
            PipelineError::InvalidStep(_)
            | PipelineError::MissingParameter { .. }
            | PipelineError::ShapeMismatch(_)
            | PipelineError::InvalidKernel(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }

    fn parse(steps: &Steps, backend: Option<&str>) -> PyResult<(Pipeline, Backend)> {
        let pipeline = Pipeline::from_steps(steps).map_err(to_py_err)?;
        let backend = match backend {
            Some(name) => name.parse::<Backend>().map_err(PyValueError::new_err)?,
            None => Backend::Serial,
        };
        Ok((pipeline, backend))
    }

    // ========================================================================
    // Serial
    // ========================================================================

    /// Run a filter pipeline on one thread.
    ///
    /// # Arguments
    /// * `image` - float32 array (H, W, C), C in {1, 3, 4}, values 0-255
    /// * `steps` - List of `(name, params)` tuples, e.g. `[("sharpen", {"alpha": 1.0})]`
    ///
    /// # Returns
    /// float32 array (H, W, 1), unclipped
    #[pyfunction]
    pub fn run_pipeline<'py>(
        py: Python<'py>,
        image: PyReadonlyArray3<'py, f32>,
        steps: Steps,
    ) -> PyResult<Bound<'py, PyArray3<f32>>> {
        let (pipeline, _) = parse(&steps, None)?;
        let input = image.as_array();
        let result = py
            .allow_threads(|| crate::run_pipeline(input, &pipeline))
            .map_err(to_py_err)?;
        Ok(result.into_pyarray(py))
    }

    /// Run a filter pipeline on uint8 input and quantize the result.
    #[pyfunction]
    pub fn run_pipeline_u8<'py>(
        py: Python<'py>,
        image: PyReadonlyArray3<'py, u8>,
        steps: Steps,
    ) -> PyResult<Bound<'py, PyArray3<u8>>> {
        let (pipeline, _) = parse(&steps, None)?;
        let input = u8_to_f32(image.as_array());
        let result = py
            .allow_threads(|| crate::run_pipeline(input.view(), &pipeline).map(|r| to_u8(r.view())))
            .map_err(to_py_err)?;
        Ok(result.into_pyarray(py))
    }

    // ========================================================================
    // Concurrent
    // ========================================================================

    /// Run a filter pipeline in row chunks on a cached worker pool.
    ///
    /// # Arguments
    /// * `image` - float32 array (H, W, C), C in {1, 3, 4}, values 0-255
    /// * `steps` - List of `(name, params)` tuples
    /// * `workers` - Worker count, clamped to the image height
    /// * `backend` - "serial", "threads" or "processes"
    #[pyfunction]
    #[pyo3(signature = (image, steps, workers=4, backend="threads"))]
    pub fn run_pipeline_concurrent<'py>(
        py: Python<'py>,
        image: PyReadonlyArray3<'py, f32>,
        steps: Steps,
        workers: usize,
        backend: &str,
    ) -> PyResult<Bound<'py, PyArray3<f32>>> {
        let (pipeline, backend) = parse(&steps, Some(backend))?;
        let input = image.as_array();
        let result = py
            .allow_threads(|| crate::run_pipeline_concurrent(input, &pipeline, workers, backend))
            .map_err(to_py_err)?;
        Ok(result.into_pyarray(py))
    }

    /// uint8 variant of `run_pipeline_concurrent`.
    #[pyfunction]
    #[pyo3(signature = (image, steps, workers=4, backend="threads"))]
    pub fn run_pipeline_concurrent_u8<'py>(
        py: Python<'py>,
        image: PyReadonlyArray3<'py, u8>,
        steps: Steps,
        workers: usize,
        backend: &str,
    ) -> PyResult<Bound<'py, PyArray3<u8>>> {
        let (pipeline, backend) = parse(&steps, Some(backend))?;
        let input = u8_to_f32(image.as_array());
        let result = py
            .allow_threads(|| {
                crate::run_pipeline_concurrent(input.view(), &pipeline, workers, backend)
                    .map(|r| to_u8(r.view()))
            })
            .map_err(to_py_err)?;
        Ok(result.into_pyarray(py))
    }

    /// Halo rows the pipeline needs around each chunk.
    #[pyfunction]
    pub fn required_halo(steps: Steps) -> PyResult<usize> {
        let (pipeline, _) = parse(&steps, None)?;
        Ok(crate::chunking::required_halo(&pipeline))
    }

    #[pymodule]
    pub fn halo_pipeline(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(run_pipeline, m)?)?;
        m.add_function(wrap_pyfunction!(run_pipeline_u8, m)?)?;
        m.add_function(wrap_pyfunction!(run_pipeline_concurrent, m)?)?;
        m.add_function(wrap_pyfunction!(run_pipeline_concurrent_u8, m)?)?;
        m.add_function(wrap_pyfunction!(required_halo, m)?)?;
        Ok(())
    }
}

#[cfg(feature = "python")]
pub use python::halo_pipeline;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_pipeline_collapses_to_one_channel() {
        let img = Array3::from_shape_fn((5, 4, 3), |(y, x, c)| (y * 10 + x + c) as f32);
        let out = run_pipeline(img.view(), &"gaussian".parse().unwrap()).unwrap();
        assert_eq!(out.dim(), (5, 4, 1));
    }

    #[test]
    fn test_run_pipeline_rejects_two_channels() {
        let img = Array3::<f32>::zeros((2, 2, 2));
        let err = run_pipeline(img.view(), &Pipeline::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch(_)));
    }
}
