//! WebAssembly exports.
//!
//! These functions are exposed to JavaScript via wasm-bindgen. Browsers have
//! no worker pool here, so only the serial path is exported.

use ndarray::Array3;
use wasm_bindgen::prelude::*;

use crate::filters::{to_u8, u8_to_f32};
use crate::pipeline::Pipeline;

/// Run a filter pipeline on a flat u8 image.
///
/// # Arguments
/// * `data` - Flat array of bytes (length = width * height * channels)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `channels` - 1, 3 or 4
/// * `steps` - Comma separated steps, e.g. `"gaussian,sharpen:1.0,brightness:-10"`
///
/// # Returns
/// Flat array of grayscale bytes (length = width * height)
#[wasm_bindgen]
pub fn run_pipeline_wasm(
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    steps: &str,
) -> Result<Vec<u8>, JsValue> {
    let input = Array3::from_shape_vec((height, width, channels), data.to_vec())
        .map_err(|e| JsValue::from_str(&format!("invalid dimensions: {}", e)))?;
    let pipeline: Pipeline = steps.parse().map_err(|e: crate::PipelineError| JsValue::from_str(&e.to_string()))?;

    let result = crate::run_pipeline(u8_to_f32(input.view()).view(), &pipeline)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(to_u8(result.view()).into_raw_vec_and_offset().0)
}

/// Halo rows the pipeline needs around each row chunk.
#[wasm_bindgen]
pub fn required_halo_wasm(steps: &str) -> Result<usize, JsValue> {
    let pipeline: Pipeline = steps.parse().map_err(|e: crate::PipelineError| JsValue::from_str(&e.to_string()))?;
    Ok(crate::chunking::required_halo(&pipeline))
}
