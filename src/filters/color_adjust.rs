//! Pixel-wise brightness adjustment.
//!
//! Works on any channel count; no spatial context is needed.

use ndarray::{Array3, ArrayView3};

/// Shift every channel value by `delta`.
///
/// # Arguments
/// * `input` - Image with any channel count (height, width, channels)
/// * `delta` - Offset on the 0-255 scale, may be negative
///
/// # Returns
/// Shifted image with the same shape. Values are not clipped.
pub fn brightness(input: ArrayView3<f32>, delta: f32) -> Array3<f32> {
    input.mapv(|v| v + delta)
}
