//! Gaussian blur with the fixed 3x3 kernel.
//!
//! Color input is collapsed to luminance first; the result is always a
//! single-channel buffer.

use ndarray::{Array3, ArrayView3};

use super::core::{convolve, gaussian_kernel};
use super::grayscale::{from_plane, luminance_plane};
use crate::error::Result;

/// Apply the 3x3 Gaussian blur `[[1,2,1],[2,4,2],[1,2,1]] / 16`.
///
/// # Arguments
/// * `input` - Image with 1, 3, or 4 channels (height, width, channels)
///
/// # Returns
/// Blurred single-channel buffer (height, width, 1)
pub fn gaussian_blur(input: ArrayView3<f32>) -> Result<Array3<f32>> {
    let plane = luminance_plane(input)?;
    let blurred = convolve(plane.view(), gaussian_kernel().view())?;
    Ok(from_plane(blurred))
}
