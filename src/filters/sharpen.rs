//! Unsharp-mask sharpening.

use ndarray::{Array3, ArrayView3, Zip};

use super::core::{convolve, gaussian_kernel};
use super::grayscale::{from_plane, luminance_plane};
use crate::error::Result;

/// Sharpen with an unsharp mask: `out = img + alpha * (img - blur(img))`.
///
/// # Arguments
/// * `input` - Image with 1, 3, or 4 channels (height, width, channels)
/// * `alpha` - Mask strength, usually 0.0 to ~2.0; 0.0 = no change
///
/// # Returns
/// Single-channel buffer. Values are not clipped, so overshoot past 0 or 255
/// is carried to the next step.
pub fn sharpen(input: ArrayView3<f32>, alpha: f32) -> Result<Array3<f32>> {
    let plane = luminance_plane(input)?;
    let blurred = convolve(plane.view(), gaussian_kernel().view())?;

    let sharpened = Zip::from(&plane)
        .and(&blurred)
        .map_collect(|&v, &b| v + alpha * (v - b));

    Ok(from_plane(sharpened))
}
