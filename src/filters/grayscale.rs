//! Grayscale conversion and buffer boundary conversions.
//!
//! Uses ITU-R BT.601 luma coefficients (0.299, 0.587, 0.114).
//!
//! ## Supported Formats
//!
//! - **Grayscale**: (height, width, 1) - returned unchanged
//! - **RGB**: (height, width, 3) - luminance from RGB
//! - **RGBA**: (height, width, 4) - alpha is dropped, luminance from RGB
//!
//! Any other channel count is a [`PipelineError::ShapeMismatch`].
//!
//! Intensities stay in the 0.0-255.0 scale while inside the pipeline and are
//! never clipped here. Clipping and quantization only happen in [`to_u8`].

use ndarray::{Array2, Array3, ArrayView3, Axis, Zip};

use crate::error::{PipelineError, Result};

/// ITU-R BT.601 luma coefficients
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

// ============================================================================
// Luminance
// ============================================================================

/// Convert an image to a single-channel luminance buffer.
///
/// # Arguments
/// * `input` - Image with 1, 3, or 4 channels (height, width, channels)
///
/// # Returns
/// Single-channel buffer of shape (height, width, 1). A single-channel input
/// is copied bit-for-bit, so applying this twice equals applying it once.
pub fn grayscale(input: ArrayView3<f32>) -> Result<Array3<f32>> {
    let (height, width, channels) = input.dim();

    match channels {
        1 => Ok(input.to_owned()),
        3 | 4 => {
            let mut output = Array3::<f32>::zeros((height, width, 1));
            Zip::from(output.lanes_mut(Axis(2)))
                .and(input.lanes(Axis(2)))
                .for_each(|mut out, px| {
                    out[0] = LUMA_R * px[0] + LUMA_G * px[1] + LUMA_B * px[2];
                });
            Ok(output)
        }
        c => Err(PipelineError::ShapeMismatch(format!(
            "grayscale expects 1, 3 or 4 channels, got {} ({}x{}x{})",
            c, height, width, c
        ))),
    }
}

/// Luminance plane of an image as a 2D array.
///
/// Neighbourhood filters work on this plane and wrap their result back
/// with [`from_plane`].
pub fn luminance_plane(input: ArrayView3<f32>) -> Result<Array2<f32>> {
    let gray = grayscale(input)?;
    Ok(gray.index_axis_move(Axis(2), 0))
}

/// Wrap a 2D plane into a (height, width, 1) buffer.
pub fn from_plane(plane: Array2<f32>) -> Array3<f32> {
    plane.insert_axis(Axis(2))
}

// ============================================================================
// Conversion Utilities
// ============================================================================

/// Convert u8 image (0-255) to f32 on the same 0.0-255.0 scale.
pub fn u8_to_f32(input: ArrayView3<u8>) -> Array3<f32> {
    input.mapv(|v| v as f32)
}

/// Convert f32 image to u8, clipping to 0-255 and truncating.
///
/// This is the sink boundary: nothing inside the pipeline clips.
pub fn to_u8(input: ArrayView3<f32>) -> Array3<u8> {
    input.mapv(|v| v.clamp(0.0, 255.0) as u8)
}
