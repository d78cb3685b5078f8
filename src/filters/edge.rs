//! Sobel edge magnitude.
//!
//! Output is the gradient magnitude `hypot(gx, gy)` rescaled so that the
//! largest value in the buffer maps to 255. The rescale uses the maximum of
//! the buffer it is given: a row chunk is normalized against its own maximum,
//! not the whole image's.

use ndarray::{Array3, ArrayView3, Zip};

use super::core::{convolve, sobel_x_kernel, sobel_y_kernel};
use super::grayscale::{from_plane, luminance_plane};
use crate::error::Result;

/// Apply Sobel edge detection.
///
/// # Arguments
/// * `input` - Image with 1, 3, or 4 channels (height, width, channels)
///
/// # Returns
/// Single-channel magnitude buffer scaled to a 0-255 peak. A flat input
/// (all gradients zero) stays all zero.
pub fn sobel(input: ArrayView3<f32>) -> Result<Array3<f32>> {
    let plane = luminance_plane(input)?;
    let gx = convolve(plane.view(), sobel_x_kernel().view())?;
    let gy = convolve(plane.view(), sobel_y_kernel().view())?;

    let mut magnitude = Zip::from(&gx).and(&gy).map_collect(|&x, &y| x.hypot(y));

    let max = magnitude.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        let scale = 255.0 / max;
        magnitude.mapv_inplace(|v| v * scale);
    }

    Ok(from_plane(magnitude))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sobel_flat_image_is_zero() {
        let img = Array3::<f32>::from_elem((6, 6, 1), 42.0);
        let result = sobel(img.view()).unwrap();
        assert!(result.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sobel_peak_is_255() {
        let img = Array3::from_shape_fn((6, 6, 1), |(_, x, _)| if x < 3 { 0.0 } else { 200.0 });

        let result = sobel(img.view()).unwrap();

        let max = result.iter().copied().fold(0.0f32, f32::max);
        assert!((max - 255.0).abs() < 1e-3);
        // Far from the step there is no gradient
        assert_eq!(result[[3, 0, 0]], 0.0);
        assert!(result[[3, 2, 0]] > 0.0);
    }

    #[test]
    fn test_sobel_vertical_edge_orientation() {
        let img = Array3::from_shape_fn((6, 6, 1), |(y, _, _)| if y < 3 { 0.0 } else { 90.0 });

        let result = sobel(img.view()).unwrap();

        assert!(result[[2, 3, 0]] > 0.0);
        assert_eq!(result[[0, 3, 0]], 0.0);
    }
}
