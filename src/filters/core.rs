//! Core utilities shared by the neighbourhood filters.
//!
//! This module provides:
//! - The fixed 3x3 kernels (Gaussian, Sobel X/Y)
//! - Edge-replication padding
//! - Generic 2D correlation over a small odd kernel

use ndarray::{s, Array2, ArrayView2};

use crate::error::{PipelineError, Result};

/// Normalized 3x3 Gaussian kernel: [[1,2,1],[2,4,2],[1,2,1]] / 16.
pub fn gaussian_kernel() -> Array2<f32> {
    let k = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];
    Array2::from_shape_fn((3, 3), |(y, x)| k[y][x] / 16.0)
}

/// Horizontal Sobel kernel.
pub fn sobel_x_kernel() -> Array2<f32> {
    let k = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
    Array2::from_shape_fn((3, 3), |(y, x)| k[y][x])
}

/// Vertical Sobel kernel.
pub fn sobel_y_kernel() -> Array2<f32> {
    let k = [[1.0, 2.0, 1.0], [0.0, 0.0, 0.0], [-1.0, -2.0, -1.0]];
    Array2::from_shape_fn((3, 3), |(y, x)| k[y][x])
}

/// Pad a plane by replicating its edge pixels.
///
/// # Arguments
/// * `plane` - 2D intensity plane, must be non-empty
/// * `pad_y` - Rows added above and below
/// * `pad_x` - Columns added left and right
///
/// # Returns
/// Plane of shape (height + 2 * pad_y, width + 2 * pad_x)
pub fn pad_edge(plane: ArrayView2<f32>, pad_y: usize, pad_x: usize) -> Array2<f32> {
    let (height, width) = plane.dim();
    let max_y = height as isize - 1;
    let max_x = width as isize - 1;

    Array2::from_shape_fn((height + 2 * pad_y, width + 2 * pad_x), |(y, x)| {
        let sy = (y as isize - pad_y as isize).clamp(0, max_y) as usize;
        let sx = (x as isize - pad_x as isize).clamp(0, max_x) as usize;
        plane[[sy, sx]]
    })
}

/// 2D correlation (kernel is not flipped) with edge-replication borders.
///
/// Iterates over the kernel taps instead of the pixels: each tap adds a
/// shifted, weighted view of the padded plane into the accumulator, so a
/// 3x3 kernel costs nine whole-plane `scaled_add` passes. Every output pixel
/// accumulates its taps in the same order no matter how large the plane is,
/// which keeps chunked and whole-image results bit-identical away from the
/// chunk borders.
///
/// # Arguments
/// * `plane` - 2D intensity plane
/// * `kernel` - Square kernel with odd side length
///
/// # Returns
/// Plane with the same shape as the input
pub fn convolve(plane: ArrayView2<f32>, kernel: ArrayView2<f32>) -> Result<Array2<f32>> {
    let (kh, kw) = kernel.dim();
    if kh != kw || kh % 2 == 0 {
        return Err(PipelineError::InvalidKernel(format!(
            "expected an odd square kernel, got {}x{}",
            kh, kw
        )));
    }

    let (height, width) = plane.dim();
    let mut output = Array2::<f32>::zeros((height, width));
    if height == 0 || width == 0 {
        return Ok(output);
    }

    let half = kh / 2;
    let padded = pad_edge(plane, half, half);

    for ky in 0..kh {
        for kx in 0..kw {
            let shifted = padded.slice(s![ky..ky + height, kx..kx + width]);
            output.scaled_add(kernel[[ky, kx]], &shifted);
        }
    }

    Ok(output)
}
