//! Filter primitives.
//!
//! ## Buffer Format
//!
//! | Format | Shape | Type | Description |
//! |--------|-------|------|-------------|
//! | Grayscale | (H, W, 1) | f32 | Single luminance channel, 0.0-255.0 |
//! | RGB | (H, W, 3) | f32 | Red, green, blue, 0.0-255.0 |
//! | RGBA | (H, W, 4) | f32 | RGB + alpha, 0.0-255.0 |
//!
//! ## Filter Categories
//!
//! - **Pixel-wise**: grayscale, brightness (no neighbours needed)
//! - **Neighbourhood (3x3)**: gaussian blur, sobel, sharpen. These collapse
//!   color input to luminance first and always return one channel.
//!
//! All primitives are pure: they take a view and return a new buffer.
//! Intermediate values are kept at full precision and never clipped.

pub mod core;
pub mod grayscale;
pub mod color_adjust;
pub mod blur;
pub mod edge;
pub mod sharpen;

pub use blur::gaussian_blur;
pub use color_adjust::brightness;
pub use edge::sobel;
pub use grayscale::{grayscale, to_u8, u8_to_f32};
pub use sharpen::sharpen;
