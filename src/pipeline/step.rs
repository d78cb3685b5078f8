//! Filter step definitions and parsing.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Default unsharp-mask strength when `alpha` is not given.
pub const DEFAULT_SHARPEN_ALPHA: f32 = 1.0;

/// One filter in a pipeline.
///
/// Each variant carries only the parameters it needs. The set is closed:
/// unknown names are rejected when a pipeline is parsed, before any pixel
/// work starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterStep {
    Grayscale,
    GaussianBlur,
    Sobel,
    Sharpen { alpha: f32 },
    Brightness { delta: f32 },
}

impl FilterStep {
    /// Build a step from its boundary name and parameter map.
    ///
    /// Parameters a step does not use are ignored.
    ///
    /// # Arguments
    /// * `name` - One of `grayscale`, `gaussian`, `sobel`, `sharpen`, `brightness`
    /// * `params` - `alpha` for sharpen (defaults to 1.0), `delta` for brightness
    pub fn from_name(name: &str, params: &HashMap<String, f32>) -> Result<Self> {
        match name {
            "grayscale" => Ok(FilterStep::Grayscale),
            "gaussian" => Ok(FilterStep::GaussianBlur),
            "sobel" => Ok(FilterStep::Sobel),
            "sharpen" => Ok(FilterStep::Sharpen {
                alpha: params.get("alpha").copied().unwrap_or(DEFAULT_SHARPEN_ALPHA),
            }),
            "brightness" => match params.get("delta") {
                Some(&delta) => Ok(FilterStep::Brightness { delta }),
                None => Err(PipelineError::MissingParameter {
                    step: name.to_string(),
                    param: "delta",
                }),
            },
            other => Err(PipelineError::InvalidStep(other.to_string())),
        }
    }

    /// Boundary name of the step.
    pub fn name(&self) -> &'static str {
        match self {
            FilterStep::Grayscale => "grayscale",
            FilterStep::GaussianBlur => "gaussian",
            FilterStep::Sobel => "sobel",
            FilterStep::Sharpen { .. } => "sharpen",
            FilterStep::Brightness { .. } => "brightness",
        }
    }

    /// Radius of the neighbourhood the step reads around each pixel.
    ///
    /// 0 for point operations, 1 for the 3x3 kernels.
    pub fn support_radius(&self) -> usize {
        match self {
            FilterStep::Grayscale | FilterStep::Brightness { .. } => 0,
            FilterStep::GaussianBlur | FilterStep::Sobel | FilterStep::Sharpen { .. } => 1,
        }
    }
}

impl fmt::Display for FilterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStep::Sharpen { alpha } => write!(f, "sharpen:{}", alpha),
            FilterStep::Brightness { delta } => write!(f, "brightness:{}", delta),
            other => f.write_str(other.name()),
        }
    }
}
