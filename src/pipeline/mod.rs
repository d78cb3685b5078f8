//! Ordered filter pipelines and the serial executor.
//!
//! A [`Pipeline`] is an ordered list of [`FilterStep`]s. Order matters:
//! a brightness shift before Sobel is lost, after Sobel it is kept.
//! [`Pipeline::apply`] folds the steps left to right over a private copy of
//! the input. It holds no shared state and is safe to call from many threads
//! or processes at once.

pub mod step;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::filters;

pub use step::FilterStep;

/// An ordered, immutable sequence of filter steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    steps: Vec<FilterStep>,
}

impl Pipeline {
    pub fn new(steps: Vec<FilterStep>) -> Self {
        Self { steps }
    }

    /// Parse the boundary step list of `(name, params)` pairs.
    ///
    /// Fails on the first unknown step name; no partial pipeline is returned.
    pub fn from_steps<S: AsRef<str>>(steps: &[(S, HashMap<String, f32>)]) -> Result<Self> {
        steps
            .iter()
            .map(|(name, params)| FilterStep::from_name(name.as_ref(), params))
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    pub fn steps(&self) -> &[FilterStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Apply every step in order.
    ///
    /// # Arguments
    /// * `input` - Image with 1, 3, or 4 channels (height, width, channels)
    ///
    /// # Returns
    /// The output of the last step, or a copy of the input for an empty
    /// pipeline. Any failing step aborts the whole run.
    pub fn apply(&self, input: ArrayView3<f32>) -> Result<Array3<f32>> {
        self.steps
            .iter()
            .try_fold(input.to_owned(), |buf, step| apply_step(buf.view(), step))
    }
}

/// Run a single step on a buffer.
pub fn apply_step(input: ArrayView3<f32>, step: &FilterStep) -> Result<Array3<f32>> {
    match *step {
        FilterStep::Grayscale => filters::grayscale(input),
        FilterStep::GaussianBlur => filters::gaussian_blur(input),
        FilterStep::Sobel => filters::sobel(input),
        FilterStep::Sharpen { alpha } => filters::sharpen(input, alpha),
        FilterStep::Brightness { delta } => Ok(filters::brightness(input, delta)),
    }
}

impl From<Vec<FilterStep>> for Pipeline {
    fn from(steps: Vec<FilterStep>) -> Self {
        Self::new(steps)
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

/// Compact text form: `"grayscale,gaussian,sharpen:1.5,brightness:-10"`.
///
/// The optional value after `:` is the step's primary parameter
/// (`alpha` for sharpen, `delta` for brightness).
impl FromStr for Pipeline {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (name, value) = match token.split_once(':') {
                Some((name, value)) => (name.trim(), Some(value.trim())),
                None => (token, None),
            };

            let mut params = HashMap::new();
            if let Some(value) = value {
                let parsed: f32 = value.parse().map_err(|_| {
                    PipelineError::InvalidStep(format!("{} (bad value '{}')", name, value))
                })?;
                let key = match name {
                    "sharpen" => "alpha",
                    "brightness" => "delta",
                    _ => "value",
                };
                params.insert(key.to_string(), parsed);
            }

            steps.push(FilterStep::from_name(name, &params)?);
        }
        Ok(Self::new(steps))
    }
}
