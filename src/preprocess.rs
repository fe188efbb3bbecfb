// src/preprocess.rs

use crate::error::{PcaError, Result};
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Standard deviations at or below this are treated as zero when normalizing.
const SCALE_SANITIZATION_THRESHOLD: f64 = 1e-9;

/// One step of a preprocessing chain, before it has seen any data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preprocessor {
    /// Replace missing (NaN) values with the column mean.
    ImputeMean,
    /// Divide each column by its standard deviation, subtracting the mean
    /// first only when `center` is set.
    Normalize { center: bool },
}

/// The chain every PCA fit runs before decomposing.
pub fn default_preprocessors() -> Vec<Preprocessor> {
    vec![Preprocessor::ImputeMean]
}

/// A preprocessing step with the statistics it learned during fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittedStep {
    ImputeMean { fill: Array1<f64> },
    Normalize { offset: Option<Array1<f64>>, scale: Array1<f64> },
}

/// A fitted preprocessing chain, replayable on new data with the same columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessing {
    n_features: usize,
    steps: Vec<FittedStep>,
}

/// Mean over the non-missing values; 0 for an all-missing column.
fn nan_mean(column: ArrayView1<f64>) -> f64 {
    let (sum, count) = column
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

impl FittedPreprocessing {
    /// Learns every step of `chain` on `x` and returns the fitted chain
    /// together with the transformed data.
    pub fn fit_transform(chain: &[Preprocessor], x: ArrayView2<f64>) -> (Self, Array2<f64>) {
        let mut data = x.to_owned();
        let mut steps = Vec::with_capacity(chain.len());
        for preprocessor in chain {
            let step = match preprocessor {
                Preprocessor::ImputeMean => {
                    let fill: Vec<f64> = data
                        .axis_iter(Axis(1))
                        .into_par_iter()
                        .map(nan_mean)
                        .collect();
                    FittedStep::ImputeMean {
                        fill: Array1::from(fill),
                    }
                }
                Preprocessor::Normalize { center } => {
                    let stats: Vec<(f64, f64)> = data
                        .axis_iter(Axis(1))
                        .into_par_iter()
                        .map(|column| (column.mean().unwrap_or(0.0), column.std(0.0)))
                        .collect();
                    let scale = stats
                        .iter()
                        .map(|&(_, sd)| {
                            if sd.is_finite() && sd > SCALE_SANITIZATION_THRESHOLD {
                                sd
                            } else {
                                1.0
                            }
                        })
                        .collect::<Array1<f64>>();
                    let offset = center.then(|| stats.iter().map(|&(m, _)| m).collect());
                    FittedStep::Normalize { offset, scale }
                }
            };
            step.apply_inplace(&mut data);
            steps.push(step);
        }
        debug!(
            "Fitted preprocessing chain of {} step(s) on {}x{} data.",
            steps.len(),
            x.nrows(),
            x.ncols()
        );
        (
            Self {
                n_features: x.ncols(),
                steps,
            },
            data,
        )
    }

    /// Replays the fitted chain on new rows.
    pub fn apply(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(PcaError::Shape(format!(
                "Input data feature dimension ({}) does not match the preprocessing dimension ({}).",
                x.ncols(),
                self.n_features
            )));
        }
        let mut data = x.to_owned();
        for step in &self.steps {
            step.apply_inplace(&mut data);
        }
        Ok(data)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn steps(&self) -> &[FittedStep] {
        &self.steps
    }

    /// Checks that every step was fitted on `n_features` columns.
    pub(crate) fn validate(&self) -> Result<()> {
        for step in &self.steps {
            let lengths = match step {
                FittedStep::ImputeMean { fill } => vec![fill.len()],
                FittedStep::Normalize { offset, scale } => {
                    if scale.iter().any(|&s| !s.is_finite() || s <= 0.0) {
                        return Err(PcaError::Shape(
                            "normalization scale contains non-positive or non-finite values".into(),
                        ));
                    }
                    let mut lengths = vec![scale.len()];
                    lengths.extend(offset.as_ref().map(|o| o.len()));
                    lengths
                }
            };
            if lengths.iter().any(|&len| len != self.n_features) {
                return Err(PcaError::Shape(format!(
                    "preprocessing step fitted on {:?} columns, expected {}",
                    lengths, self.n_features
                )));
            }
        }
        Ok(())
    }
}

impl FittedStep {
    fn apply_inplace(&self, data: &mut Array2<f64>) {
        match self {
            FittedStep::ImputeMean { fill } => {
                for mut row in data.axis_iter_mut(Axis(0)) {
                    Zip::from(&mut row).and(fill).for_each(|v, &f| {
                        if v.is_nan() {
                            *v = f;
                        }
                    });
                }
            }
            FittedStep::Normalize { offset, scale } => {
                if let Some(offset) = offset {
                    *data -= offset;
                }
                *data /= scale;
            }
        }
    }
}
