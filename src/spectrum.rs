// src/spectrum.rs

use crate::error::{PcaError, Result};
use ndarray::{Array1, ArrayView1};
use std::num::NonZeroUsize;

/// Absorbs rounding in running sums, so that `0.6 + 0.3` counts as 90 %.
pub const PERCENT_TOLERANCE: f64 = 1e-9;

/// Explained-variance ratios of a fit and their running sum.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceSpectrum {
    ratios: Array1<f64>,
    cumulative: Array1<f64>,
}

/// Whole percent of variance covered by a cumulative fraction, floored.
pub fn percent_of(covered: f64) -> u8 {
    (covered * 100.0 + PERCENT_TOLERANCE).floor().clamp(0.0, 100.0) as u8
}

impl VarianceSpectrum {
    /// Builds the spectrum from per-component ratios.
    ///
    /// An empty spectrum, or one whose total is not finite, means every
    /// component is trivial and is rejected with
    /// [`PcaError::TrivialComponents`].
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use pca_select::VarianceSpectrum;
    ///
    /// let spectrum = VarianceSpectrum::from_ratios(array![0.6, 0.3, 0.1].view()).unwrap();
    /// assert_eq!(spectrum.percent_at(2), 90);
    /// assert_eq!(spectrum.count_for_percent(95).get(), 3);
    /// ```
    pub fn from_ratios(ratios: ArrayView1<f64>) -> Result<Self> {
        let cumulative: Array1<f64> = ratios
            .iter()
            .scan(0.0, |running, &r| {
                *running += r;
                Some(*running)
            })
            .collect();
        match cumulative.iter().next_back() {
            Some(total) if total.is_finite() => Ok(Self {
                ratios: ratios.to_owned(),
                cumulative,
            }),
            _ => Err(PcaError::TrivialComponents),
        }
    }

    /// Number of components in the spectrum; never zero.
    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }

    pub fn ratios(&self) -> ArrayView1<'_, f64> {
        self.ratios.view()
    }

    pub fn cumulative(&self) -> ArrayView1<'_, f64> {
        self.cumulative.view()
    }

    /// Fraction of variance covered by the first `count` components.
    /// `count` is clamped to `1..=len()`.
    pub fn covered(&self, count: usize) -> f64 {
        self.cumulative[count.clamp(1, self.len()) - 1]
    }

    /// `floor(covered(count) * 100)`, but never below 1: a selection always
    /// reports at least 1 %, even when its components cover less.
    pub fn percent_at(&self, count: usize) -> u8 {
        percent_of(self.covered(count)).max(1)
    }

    /// Smallest number of components covering at least `percent` % of the
    /// variance, clamped to the spectrum length when no prefix reaches it.
    pub fn count_for_percent(&self, percent: u8) -> NonZeroUsize {
        let target = f64::from(percent) / 100.0;
        // lower bound over the non-decreasing running sum
        let index = self
            .cumulative
            .iter()
            .take_while(|&&c| c + PERCENT_TOLERANCE < target)
            .count();
        NonZeroUsize::MIN.saturating_add(index.min(self.len() - 1))
    }

    #[cfg(test)]
    pub(crate) fn with_cumulative_for_tests(mut self, cumulative: Array1<f64>) -> Self {
        self.cumulative = cumulative;
        self
    }
}
