// src/selection.rs

use crate::spectrum::VarianceSpectrum;
use log::debug;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// How many components to keep.
///
/// Persisted as a plain integer where 0 stands for [`ComponentSelection::All`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "usize", into = "usize")]
pub enum ComponentSelection {
    /// Every component the current fit produced.
    All,
    /// A fixed number of leading components.
    Count(NonZeroUsize),
}

impl ComponentSelection {
    /// `0` maps to [`ComponentSelection::All`].
    pub fn from_count(n: usize) -> Self {
        NonZeroUsize::new(n).map_or(ComponentSelection::All, ComponentSelection::Count)
    }

    /// Integer form, 0 for `All`.
    pub fn as_count(self) -> usize {
        match self {
            ComponentSelection::All => 0,
            ComponentSelection::Count(n) => n.get(),
        }
    }

    /// Concrete number of components out of `available`.
    pub fn resolve(self, available: usize) -> usize {
        match self {
            ComponentSelection::All => available,
            ComponentSelection::Count(n) => n.get().min(available),
        }
    }

    /// Same selection with an explicit count capped at `available`.
    fn clamped(self, available: usize) -> Self {
        match self {
            ComponentSelection::Count(n) if n.get() > available => Self::from_count(available),
            other => other,
        }
    }
}

impl From<usize> for ComponentSelection {
    fn from(n: usize) -> Self {
        Self::from_count(n)
    }
}

impl From<ComponentSelection> for usize {
    fn from(selection: ComponentSelection) -> Self {
        selection.as_count()
    }
}

/// The two user-facing controls, kept consistent with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionState {
    pub selection: ComponentSelection,
    /// Whole percent of variance covered by the selection.
    pub variance_percent: u8,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self {
            selection: ComponentSelection::Count(NonZeroUsize::MIN.saturating_add(1)),
            variance_percent: 100,
        }
    }
}

/// Keeps a component count and a covered-variance percentage in sync
/// against the spectrum of the current fit.
///
/// Every entry point re-establishes
/// `variance_percent == spectrum.percent_at(resolved)` and reports whether
/// the outputs need to be rebuilt.
#[derive(Debug, Clone, Default)]
pub struct SelectionSynchronizer {
    state: SelectionState,
    resolved: usize,
}

/// Percent covered by `cut` components. A non-finite value here means a
/// degenerate spectrum got past the fit guard.
fn settled_percent(spectrum: &VarianceSpectrum, cut: usize) -> u8 {
    let covered = spectrum.covered(cut);
    assert!(
        covered.is_finite(),
        "cumulative variance for {} components is not finite ({})",
        cut,
        covered
    );
    spectrum.percent_at(cut)
}

impl SelectionSynchronizer {
    pub fn new(state: SelectionState) -> Self {
        Self { state, resolved: 0 }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    /// Component count the outputs were last built for; 0 without a spectrum.
    pub fn resolved(&self) -> usize {
        self.resolved
    }

    fn update_resolved(&mut self, cut: usize) -> bool {
        let changed = cut != self.resolved;
        self.resolved = cut;
        changed
    }

    /// Selects components by count; the percentage follows.
    ///
    /// Returns `true` when the resolved count changed (or, with no spectrum,
    /// when the stored selection changed).
    pub fn set_by_count(
        &mut self,
        selection: ComponentSelection,
        spectrum: Option<&VarianceSpectrum>,
    ) -> bool {
        let Some(spectrum) = spectrum else {
            let changed = self.state.selection != selection;
            self.state.selection = selection;
            self.resolved = 0;
            return changed;
        };
        let selection = selection.clamped(spectrum.len());
        let cut = selection.resolve(spectrum.len());
        self.state.selection = selection;
        self.state.variance_percent = settled_percent(spectrum, cut);
        debug!(
            "Selected {:?}: {} component(s), {}% variance.",
            selection, cut, self.state.variance_percent
        );
        self.update_resolved(cut)
    }

    /// Selects the smallest count covering `percent` % of the variance; the
    /// stored percentage then becomes the one that count actually covers.
    ///
    /// `percent` is clamped to 1..=100. Never produces `All`. Returns `true`
    /// whenever a spectrum is present.
    pub fn set_by_variance(&mut self, percent: u8, spectrum: Option<&VarianceSpectrum>) -> bool {
        let target = percent.clamp(1, 100);
        let Some(spectrum) = spectrum else {
            self.state.variance_percent = target;
            return false;
        };
        let cut = spectrum.count_for_percent(target);
        self.state.selection = ComponentSelection::Count(cut);
        self.state.variance_percent = settled_percent(spectrum, cut.get());
        debug!(
            "Variance target {}% selects {} component(s) covering {}%.",
            target, cut, self.state.variance_percent
        );
        self.update_resolved(cut.get());
        true
    }

    /// Re-derives the active cut against a (possibly new) spectrum without
    /// a user action.
    ///
    /// When the percentage implied by the stored count differs from the
    /// stored percentage, the count wins and the percentage is repaired.
    /// When they agree, the count is re-derived from the percentage. The
    /// `All` selection is kept if that search lands on the full length.
    pub fn resolve_count(&mut self, spectrum: Option<&VarianceSpectrum>) -> usize {
        let Some(spectrum) = spectrum else {
            self.resolved = 0;
            return 0;
        };
        let selection = self.state.selection.clamped(spectrum.len());
        let cut = selection.resolve(spectrum.len());
        let derived = settled_percent(spectrum, cut);
        if derived != self.state.variance_percent {
            self.state.selection = selection;
            self.state.variance_percent = derived;
            self.resolved = cut;
        } else {
            let searched = spectrum.count_for_percent(self.state.variance_percent);
            self.state.selection = match selection {
                ComponentSelection::All if searched.get() == cut => ComponentSelection::All,
                _ => ComponentSelection::Count(searched),
            };
            self.resolved = searched.get();
        }
        self.resolved
    }
}
