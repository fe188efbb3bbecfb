// src/controller.rs

use crate::assembler::{assemble, FittedProjection, Outputs, PcaProjector};
use crate::error::{Notice, PcaError, Result, Severity};
use crate::pca::{DecompositionProvider, Projection};
use crate::preprocess::Preprocessor;
use crate::selection::{ComponentSelection, SelectionState, SelectionSynchronizer};
use crate::settings::{PcaSettings, MAX_COMPONENTS};
use crate::spectrum::VarianceSpectrum;
use crate::table::Table;
use log::{debug, error, info, warn};

/// Provider chain, followed by unit-variance scaling when `normalize` is set.
/// The provider centers on its own, so the scaling step does not.
fn preprocessor_chain<P: DecompositionProvider>(provider: &P, normalize: bool) -> Vec<Preprocessor> {
    let mut chain = provider.preprocessors();
    if normalize {
        chain.push(Preprocessor::Normalize { center: false });
    }
    chain
}

/// Owns the dataset, the current fit and the selection controls, and
/// produces the transformed data, the loadings and a projector.
///
/// Refitting only happens when the data, the normalization flag or the
/// component cap change. Moving the selection controls only re-slices the
/// cached full transform.
pub struct PcaController<P: DecompositionProvider> {
    provider: P,
    normalize: bool,
    max_components: usize,
    auto_commit: bool,
    data: Option<Table>,
    fitted: Option<FittedProjection<P::Projection>>,
    synchronizer: SelectionSynchronizer,
    outputs: Outputs<P>,
    dirty: bool,
    notice: Option<Notice>,
}

impl<P: DecompositionProvider + Clone> PcaController<P> {
    pub fn new(provider: P, settings: PcaSettings) -> Self {
        let max_components = settings.max_components.clamp(1, MAX_COMPONENTS);
        let state = settings.selection_state();
        let projector = PcaProjector::new(
            provider.clone(),
            max_components,
            preprocessor_chain(&provider, settings.normalize),
            state.selection,
        );
        Self {
            provider,
            normalize: settings.normalize,
            max_components,
            auto_commit: settings.auto_commit,
            data: None,
            fitted: None,
            synchronizer: SelectionSynchronizer::new(state),
            outputs: Outputs::empty(projector),
            dirty: false,
            notice: None,
        }
    }

    /// Current settings, suitable for persisting.
    pub fn settings(&self) -> PcaSettings {
        let state = self.synchronizer.state();
        PcaSettings {
            n_components: state.selection,
            variance_covered: state.variance_percent,
            auto_commit: self.auto_commit,
            normalize: self.normalize,
            max_components: self.max_components,
        }
    }

    /// Replaces the dataset and refits.
    ///
    /// Tables without features or rows are rejected before any fit is
    /// attempted; the outputs are cleared and the error is returned and kept
    /// as the current notice.
    pub fn set_data(&mut self, data: Option<Table>) -> Result<()> {
        self.fitted = None;
        self.notice = None;
        self.data = None;
        let Some(data) = data else {
            debug!("Data removed; clearing outputs.");
            self.synchronizer.resolve_count(None);
            self.commit()?;
            return Ok(());
        };
        let rejection = if data.n_attributes() == 0 {
            Some(PcaError::NoFeatures)
        } else if data.is_empty() {
            Some(PcaError::NoInstances)
        } else {
            None
        };
        if let Some(err) = rejection {
            return Err(self.clear_after(err));
        }
        self.data = Some(data);
        self.fit()
    }

    /// Fits the provider on the current data and commits the result.
    ///
    /// Always commits on success, whatever the auto-commit flag says.
    pub fn fit(&mut self) -> Result<()> {
        self.fitted = None;
        self.notice = None;
        let Some(data) = self.data.as_ref() else {
            self.synchronizer.resolve_count(None);
            self.commit()?;
            return Ok(());
        };
        let n_rows = data.n_rows();
        let chain = preprocessor_chain(&self.provider, self.normalize);
        let fitted = self
            .provider
            .fit(data, &chain, self.max_components)
            .and_then(|projection| {
                let spectrum = VarianceSpectrum::from_ratios(projection.explained_variance_ratio())?;
                Ok(FittedProjection::new(projection, spectrum))
            });
        let fitted = match fitted {
            Ok(fitted) => fitted,
            Err(err) => return Err(self.clear_after(err)),
        };
        info!(
            "Fitted {} components on {} rows.",
            fitted.spectrum().len(),
            n_rows
        );
        self.fitted = Some(fitted);
        let resolved = self
            .synchronizer
            .resolve_count(self.fitted.as_ref().map(FittedProjection::spectrum));
        debug!("Selection resolved to {} component(s) after fit.", resolved);
        self.commit()?;
        Ok(())
    }

    /// Drops the fit, empties the outputs and records `err` as the notice.
    fn clear_after(&mut self, err: PcaError) -> PcaError {
        match err.severity() {
            Severity::Warning => warn!("{}", err),
            Severity::Error if err.is_user_input() => error!("Rejected input data: {}", err),
            Severity::Error => error!("{}", err),
        }
        self.fitted = None;
        self.synchronizer.resolve_count(None);
        self.outputs = Outputs::empty(self.projector());
        self.dirty = false;
        self.notice = Some(Notice::from(&err));
        err
    }

    pub fn set_normalize(&mut self, normalize: bool) -> Result<()> {
        if self.normalize == normalize {
            return Ok(());
        }
        self.normalize = normalize;
        self.fit()
    }

    /// Caps the number of components requested from the provider, within
    /// 1..=[`MAX_COMPONENTS`].
    pub fn set_max_components(&mut self, max_components: usize) -> Result<()> {
        let max_components = max_components.clamp(1, MAX_COMPONENTS);
        if self.max_components == max_components {
            return Ok(());
        }
        self.max_components = max_components;
        self.fit()
    }

    /// Selects components by count; the covered variance follows.
    pub fn set_component_count(&mut self, selection: ComponentSelection) -> Result<()> {
        let changed = self
            .synchronizer
            .set_by_count(selection, self.fitted.as_ref().map(FittedProjection::spectrum));
        if changed {
            self.invalidate()?;
        }
        Ok(())
    }

    /// Selects the fewest components covering `percent` % of the variance.
    pub fn set_variance_covered(&mut self, percent: u8) -> Result<()> {
        let changed = self
            .synchronizer
            .set_by_variance(percent, self.fitted.as_ref().map(FittedProjection::spectrum));
        if changed {
            self.invalidate()?;
        }
        Ok(())
    }

    /// Turning auto-commit on flushes a pending commit.
    pub fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.auto_commit = auto_commit;
        if auto_commit && self.dirty {
            self.commit()?;
        }
        Ok(())
    }

    fn invalidate(&mut self) -> Result<()> {
        if self.auto_commit {
            self.commit()?;
        } else {
            self.dirty = true;
        }
        Ok(())
    }

    /// Rebuilds the outputs for the current selection.
    pub fn commit(&mut self) -> Result<&Outputs<P>> {
        let projector = self.projector();
        let assembled = assemble(
            self.data.as_ref(),
            self.fitted.as_ref(),
            self.synchronizer.resolved(),
            projector,
        );
        self.dirty = false;
        match assembled {
            Ok(outputs) => {
                self.outputs = outputs;
                Ok(&self.outputs)
            }
            Err(err) => {
                error!("Failed to assemble outputs: {}", err);
                self.outputs = Outputs::empty(self.projector());
                self.notice = Some(Notice::from(&err));
                Err(err)
            }
        }
    }

    /// Recipe for projecting other data the way the current settings do.
    pub fn projector(&self) -> PcaProjector<P> {
        PcaProjector::new(
            self.provider.clone(),
            self.max_components,
            preprocessor_chain(&self.provider, self.normalize),
            self.synchronizer.state().selection,
        )
    }

    /// Outputs of the last commit.
    pub fn outputs(&self) -> &Outputs<P> {
        &self.outputs
    }

    pub fn data(&self) -> Option<&Table> {
        self.data.as_ref()
    }

    pub fn fitted(&self) -> Option<&FittedProjection<P::Projection>> {
        self.fitted.as_ref()
    }

    pub fn spectrum(&self) -> Option<&VarianceSpectrum> {
        self.fitted.as_ref().map(FittedProjection::spectrum)
    }

    pub fn selection_state(&self) -> SelectionState {
        self.synchronizer.state()
    }

    /// Number of components in the last assembled outputs' selection.
    pub fn resolved_count(&self) -> usize {
        self.synchronizer.resolved()
    }

    /// The error from the last rejected dataset or failed fit, if any.
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// True when a selection change is waiting for a manual commit.
    pub fn has_pending_commit(&self) -> bool {
        self.dirty
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    pub fn max_components(&self) -> usize {
        self.max_components
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }
}
