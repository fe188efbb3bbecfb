// src/assembler.rs

use crate::error::Result;
use crate::pca::{DecompositionProvider, Projection};
use crate::preprocess::Preprocessor;
use crate::selection::ComponentSelection;
use crate::spectrum::VarianceSpectrum;
use crate::table::{Derivation, Domain, MetaValue, Table, Variable};
use log::{debug, info};
use ndarray::{s, Array2};
use once_cell::unsync::OnceCell;

/// Name of the meta column labelling rows of the components table.
pub const COMPONENT_LABEL_COLUMN: &str = "component";

/// One successful fit: the projection, its spectrum, and the transform of
/// the fitted data onto every component, computed on first use.
#[derive(Debug)]
pub struct FittedProjection<P> {
    projection: P,
    spectrum: VarianceSpectrum,
    full_transform: OnceCell<Table>,
}

impl<P: Projection> FittedProjection<P> {
    pub fn new(projection: P, spectrum: VarianceSpectrum) -> Self {
        Self {
            projection,
            spectrum,
            full_transform: OnceCell::new(),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn spectrum(&self) -> &VarianceSpectrum {
        &self.spectrum
    }

    /// All-component transform of `data`, computed once and then reused.
    ///
    /// `data` must be the table this projection was fitted on; the cache is
    /// tied to the projection, not to the argument.
    pub fn full_transform(&self, data: &Table) -> Result<&Table> {
        if self.full_transform.get().is_some() {
            debug!("Reusing cached full transform.");
        }
        self.full_transform.get_or_try_init(|| {
            info!(
                "Computing full transform of {} rows onto {} components.",
                data.n_rows(),
                self.spectrum.len()
            );
            self.projection.apply(data)
        })
    }

    pub fn is_transform_cached(&self) -> bool {
        self.full_transform.get().is_some()
    }
}

/// Fitting recipe handed downstream so new data can be projected the same
/// way, including the current truncation.
#[derive(Debug, Clone)]
pub struct PcaProjector<P> {
    provider: P,
    n_components: usize,
    preprocessors: Vec<Preprocessor>,
    component: ComponentSelection,
}

impl<P: DecompositionProvider> PcaProjector<P> {
    pub fn new(
        provider: P,
        n_components: usize,
        preprocessors: Vec<Preprocessor>,
        component: ComponentSelection,
    ) -> Self {
        Self {
            provider,
            n_components,
            preprocessors,
            component,
        }
    }

    /// Number of leading components kept when projecting.
    pub fn component(&self) -> ComponentSelection {
        self.component
    }

    pub fn set_component(&mut self, component: ComponentSelection) {
        self.component = component;
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn preprocessors(&self) -> &[Preprocessor] {
        &self.preprocessors
    }

    /// Fits on `data` and returns its scores on the selected leading components.
    pub fn project(&self, data: &Table) -> Result<Table> {
        let projection = self
            .provider
            .fit(data, &self.preprocessors, self.n_components)?;
        let full = projection.apply(data)?;
        leading_scores(data, &full, self.component.resolve(full.n_attributes()))
    }
}

/// First `count` score columns of `scores`, with `data`'s name, class and
/// meta columns.
fn leading_scores(data: &Table, scores: &Table, count: usize) -> Result<Table> {
    let count = count.min(scores.n_attributes());
    data.with_features(
        scores.domain().attributes()[..count].to_vec(),
        scores.x().slice(s![.., ..count]).to_owned(),
    )
}

/// The three outputs of a commit.
#[derive(Debug, Clone)]
pub struct Outputs<P> {
    pub transformed_data: Option<Table>,
    pub components: Option<Table>,
    pub projector: PcaProjector<P>,
}

impl<P> Outputs<P> {
    /// Outputs with no data, only the projector.
    pub fn empty(projector: PcaProjector<P>) -> Self {
        Self {
            transformed_data: None,
            components: None,
            projector,
        }
    }
}

/// Loadings of the first `count` components: one row per component, one
/// detached column per original feature, labelled `PC1..PC<count>`.
pub fn components_table<Pr: Projection>(projection: &Pr, count: usize) -> Result<Table> {
    let loadings = projection.components();
    let count = count.min(loadings.nrows());
    let attributes = projection
        .orig_domain()
        .attributes()
        .iter()
        .map(|v| Variable::continuous(v.name.clone()).with_derivation(Derivation::Detached))
        .collect();
    let domain = Domain::new(
        attributes,
        Vec::new(),
        vec![Variable::text(COMPONENT_LABEL_COLUMN)],
    );
    let labels = Array2::from_shape_fn((count, 1), |(i, _)| MetaValue::Text(format!("PC{}", i + 1)));
    let table = Table::new(
        domain,
        loadings.slice(s![..count, ..]).to_owned(),
        Array2::zeros((count, 0)),
        labels,
    )?;
    Ok(table.with_name("components"))
}

/// Builds the outputs for `resolved` components.
///
/// Without a fitted projection (or data) only the projector is emitted. The
/// transformed table takes the first `resolved` score columns of the cached
/// full transform; its name, class and meta columns come from `data`.
pub fn assemble<P, Pr>(
    data: Option<&Table>,
    fitted: Option<&FittedProjection<Pr>>,
    resolved: usize,
    mut projector: PcaProjector<P>,
) -> Result<Outputs<P>>
where
    P: DecompositionProvider,
    Pr: Projection,
{
    let (Some(data), Some(fitted)) = (data, fitted) else {
        return Ok(Outputs::empty(projector));
    };
    projector.set_component(ComponentSelection::from_count(resolved));

    let transformed = leading_scores(data, fitted.full_transform(data)?, resolved)?;
    let components = components_table(fitted.projection(), resolved)?;
    debug!(
        "Assembled outputs: {} rows x {} components, {} loading rows.",
        transformed.n_rows(),
        transformed.n_attributes(),
        components.n_rows()
    );
    Ok(Outputs {
        transformed_data: Some(transformed),
        components: Some(components),
        projector,
    })
}
