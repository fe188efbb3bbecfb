// Shared fixtures for the integration tests.
#![allow(dead_code)]

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use pca_select::{
    DecompositionProvider, Derivation, Domain, PcaError, Preprocessor, Projection, Result, Table,
    Variable,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Ratios of the ten-feature fixture: cumulative 0.6, 0.9, 0.98, 1.0, ...
pub const SCENARIO_RATIOS: [f64; 10] = [0.6, 0.3, 0.08, 0.02, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

pub fn random_table(n_samples: usize, n_features: usize, seed: u64) -> Table {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n_samples, n_features), |_| rng.gen_range(-1.0..1.0));
    let names: Vec<String> = (0..n_features).map(|j| format!("x{}", j)).collect();
    Table::from_features(&names, x).unwrap()
}

/// Provider that returns a fixed spectrum, truncated to what the data allows,
/// and counts how often it fits and projects.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    ratios: Vec<f64>,
    fail_with: Option<String>,
    pub fits: Rc<Cell<usize>>,
    pub applies: Rc<Cell<usize>>,
    pub last_chain: Rc<RefCell<Vec<Preprocessor>>>,
}

impl ScriptedProvider {
    pub fn new(ratios: &[f64]) -> Self {
        Self {
            ratios: ratios.to_vec(),
            fail_with: None,
            fits: Rc::new(Cell::new(0)),
            applies: Rc::new(Cell::new(0)),
            last_chain: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(&[])
        }
    }

    pub fn fit_count(&self) -> usize {
        self.fits.get()
    }

    pub fn apply_count(&self) -> usize {
        self.applies.get()
    }
}

#[derive(Debug)]
pub struct ScriptedProjection {
    ratios: Array1<f64>,
    components: Array2<f64>,
    domain: Domain,
    applies: Rc<Cell<usize>>,
}

impl DecompositionProvider for ScriptedProvider {
    type Projection = ScriptedProjection;

    fn fit(
        &self,
        data: &Table,
        preprocessors: &[Preprocessor],
        n_components: usize,
    ) -> Result<ScriptedProjection> {
        self.fits.set(self.fits.get() + 1);
        *self.last_chain.borrow_mut() = preprocessors.to_vec();
        if let Some(message) = &self.fail_with {
            return Err(PcaError::Decomposition(message.clone()));
        }
        let k = n_components
            .min(data.n_attributes())
            .min(data.n_rows())
            .min(self.ratios.len());
        let n_features = data.n_attributes();
        Ok(ScriptedProjection {
            ratios: Array1::from(self.ratios[..k].to_vec()),
            components: Array2::from_shape_fn((k, n_features), |(i, j)| if i == j { 1.0 } else { 0.0 }),
            domain: data.domain().clone(),
            applies: Rc::clone(&self.applies),
        })
    }
}

impl Projection for ScriptedProjection {
    fn explained_variance_ratio(&self) -> ArrayView1<'_, f64> {
        self.ratios.view()
    }

    fn components(&self) -> ArrayView2<'_, f64> {
        self.components.view()
    }

    fn orig_domain(&self) -> &Domain {
        &self.domain
    }

    // Scores only: the class and meta columns of `data` are not carried over.
    fn apply(&self, data: &Table) -> Result<Table> {
        self.applies.set(self.applies.get() + 1);
        let scores = data.x().dot(&self.components.t());
        let n_rows = scores.nrows();
        let attributes = (0..self.components.nrows())
            .map(|k| {
                Variable::continuous(format!("PC{}", k + 1))
                    .with_derivation(Derivation::Projection { component: k })
            })
            .collect();
        Table::new(
            Domain::new(attributes, Vec::new(), Vec::new()),
            scores,
            Array2::zeros((n_rows, 0)),
            Array2::default((n_rows, 0)),
        )
    }
}
