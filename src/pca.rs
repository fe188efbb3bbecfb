// Principal component analysis (PCA) used as the decomposition provider

use crate::error::{PcaError, Result};
use crate::linalg_backends::{BackendEigh, LinAlgBackendProvider};
use crate::preprocess::{default_preprocessors, FittedPreprocessing, Preprocessor};
use crate::table::{Derivation, Domain, Table, Variable};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Total variance at or below this fraction of the data's squared magnitude
/// is indistinguishable from rounding noise around a constant.
const TRIVIAL_VARIANCE_RTOL: f64 = 1e-20;

/// Norms below this are treated as a degenerate (zero) principal axis.
const NORMALIZATION_THRESHOLD: f64 = 1e-9;

/// A fitted decomposition, as seen by the component-selection controller.
pub trait Projection {
    /// Fraction of the total variance explained by each component, in
    /// descending order. Sums to at most 1; all NaN when the input had no
    /// variance at all.
    fn explained_variance_ratio(&self) -> ArrayView1<'_, f64>;

    /// Loading vectors, one row per component, one column per original feature.
    fn components(&self) -> ArrayView2<'_, f64>;

    /// Domain of the data the projection was fitted on.
    fn orig_domain(&self) -> &Domain;

    /// Projects `data` onto every fitted component. Only the feature columns
    /// of the result are read; passthrough columns are taken from `data`.
    fn apply(&self, data: &Table) -> Result<Table>;
}

/// Something that can fit a [`Projection`] on a table.
pub trait DecompositionProvider {
    type Projection: Projection;

    /// The provider's own preprocessing chain; callers append to it.
    fn preprocessors(&self) -> Vec<Preprocessor> {
        default_preprocessors()
    }

    /// Fits at most `n_components` components on `data` after running
    /// `preprocessors`. The provider centers the data itself.
    fn fit(
        &self,
        data: &Table,
        preprocessors: &[Preprocessor],
        n_components: usize,
    ) -> Result<Self::Projection>;
}

/// Exact PCA through an eigendecomposition of the covariance matrix, or of
/// the Gram matrix when there are more features than samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct PCA {
    backend: LinAlgBackendProvider<f64>,
}

/// A fitted PCA model.
///
/// Holds the fitted preprocessing, the mean removed before projecting, the
/// loading vectors and the variance spectrum. Models can be saved to and
/// loaded from files.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PcaModel {
    /// Domain of the training data.
    orig_domain: Domain,
    /// Preprocessing replayed before centering.
    preprocessing: FittedPreprocessing,
    /// Mean of the preprocessed training data.
    /// Shape: (n_features)
    mean: Array1<f64>,
    /// Loading vectors, unit length, largest-magnitude entry positive.
    /// Shape: (k_components, n_features)
    components: Array2<f64>,
    /// Variance along each component (eigenvalues of the covariance matrix).
    /// Shape: (k_components)
    explained_variance: Array1<f64>,
    /// `explained_variance` divided by the total variance of the data.
    /// Shape: (k_components)
    explained_variance_ratio: Array1<f64>,
}

impl PCA {
    /// Creates a PCA provider using the compiled-in linear algebra backend.
    ///
    /// # Examples
    ///
    /// ```
    /// use pca_select::PCA;
    /// let pca = PCA::new();
    /// ```
    pub fn new() -> Self {
        Self {
            backend: LinAlgBackendProvider::new(),
        }
    }

    /// Fits a model on `data`.
    ///
    /// * `preprocessors` - chain applied to the feature matrix before centering.
    /// * `n_components` - upper bound on the number of components; the model
    ///   keeps `min(n_components, n_features, n_samples)`.
    ///
    /// # Errors
    /// Returns an error if the table has no rows or no features, if
    /// `n_components` is zero, or if the eigendecomposition fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use pca_select::{default_preprocessors, Projection, Table, PCA};
    ///
    /// let data = Table::from_features(
    ///     &["a", "b"],
    ///     array![[1.0, 2.0], [2.0, 4.1], [3.0, 5.9], [4.0, 8.0]],
    /// ).unwrap();
    /// let model = PCA::new().fit_model(&data, &default_preprocessors(), 2).unwrap();
    /// assert_eq!(model.explained_variance_ratio().len(), 2);
    /// ```
    pub fn fit_model(
        &self,
        data: &Table,
        preprocessors: &[Preprocessor],
        n_components: usize,
    ) -> Result<PcaModel> {
        let n_samples = data.n_rows();
        let n_features = data.n_attributes();

        if n_features == 0 {
            return Err(PcaError::NoFeatures);
        }
        if n_samples == 0 {
            return Err(PcaError::NoInstances);
        }
        if n_components == 0 {
            return Err(PcaError::Decomposition(
                "Number of requested components must be greater than 0.".into(),
            ));
        }

        let (preprocessing, mut data_matrix) =
            FittedPreprocessing::fit_transform(preprocessors, data.x());

        let signal = data_matrix.iter().map(|v| v * v).sum::<f64>() / n_samples as f64;
        let mean_vector = data_matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| PcaError::Decomposition("Failed to compute mean of the data.".into()))?;
        data_matrix -= &mean_vector;

        // One sample still yields a (zero) spectrum instead of a division by zero.
        let denom = n_samples.saturating_sub(1).max(1) as f64;
        let total_variance = data_matrix.iter().map(|v| v * v).sum::<f64>() / denom;
        let n_keep = n_components.min(n_features).min(n_samples);

        let (rotation, eigenvalues) = if n_features <= n_samples {
            self.covariance_axes(&data_matrix, denom, n_keep)?
        } else {
            self.gram_axes(&data_matrix, denom, n_keep)?
        };

        let mut components = rotation.reversed_axes();
        for mut row in components.rows_mut() {
            let pivot = row
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            if pivot < 0.0 {
                row.mapv_inplace(|v| -v);
            }
        }

        let explained_variance = Array1::from(eigenvalues);
        let explained_variance_ratio = if total_variance <= TRIVIAL_VARIANCE_RTOL * signal {
            debug!(
                "Total variance {:e} is negligible against signal {:e}; spectrum is trivial.",
                total_variance, signal
            );
            Array1::from_elem(explained_variance.len(), f64::NAN)
        } else {
            explained_variance.mapv(|v| v / total_variance)
        };

        info!(
            "Fitted PCA on {} samples x {} features: kept {} of {} requested components.",
            n_samples,
            n_features,
            components.nrows(),
            n_components
        );

        Ok(PcaModel {
            orig_domain: data.domain().clone(),
            preprocessing,
            mean: mean_vector,
            components,
            explained_variance,
            explained_variance_ratio,
        })
    }

    /// f×f covariance path. Returns principal axes as columns (n_features x k)
    /// and their eigenvalues, largest first.
    fn covariance_axes(
        &self,
        centered: &Array2<f64>,
        denom: f64,
        n_keep: usize,
    ) -> Result<(Array2<f64>, Vec<f64>)> {
        let mut cov_matrix = centered.t().dot(centered);
        cov_matrix /= denom;

        let eig = self.backend.eigh_upper(&cov_matrix).map_err(|e| {
            PcaError::Decomposition(format!("Eigen decomposition of covariance matrix failed: {}", e))
        })?;
        let eig_pairs = sorted_pairs(eig.eigenvalues, eig.eigenvectors);

        let n_features = centered.ncols();
        let mut rotation = Array2::<f64>::zeros((n_features, n_keep));
        let mut values = Vec::with_capacity(n_keep);
        for (i, (eig_val, mut eig_vec)) in eig_pairs.into_iter().take(n_keep).enumerate() {
            values.push(eig_val.max(0.0));
            let norm = eig_vec.dot(&eig_vec).sqrt();
            if norm > NORMALIZATION_THRESHOLD {
                eig_vec.mapv_inplace(|x| x / norm);
            } else {
                eig_vec.fill(0.0);
            }
            rotation.column_mut(i).assign(&eig_vec);
        }
        Ok((rotation, values))
    }

    /// Gram trick path for n_features > n_samples: eigendecompose the n×n
    /// matrix and map each eigenvector back to feature space.
    fn gram_axes(
        &self,
        centered: &Array2<f64>,
        denom: f64,
        n_keep: usize,
    ) -> Result<(Array2<f64>, Vec<f64>)> {
        let mut gram_matrix = centered.dot(&centered.t());
        gram_matrix /= denom;

        let eig = self.backend.eigh_upper(&gram_matrix).map_err(|e| {
            PcaError::Decomposition(format!("Eigen decomposition of Gram matrix failed: {}", e))
        })?;
        let eig_pairs = sorted_pairs(eig.eigenvalues, eig.eigenvectors);

        let n_features = centered.ncols();
        let mut rotation = Array2::<f64>::zeros((n_features, n_keep));
        let mut values = Vec::with_capacity(n_keep);
        for (i, (eig_val, u_col)) in eig_pairs.into_iter().take(n_keep).enumerate() {
            values.push(eig_val.max(0.0));
            // V_k = X^T u_k / sqrt(lambda_k (N-1)); renormalized below anyway.
            let mut axis_i = centered.t().dot(&u_col);
            let norm_val = axis_i.dot(&axis_i).sqrt();
            if norm_val > NORMALIZATION_THRESHOLD {
                axis_i.mapv_inplace(|x| x / norm_val);
            } else {
                axis_i.fill(0.0);
            }
            rotation.column_mut(i).assign(&axis_i);
        }
        Ok((rotation, values))
    }
}

/// Pairs eigenvalues with their eigenvector columns, largest eigenvalue first.
fn sorted_pairs(values: Array1<f64>, vectors: Array2<f64>) -> Vec<(f64, Array1<f64>)> {
    let mut eig_pairs: Vec<(f64, Array1<f64>)> = values
        .into_iter()
        .zip(vectors.columns().into_iter().map(|col| col.to_owned()))
        .collect();
    eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    eig_pairs
}

impl DecompositionProvider for PCA {
    type Projection = PcaModel;

    fn fit(
        &self,
        data: &Table,
        preprocessors: &[Preprocessor],
        n_components: usize,
    ) -> Result<PcaModel> {
        self.fit_model(data, preprocessors, n_components)
    }
}

impl PcaModel {
    /// Variance along each component.
    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    /// Mean of the preprocessed training data.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn preprocessing(&self) -> &FittedPreprocessing {
        &self.preprocessing
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Projects a raw feature matrix (n_samples x n_features) onto the
    /// fitted components.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let n_model_features = self.mean.len();
        if x.ncols() != n_model_features {
            return Err(PcaError::Shape(format!(
                "Input data feature dimension ({}) does not match model's feature dimension ({}).",
                x.ncols(),
                n_model_features
            )));
        }
        if x.nrows() == 0 {
            return Ok(Array2::zeros((0, self.n_components())));
        }
        let mut data = self.preprocessing.apply(x)?;
        data -= &self.mean;
        Ok(data.dot(&self.components.t()))
    }

    /// Saves the model with bincode.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| PcaError::Serialization(format!("Failed to serialize PCA model: {}", e)))?;
        Ok(())
    }

    /// Loads a model saved by [`PcaModel::save_model`], checking that its
    /// parts agree on the number of features and components.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let model: PcaModel =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| PcaError::Serialization(format!("Failed to deserialize PCA model: {}", e)))?;

        let n_features = model.orig_domain.attributes().len();
        if model.mean.len() != n_features
            || model.components.ncols() != n_features
            || model.preprocessing.n_features() != n_features
        {
            return Err(PcaError::Shape(format!(
                "Loaded PCA model has inconsistent feature dimensions: domain={}, mean={}, components={}, preprocessing={}",
                n_features,
                model.mean.len(),
                model.components.ncols(),
                model.preprocessing.n_features()
            )));
        }
        let k = model.components.nrows();
        if model.explained_variance.len() != k || model.explained_variance_ratio.len() != k {
            return Err(PcaError::Shape(format!(
                "Loaded PCA model has {} components but {} variances and {} ratios.",
                k,
                model.explained_variance.len(),
                model.explained_variance_ratio.len()
            )));
        }
        if model.explained_variance.iter().any(|&v| !v.is_finite() || v < 0.0) {
            return Err(PcaError::Shape(
                "Loaded PCA model's explained_variance contains non-finite or negative values.".into(),
            ));
        }
        model.preprocessing.validate()?;
        Ok(model)
    }
}

impl Projection for PcaModel {
    fn explained_variance_ratio(&self) -> ArrayView1<'_, f64> {
        self.explained_variance_ratio.view()
    }

    fn components(&self) -> ArrayView2<'_, f64> {
        self.components.view()
    }

    fn orig_domain(&self) -> &Domain {
        &self.orig_domain
    }

    fn apply(&self, data: &Table) -> Result<Table> {
        let scores = self.transform(data.x())?;
        let attributes = (0..self.n_components())
            .map(|k| {
                Variable::continuous(format!("PC{}", k + 1))
                    .with_derivation(Derivation::Projection { component: k })
            })
            .collect();
        data.with_features(attributes, scores)
    }
}
