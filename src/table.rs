// src/table.rs

use crate::error::{PcaError, Result};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where the values of a column come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Derivation {
    /// Read directly from the source data.
    Source,
    /// Score on the given (0-based) principal component of a fitted projection.
    Projection { component: usize },
    /// Describes a model rather than rows of some table; must never be
    /// recomputed from another table's values.
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Continuous,
    Text,
}

/// A named column description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub derivation: Derivation,
}

impl Variable {
    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VarKind::Continuous,
            derivation: Derivation::Source,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VarKind::Text,
            derivation: Derivation::Source,
        }
    }

    pub fn with_derivation(mut self, derivation: Derivation) -> Self {
        self.derivation = derivation;
        self
    }

    /// Whether consumers may treat the column as computable from input rows.
    pub fn is_derivable(&self) -> bool {
        self.derivation != Derivation::Detached
    }
}

/// Column layout of a table: features, class columns and meta columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    attributes: Vec<Variable>,
    class_vars: Vec<Variable>,
    metas: Vec<Variable>,
}

impl Domain {
    pub fn new(attributes: Vec<Variable>, class_vars: Vec<Variable>, metas: Vec<Variable>) -> Self {
        Self {
            attributes,
            class_vars,
            metas,
        }
    }

    /// Domain with continuous features only.
    pub fn from_feature_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self::new(
            names.iter().map(|n| Variable::continuous(n.as_ref())).collect(),
            Vec::new(),
            Vec::new(),
        )
    }

    pub fn attributes(&self) -> &[Variable] {
        &self.attributes
    }

    pub fn class_vars(&self) -> &[Variable] {
        &self.class_vars
    }

    pub fn metas(&self) -> &[Variable] {
        &self.metas
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.iter().map(|v| v.name.as_str()).collect()
    }
}

/// Value stored in a meta column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

/// An immutable in-memory dataset.
///
/// Feature values live in `x` (rows x attributes, NaN marks a missing value).
/// Class and meta columns are reference counted so that tables derived from
/// this one carry them along without copying.
#[derive(Debug, Clone)]
pub struct Table {
    name: Option<String>,
    domain: Domain,
    x: Array2<f64>,
    y: Arc<Array2<f64>>,
    metas: Arc<Array2<MetaValue>>,
}

impl Table {
    /// Builds a table, checking that every block agrees with the domain and
    /// that all blocks have the same number of rows.
    pub fn new(
        domain: Domain,
        x: Array2<f64>,
        y: Array2<f64>,
        metas: Array2<MetaValue>,
    ) -> Result<Self> {
        Self::from_shared(domain, x, Arc::new(y), Arc::new(metas))
    }

    /// A table holding only continuous features named after `names`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use pca_select::Table;
    ///
    /// let table = Table::from_features(&["a", "b"], array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
    /// assert_eq!(table.n_rows(), 2);
    /// assert_eq!(table.n_attributes(), 2);
    /// ```
    pub fn from_features<S: AsRef<str>>(names: &[S], x: Array2<f64>) -> Result<Self> {
        let n_rows = x.nrows();
        Self::new(
            Domain::from_feature_names(names),
            x,
            Array2::zeros((n_rows, 0)),
            Array2::default((n_rows, 0)),
        )
    }

    fn from_shared(
        domain: Domain,
        x: Array2<f64>,
        y: Arc<Array2<f64>>,
        metas: Arc<Array2<MetaValue>>,
    ) -> Result<Self> {
        if x.ncols() != domain.attributes.len() {
            return Err(PcaError::Shape(format!(
                "feature matrix has {} columns but the domain declares {} attributes",
                x.ncols(),
                domain.attributes.len()
            )));
        }
        if y.ncols() != domain.class_vars.len() {
            return Err(PcaError::Shape(format!(
                "class matrix has {} columns but the domain declares {} class variables",
                y.ncols(),
                domain.class_vars.len()
            )));
        }
        if metas.ncols() != domain.metas.len() {
            return Err(PcaError::Shape(format!(
                "meta matrix has {} columns but the domain declares {} metas",
                metas.ncols(),
                domain.metas.len()
            )));
        }
        if y.nrows() != x.nrows() || metas.nrows() != x.nrows() {
            return Err(PcaError::Shape(format!(
                "row counts differ: x={}, y={}, metas={}",
                x.nrows(),
                y.nrows(),
                metas.nrows()
            )));
        }
        Ok(Self {
            name: None,
            domain,
            x,
            y,
            metas,
        })
    }

    /// A table with new feature columns and this table's name, class and
    /// meta columns passed through unchanged.
    pub fn with_features(&self, attributes: Vec<Variable>, x: Array2<f64>) -> Result<Self> {
        let domain = Domain::new(
            attributes,
            self.domain.class_vars.clone(),
            self.domain.metas.clone(),
        );
        let mut table = Self::from_shared(domain, x, Arc::clone(&self.y), Arc::clone(&self.metas))?;
        table.name = self.name.clone();
        Ok(table)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f64> {
        self.y.view()
    }

    pub fn metas(&self) -> ArrayView2<'_, MetaValue> {
        self.metas.view()
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_attributes(&self) -> usize {
        self.x.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// True when `other` shares this table's class and meta storage.
    pub fn shares_passthrough_with(&self, other: &Table) -> bool {
        Arc::ptr_eq(&self.y, &other.y) && Arc::ptr_eq(&self.metas, &other.metas)
    }
}
