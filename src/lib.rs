// Component selection over a principal component analysis (PCA)

#![doc = include_str!("../README.md")]

pub mod assembler;
pub mod controller;
pub mod error;
pub mod linalg_backends;
pub mod pca;
pub mod preprocess;
pub mod selection;
pub mod settings;
pub mod spectrum;
pub mod table;

pub use assembler::{assemble, components_table, FittedProjection, Outputs, PcaProjector};
pub use controller::PcaController;
pub use error::{Notice, PcaError, Result, Severity};
pub use pca::{DecompositionProvider, PcaModel, Projection, PCA};
pub use preprocess::{default_preprocessors, Preprocessor};
pub use selection::{ComponentSelection, SelectionState, SelectionSynchronizer};
pub use settings::{migrate_settings, PcaSettings, MAX_COMPONENTS};
pub use spectrum::VarianceSpectrum;
pub use table::{Derivation, Domain, MetaValue, Table, Variable};
