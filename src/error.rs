// src/error.rs

use thiserror::Error;

/// Result type alias for pca_select operations.
pub type Result<T> = std::result::Result<T, PcaError>;

/// How a failure should be surfaced to whoever drives the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Errors that can occur while fitting, selecting or assembling outputs.
#[derive(Error, Debug)]
pub enum PcaError {
    #[error("At least 1 feature is required")]
    NoFeatures,

    #[error("At least 1 data instance is required")]
    NoInstances,

    #[error("All components of the PCA are trivial (explain 0 variance). Input data is constant (or near constant).")]
    TrivialComponents,

    #[error("Decomposition failed: {0}")]
    Decomposition(String),

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model serialization error: {0}")]
    Serialization(String),
}

impl PcaError {
    /// Degenerate input is a warning; everything else is an error.
    pub fn severity(&self) -> Severity {
        match self {
            PcaError::TrivialComponents => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// True for rejections caused by the supplied dataset itself.
    pub fn is_user_input(&self) -> bool {
        matches!(self, PcaError::NoFeatures | PcaError::NoInstances)
    }
}

/// A report kept by the controller after a failed data or fit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub text: String,
}

impl From<&PcaError> for Notice {
    fn from(err: &PcaError) -> Self {
        Notice {
            severity: err.severity(),
            text: err.to_string(),
        }
    }
}
