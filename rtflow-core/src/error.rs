//! Error types for rtflow-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for rtflow-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for dataset operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Feature name is not part of the known feature set.
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// Feature is known but not available in a dataset.
    #[error("feature '{feature}' not found in dataset '{dataset}'")]
    FeatureNotFound { feature: String, dataset: String },

    /// Column length does not match the other columns of a table.
    #[error("feature '{feature}' has {found} events, expected {expected}")]
    RaggedTable {
        feature: String,
        expected: usize,
        found: usize,
    },

    /// No measurement is registered under the given path.
    #[error("dataset not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    /// Polygon filter definition is unusable.
    #[error("invalid polygon filter: {0}")]
    InvalidPolygon(String),
}
