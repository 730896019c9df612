//! Error types for rtflow-pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Feature name is not a known scalar feature.
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// Box filter bounds are not finite.
    #[error("box filter on '{feature}' needs finite bounds, got [{start}, {end}]")]
    InvalidBoxFilter { feature: String, start: f64, end: f64 },

    /// Identifier is already taken by another pipeline element.
    #[error("{kind} identifier '{identifier}' is already in use")]
    DuplicateIdentifier {
        kind: &'static str,
        identifier: String,
    },

    /// Identifier lookup failed.
    #[error("'{identifier}' not found in {collection}")]
    NotFound {
        collection: &'static str,
        identifier: String,
    },

    /// Positional lookup failed.
    #[error("index {index} out of range for {collection} with {len} entries")]
    IndexOutOfRange {
        collection: &'static str,
        index: isize,
        len: usize,
    },

    /// A slot's feature set differs from the other slots.
    #[error("features of slot '{slot}' differ from the pipeline: {details}")]
    FeatureMismatch { slot: String, details: String },

    /// State was captured from a different element.
    #[error("state of '{found}' cannot be applied to '{expected}'")]
    IdentifierMismatch { expected: String, found: String },

    /// State is internally inconsistent.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] rtflow_core::Error),

    /// JSON conversion error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
