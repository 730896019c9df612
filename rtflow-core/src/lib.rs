//! rtflow-core: Dataset handles and filtering for RT-DC measurements.
//!
//! This crate provides the dataset contract consumed by the pipeline:
//! columnar scalar features, the filtering configuration section,
//! filter evaluation, hierarchy children and polygon filters.
//!

pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod polygon;
pub mod source;
pub mod table;

pub use config::{BoxRange, CalculationConfig, DatasetConfig, FilteringConfig};
pub use dataset::{Dataset, DatasetHandle, FeatureColumn, FilterMask};
pub use error::{Error, Result};
pub use features::{feature_exists, feature_label, scalar_feature_exists};
pub use polygon::PolygonFilter;
pub use source::{DatasetSource, MemorySource};
pub use table::FeatureTable;
