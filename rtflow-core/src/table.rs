//! Columnar storage of raw measurement features.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

/// Raw event data of one measurement.
///
/// Scalar features are stored as equally long `f64` columns. Non-scalar
/// features (images, contours, traces) are only registered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    columns: BTreeMap<String, Vec<f64>>,
    non_scalar: BTreeSet<String>,
    len: Option<usize>,
}

impl FeatureTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scalar column, builder style.
    ///
    /// # Errors
    /// Returns [`Error::RaggedTable`] if the column length differs from
    /// the columns already present.
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Result<Self> {
        self.insert_column(name, values)?;
        Ok(self)
    }

    /// Registers a non-scalar feature, builder style.
    #[must_use]
    pub fn with_non_scalar(mut self, name: &str) -> Self {
        self.non_scalar.insert(name.to_string());
        self
    }

    /// Inserts or replaces a scalar column.
    ///
    /// # Errors
    /// Returns [`Error::RaggedTable`] if the column length differs from
    /// the columns already present.
    pub fn insert_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        let replacing_only_column = self.columns.len() == 1 && self.columns.contains_key(name);
        match self.len {
            Some(expected) if expected != values.len() && !replacing_only_column => {
                return Err(Error::RaggedTable {
                    feature: name.to_string(),
                    expected,
                    found: values.len(),
                });
            }
            _ => self.len = Some(values.len()),
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.unwrap_or(0)
    }

    /// Returns true if the table holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the raw values of a scalar column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Returns true if the table provides the feature (scalar or not).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name) || self.non_scalar.contains(name)
    }

    /// Returns the scalar feature names in sorted order.
    pub fn scalar_features(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Returns all feature names (scalar and non-scalar) in sorted order.
    #[must_use]
    pub fn features(&self) -> Vec<String> {
        let all: BTreeSet<&String> = self.columns.keys().chain(&self.non_scalar).collect();
        all.into_iter().cloned().collect()
    }
}
