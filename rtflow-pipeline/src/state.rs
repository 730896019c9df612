//! Serialized pipeline state and filter exports.

use std::collections::BTreeMap;

use rtflow_core::PolygonFilter;
use serde::{Deserialize, Serialize};

use crate::dataslot::SlotState;
use crate::error::Result;
use crate::filter::FilterState;
use crate::plot::PlotState;

/// Complete state of a [`crate::Pipeline`].
///
/// Serializes to the session dictionary with the keys `elements`,
/// `filters`, `filters used`, `plots`, `slots` and `slots used`.
/// Polygon filters are stored under `polygon filters` when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Activation matrix: slot identifier -> filter/plot identifier -> active.
    pub elements: BTreeMap<String, BTreeMap<String, bool>>,
    pub filters: Vec<FilterState>,
    #[serde(rename = "filters used")]
    pub filters_used: Vec<String>,
    pub plots: Vec<PlotState>,
    pub slots: Vec<SlotState>,
    #[serde(rename = "slots used")]
    pub slots_used: Vec<String>,
    #[serde(
        rename = "polygon filters",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub polygon_filters: Vec<PolygonFilter>,
}

impl PipelineState {
    /// Serializes the state to a JSON string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a state from a JSON string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Json`] for malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Exported filters together with the polygon filters they reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterExport {
    #[serde(rename = "polygon filters")]
    pub polygon_filters: Vec<PolygonFilter>,
    pub filters: Vec<FilterState>,
}

impl FilterExport {
    /// Serializes the export to a JSON string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses an export from a JSON string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Json`] for malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
