//! Dataset configuration sections.

use std::collections::BTreeMap;

use crate::polygon::PolygonFilter;

/// Inclusive value range for one feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxRange {
    /// Value stored under `"<feature> min"`.
    pub min: f64,
    /// Value stored under `"<feature> max"`.
    pub max: f64,
}

impl BoxRange {
    /// Returns the bounds in ascending order.
    #[must_use]
    pub fn sorted(&self) -> (f64, f64) {
        if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        }
    }

    /// Returns true if `value` lies within the range.
    #[inline]
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        let (lo, hi) = self.sorted();
        value >= lo && value <= hi
    }
}

/// The `"filtering"` configuration section of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteringConfig {
    /// `"enable filters"`: when false every event passes.
    pub enable_filters: bool,
    /// `"remove invalid events"`: drop events with non-finite scalar values.
    pub remove_invalid_events: bool,
    /// `"limit events"`: maximum number of passing events, 0 for no limit.
    pub limit_events: usize,
    ranges: BTreeMap<String, BoxRange>,
    polygon_filters: Vec<PolygonFilter>,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            enable_filters: true,
            remove_invalid_events: false,
            limit_events: 0,
            ranges: BTreeMap::new(),
            polygon_filters: Vec::new(),
        }
    }
}

impl FilteringConfig {
    /// Sets `"<feature> min"` and `"<feature> max"`.
    pub fn set_range(&mut self, feature: &str, min: f64, max: f64) {
        self.ranges.insert(feature.to_string(), BoxRange { min, max });
    }

    /// Removes the range of a feature.
    pub fn remove_range(&mut self, feature: &str) -> Option<BoxRange> {
        self.ranges.remove(feature)
    }

    /// Returns the range of a feature.
    #[must_use]
    pub fn range(&self, feature: &str) -> Option<BoxRange> {
        self.ranges.get(feature).copied()
    }

    /// Returns all ranges keyed by feature name.
    #[must_use]
    pub fn ranges(&self) -> &BTreeMap<String, BoxRange> {
        &self.ranges
    }

    /// Attaches a polygon filter, replacing one with the same identifier.
    pub fn polygon_filter_add(&mut self, polygon: PolygonFilter) {
        match self
            .polygon_filters
            .iter_mut()
            .find(|p| p.identifier == polygon.identifier)
        {
            Some(existing) => *existing = polygon,
            None => self.polygon_filters.push(polygon),
        }
    }

    /// Returns the attached polygon filters.
    #[must_use]
    pub fn polygon_filters(&self) -> &[PolygonFilter] {
        &self.polygon_filters
    }
}

/// The `"calculation"` configuration section used for ancillary features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalculationConfig {
    /// Medium name for the Young's modulus computation.
    pub emodulus_medium: Option<String>,
    /// Viscosity model for the Young's modulus computation.
    pub emodulus_viscosity_model: Option<String>,
    /// Manually set temperature [°C]; `None` uses the `temp` feature.
    pub emodulus_temperature: Option<f64>,
    /// Look-up table identifier.
    pub emodulus_lut: Option<String>,
}

/// Complete configuration of a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetConfig {
    /// Filtering section.
    pub filtering: FilteringConfig,
    /// Calculation section.
    pub calculation: CalculationConfig,
    /// Fluorescence channel names, e.g. `"channel 1 name" -> "GFP"`.
    pub fluorescence: BTreeMap<String, String>,
}
