//! Reusable filter definitions.
//!
//! A [`Filter`] bundles box (range) filters, polygon filter references,
//! an event limit and invalid-event removal. It writes these settings
//! into a dataset's filtering configuration and reports a content hash
//! that ignores identifier and name.

use std::collections::BTreeMap;

use rtflow_core::{scalar_feature_exists, Dataset};
use serde::{Deserialize, Serialize};

use crate::digest::ContentHasher;
use crate::error::{Error, Result};
use crate::polygons::PolygonRegistry;

/// Default cap used when the event limit is switched on.
pub const DEFAULT_LIMIT_EVENTS: usize = 10_000;

/// Range constraint on one scalar feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxFilter {
    /// Lower bound.
    pub start: f64,
    /// Upper bound.
    pub end: f64,
    /// Bounds are only honored when active.
    pub active: bool,
}

/// Serialized form of a [`Filter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub identifier: String,
    pub name: String,
    #[serde(rename = "filter used")]
    pub filter_used: bool,
    #[serde(rename = "box filters")]
    pub box_filters: BTreeMap<String, BoxFilter>,
    #[serde(rename = "polygon filters")]
    pub polygon_filters: Vec<String>,
    /// `[enabled, maximum number of events]`
    #[serde(rename = "limit events")]
    pub limit_events: (bool, usize),
    #[serde(rename = "remove invalid events")]
    pub remove_invalid_events: bool,
}

/// A named filter applicable to any slot of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    identifier: String,
    /// Display name.
    pub name: String,
    /// The filter's own enable flag; disabled filters are skipped.
    pub filter_used: bool,
    /// Remove events with non-finite scalar values.
    pub remove_invalid_events: bool,
    /// Whether `limit_events_count` is enforced.
    pub limit_events_enabled: bool,
    /// Maximum number of events when the limit is enabled.
    pub limit_events_count: usize,
    box_filters: BTreeMap<String, BoxFilter>,
    polygon_filters: Vec<String>,
}

impl Filter {
    /// Creates a filter that lets every event pass.
    ///
    /// An empty identifier is replaced when the filter is added to a pipeline.
    #[must_use]
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            name: identifier.replace('_', " "),
            filter_used: true,
            remove_invalid_events: false,
            limit_events_enabled: false,
            limit_events_count: DEFAULT_LIMIT_EVENTS,
            box_filters: BTreeMap::new(),
            polygon_filters: Vec::new(),
        }
    }

    /// Restores a filter from its state.
    ///
    /// # Errors
    /// Returns [`Error::UnknownFeature`] if a box filter names an unknown feature.
    pub fn from_state(state: &FilterState) -> Result<Self> {
        let mut filter = Self::new(&state.identifier);
        filter.set_state(state)?;
        Ok(filter)
    }

    /// Returns the identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn assign_identifier(&mut self, identifier: String) {
        if self.name.is_empty() {
            self.name = identifier.replace('_', " ");
        }
        self.identifier = identifier;
    }

    /// Adds or replaces the box filter of a scalar feature.
    ///
    /// # Errors
    /// Returns [`Error::UnknownFeature`] if `feature` is not a known
    /// scalar feature and [`Error::InvalidBoxFilter`] for non-finite
    /// bounds; the box filters are left unchanged.
    pub fn add_box_filter(
        &mut self,
        feature: &str,
        start: f64,
        end: f64,
        active: bool,
    ) -> Result<()> {
        let spec = BoxFilter { start, end, active };
        check_box_filter(feature, &spec)?;
        self.box_filters.insert(feature.to_string(), spec);
        Ok(())
    }

    /// Removes the box filter of a feature.
    pub fn remove_box_filter(&mut self, feature: &str) -> Option<BoxFilter> {
        self.box_filters.remove(feature)
    }

    /// Returns the box filters keyed by feature.
    #[must_use]
    pub fn box_filters(&self) -> &BTreeMap<String, BoxFilter> {
        &self.box_filters
    }

    /// Adds a polygon filter reference.
    pub fn add_polygon_filter(&mut self, identifier: &str) {
        if !self.polygon_filters.iter().any(|p| p == identifier) {
            self.polygon_filters.push(identifier.to_string());
        }
    }

    /// Removes a polygon filter reference; returns true if it was present.
    pub fn remove_polygon_filter(&mut self, identifier: &str) -> bool {
        let before = self.polygon_filters.len();
        self.polygon_filters.retain(|p| p != identifier);
        before != self.polygon_filters.len()
    }

    /// Returns the referenced polygon filter identifiers.
    #[must_use]
    pub fn polygon_filters(&self) -> &[String] {
        &self.polygon_filters
    }

    /// Writes this filter into the filtering configuration of `dataset`.
    ///
    /// Previous filtering settings are reset first. The filter is not
    /// evaluated; call [`Dataset::apply_filter`] afterwards. A filter
    /// whose `filter_used` flag is off leaves `dataset` untouched.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if a referenced polygon filter is not in
    /// `polygons`; `dataset` is left untouched in that case.
    pub fn update_dataset(
        &self,
        dataset: &mut Dataset,
        polygons: &PolygonRegistry,
    ) -> Result<()> {
        if !self.filter_used {
            return Ok(());
        }
        let resolved = self
            .polygon_filters
            .iter()
            .map(|id| polygons.get(id).cloned())
            .collect::<Result<Vec<_>>>()?;

        dataset.reset_filter();
        let filtering = &mut dataset.config.filtering;
        filtering.remove_invalid_events = self.remove_invalid_events;
        filtering.limit_events = if self.limit_events_enabled {
            self.limit_events_count
        } else {
            0
        };
        for (feature, spec) in &self.box_filters {
            if spec.active {
                filtering.set_range(feature, spec.start, spec.end);
            }
        }
        for polygon in resolved {
            dataset.polygon_filter_add(polygon);
        }
        Ok(())
    }

    /// Returns a digest of all settings except identifier and name.
    ///
    /// The geometry of referenced polygon filters is part of the digest.
    #[must_use]
    pub fn hash(&self, polygons: &PolygonRegistry) -> String {
        let mut hasher = ContentHasher::new("filter");
        hasher
            .bool(self.filter_used)
            .bool(self.remove_invalid_events)
            .bool(self.limit_events_enabled)
            .usize(self.limit_events_count)
            .usize(self.box_filters.len());
        for (feature, spec) in &self.box_filters {
            hasher
                .str(feature)
                .f64(spec.start)
                .f64(spec.end)
                .bool(spec.active);
        }
        hasher.usize(self.polygon_filters.len());
        for identifier in &self.polygon_filters {
            polygons.hash_into(identifier, &mut hasher);
        }
        hasher.finish()
    }

    /// Captures the current settings.
    #[must_use]
    pub fn state(&self) -> FilterState {
        FilterState {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            filter_used: self.filter_used,
            box_filters: self.box_filters.clone(),
            polygon_filters: self.polygon_filters.clone(),
            limit_events: (self.limit_events_enabled, self.limit_events_count),
            remove_invalid_events: self.remove_invalid_events,
        }
    }

    /// Applies a previously captured state.
    ///
    /// # Errors
    /// Returns [`Error::IdentifierMismatch`] if the state belongs to another
    /// filter, [`Error::UnknownFeature`] for box filters on unknown
    /// features and [`Error::InvalidBoxFilter`] for non-finite bounds.
    /// The filter is unchanged on error.
    pub fn set_state(&mut self, state: &FilterState) -> Result<()> {
        if state.identifier != self.identifier {
            return Err(Error::IdentifierMismatch {
                expected: self.identifier.clone(),
                found: state.identifier.clone(),
            });
        }
        for (feature, spec) in &state.box_filters {
            check_box_filter(feature, spec)?;
        }
        self.name.clone_from(&state.name);
        self.filter_used = state.filter_used;
        self.box_filters.clone_from(&state.box_filters);
        self.polygon_filters.clone_from(&state.polygon_filters);
        (self.limit_events_enabled, self.limit_events_count) = state.limit_events;
        self.remove_invalid_events = state.remove_invalid_events;
        Ok(())
    }
}

/// Checks that a box filter names a scalar feature and has finite bounds.
///
/// Non-finite bounds have no JSON representation, so they are rejected
/// before they can reach a saved session.
pub(crate) fn check_box_filter(feature: &str, spec: &BoxFilter) -> Result<()> {
    if !scalar_feature_exists(feature) {
        return Err(Error::UnknownFeature(feature.to_string()));
    }
    if !(spec.start.is_finite() && spec.end.is_finite()) {
        return Err(Error::InvalidBoxFilter {
            feature: feature.to_string(),
            start: spec.start,
            end: spec.end,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtflow_core::{FeatureTable, PolygonFilter};

    fn sample_dataset() -> Dataset {
        let table = FeatureTable::new()
            .with_column("area_um", vec![5.0, 15.0, 25.0, 35.0, 45.0, 55.0])
            .unwrap()
            .with_column("deform", vec![0.01, 0.02, 0.03, 0.04, 0.05, f64::NAN])
            .unwrap();
        Dataset::new("sample", table)
    }

    #[test]
    fn test_add_box_filter_unknown_feature() {
        let mut filt = Filter::new("Filter_1");
        filt.add_box_filter("area_um", 10.0, 50.0, true).unwrap();
        let before = filt.box_filters().clone();

        let err = filt.add_box_filter("peter", 0.0, 1.0, true).unwrap_err();
        assert!(matches!(err, Error::UnknownFeature(ref f) if f == "peter"));
        assert_eq!(filt.box_filters(), &before);
    }

    #[test]
    fn test_add_box_filter_non_finite() {
        let mut filt = Filter::new("Filter_1");
        filt.add_box_filter("area_um", 10.0, 50.0, true).unwrap();
        let before = filt.box_filters().clone();

        let err = filt
            .add_box_filter("deform", f64::NEG_INFINITY, 0.1, true)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBoxFilter { ref feature, .. } if feature == "deform"));
        assert!(filt.add_box_filter("area_um", 0.0, f64::NAN, false).is_err());
        assert!(filt.add_box_filter("area_um", 0.0, f64::INFINITY, true).is_err());
        assert_eq!(filt.box_filters(), &before);
    }

    #[test]
    fn test_set_state_rejects_non_finite_bounds() {
        let mut filt = Filter::new("Filter_1");
        filt.add_box_filter("area_um", 10.0, 50.0, true).unwrap();
        let before = filt.clone();

        let mut state = filt.state();
        state.name = "changed".to_string();
        state.box_filters.insert(
            "deform".to_string(),
            BoxFilter {
                start: 0.0,
                end: f64::INFINITY,
                active: true,
            },
        );
        assert!(matches!(
            filt.set_state(&state),
            Err(Error::InvalidBoxFilter { .. })
        ));
        assert_eq!(filt, before);
    }

    #[test]
    fn test_add_box_filter_overwrites() {
        let mut filt = Filter::new("Filter_1");
        filt.add_box_filter("area_um", 10.0, 50.0, true).unwrap();
        filt.add_box_filter("area_um", 20.0, 30.0, false).unwrap();
        assert_eq!(
            filt.box_filters()["area_um"],
            BoxFilter {
                start: 20.0,
                end: 30.0,
                active: false
            }
        );
    }

    #[test]
    fn test_update_dataset() {
        let polygons = PolygonRegistry::new();
        let mut filt = Filter::new("Filter_1");
        filt.add_box_filter("area_um", 10.0, 50.0, true).unwrap();
        filt.add_box_filter("deform", 0.0, 0.02, false).unwrap();
        filt.remove_invalid_events = true;
        filt.limit_events_enabled = true;
        filt.limit_events_count = 3;

        let mut ds = sample_dataset();
        ds.config.filtering.set_range("bright_avg", 0.0, 1.0);
        filt.update_dataset(&mut ds, &polygons).unwrap();

        let filtering = &ds.config.filtering;
        assert!(filtering.enable_filters);
        assert!(filtering.remove_invalid_events);
        assert_eq!(filtering.limit_events, 3);
        assert!(filtering.range("bright_avg").is_none());
        assert!(filtering.range("deform").is_none());
        let range = filtering.range("area_um").unwrap();
        assert!((range.min - 10.0).abs() < f64::EPSILON);

        ds.apply_filter().unwrap();
        assert_eq!(ds.filter().count(), 3);
    }

    #[test]
    fn test_limit_disabled_writes_zero() {
        let filt = Filter::new("Filter_1");
        let mut ds = sample_dataset();
        filt.update_dataset(&mut ds, &PolygonRegistry::new()).unwrap();
        assert_eq!(ds.config.filtering.limit_events, 0);
    }

    #[test]
    fn test_disabled_filter_leaves_dataset_untouched() {
        let mut filt = Filter::new("Filter_1");
        filt.add_box_filter("area_um", 10.0, 50.0, true).unwrap();
        filt.limit_events_enabled = true;
        filt.limit_events_count = 2;
        filt.filter_used = false;

        let mut ds = sample_dataset();
        ds.config.filtering.set_range("deform", 0.0, 0.03);
        let before = ds.config.filtering.clone();
        filt.update_dataset(&mut ds, &PolygonRegistry::new()).unwrap();

        let filtering = &ds.config.filtering;
        assert_eq!(filtering, &before);
        assert!(filtering.enable_filters);
        assert!(filtering.range("area_um").is_none());
        assert_eq!(filtering.limit_events, 0);
    }

    #[test]
    fn test_update_dataset_missing_polygon() {
        let mut filt = Filter::new("Filter_1");
        filt.add_polygon_filter("Polygon_9");
        let mut ds = sample_dataset();
        ds.config.filtering.set_range("area_um", 0.0, 1.0);
        let err = filt
            .update_dataset(&mut ds, &PolygonRegistry::new())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(ds.config.filtering.range("area_um").is_some());
    }

    #[test]
    fn test_hash_ignores_identity() {
        let polygons = PolygonRegistry::new();
        let mut a = Filter::new("Filter_1");
        let mut b = Filter::new("Filter_2");
        for filt in [&mut a, &mut b] {
            filt.add_box_filter("area_um", 10.0, 50.0, true).unwrap();
            filt.remove_invalid_events = true;
        }
        b.name = "Other name".to_string();
        assert_eq!(a.hash(&polygons), b.hash(&polygons));

        b.add_box_filter("area_um", 10.0, 50.0, false).unwrap();
        assert_ne!(a.hash(&polygons), b.hash(&polygons));
    }

    #[test]
    fn test_hash_tracks_every_setting() {
        let polygons = PolygonRegistry::new();
        let mut base = Filter::new("Filter_1");
        base.add_box_filter("area_um", 10.0, 50.0, true).unwrap();
        let reference = base.hash(&polygons);

        let variants: [(&str, fn(&mut Filter)); 9] = [
            ("start", |f| f.add_box_filter("area_um", 11.0, 50.0, true).unwrap()),
            ("end", |f| f.add_box_filter("area_um", 10.0, 51.0, true).unwrap()),
            ("active", |f| f.add_box_filter("area_um", 10.0, 50.0, false).unwrap()),
            ("feature", |f| {
                f.remove_box_filter("area_um");
                f.add_box_filter("deform", 10.0, 50.0, true).unwrap();
            }),
            ("remove invalid", |f| f.remove_invalid_events = true),
            ("limit count", |f| f.limit_events_count += 1),
            ("limit enabled", |f| f.limit_events_enabled = true),
            ("filter used", |f| f.filter_used = false),
            ("polygon", |f| f.add_polygon_filter("Polygon_1")),
        ];
        for (setting, change) in variants {
            let mut filt = base.clone();
            change(&mut filt);
            assert_ne!(filt.hash(&polygons), reference, "{setting} not in hash");
        }
    }

    #[test]
    fn test_hash_tracks_polygon_geometry() {
        let mut polygons = PolygonRegistry::new();
        polygons.push(
            PolygonFilter::new(
                "Polygon_1",
                ("area_um", "deform"),
                vec![[0.0, 0.0], [0.0, 1.0], [50.0, 1.0]],
            )
            .unwrap(),
        );
        let mut filt = Filter::new("Filter_1");
        filt.add_polygon_filter("Polygon_1");
        let before = filt.hash(&polygons);

        polygons.get_mut("Polygon_1").unwrap().inverted = true;
        assert_ne!(before, filt.hash(&polygons));
    }

    #[test]
    fn test_state_round_trip() {
        let mut filt = Filter::new("Filter_1");
        filt.add_box_filter("deform", 0.0, 0.1, true).unwrap();
        filt.add_polygon_filter("Polygon_1");
        filt.limit_events_enabled = true;
        let state = filt.state();

        let mut other = Filter::new("Filter_1");
        other.set_state(&state).unwrap();
        assert_eq!(other, filt);
        other.set_state(&state).unwrap();
        assert_eq!(other.state(), state);

        let mut wrong = Filter::new("Filter_2");
        assert!(matches!(
            wrong.set_state(&state),
            Err(Error::IdentifierMismatch { .. })
        ));
    }

    #[test]
    fn test_state_wire_keys() {
        let state = Filter::new("Filter_1").state();
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["filter used"], serde_json::json!(true));
        assert_eq!(value["limit events"], serde_json::json!([false, 10_000]));
        assert!(value["box filters"].as_object().unwrap().is_empty());
        assert!(value.get("remove invalid events").is_some());
    }
}
