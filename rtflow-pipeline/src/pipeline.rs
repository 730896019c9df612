//! The pipeline: slots x (filters + plots).
//!
//! [`Pipeline`] owns the ordered slots, filters, plots and polygon
//! filters, the element-activation matrix and one [`FilterRay`] per
//! slot. It answers the dataset queries of every view of the
//! application and converts its full state to and from
//! [`PipelineState`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use log::{debug, info, warn};
use rtflow_core::{feature_label, DatasetHandle, DatasetSource, PolygonFilter};

use crate::config::PipelineConfig;
use crate::dataslot::Dataslot;
use crate::error::{Error, Result};
use crate::filter::{check_box_filter, Filter};
use crate::plot::Plot;
use crate::polygons::PolygonRegistry;
use crate::ray::FilterRay;
use crate::registry::{ElementKind, IdentifierRegistry};
use crate::state::{FilterExport, PipelineState};

const ELEMENTS: &str = "pipeline filters and plots";

/// Options of [`Pipeline::get_features`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureQuery {
    /// Only report scalar features.
    pub scalar: bool,
    /// Sort by axis label instead of feature name.
    pub label_sort: bool,
    /// Report the union instead of the intersection over slots.
    pub union: bool,
    /// Only consider slots active for this plot.
    pub plot_id: Option<String>,
}

impl FeatureQuery {
    /// Creates a query for the intersection of all features.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the query to scalar features.
    #[must_use]
    pub fn with_scalar(mut self, scalar: bool) -> Self {
        self.scalar = scalar;
        self
    }

    /// Sorts results by axis label.
    #[must_use]
    pub fn with_label_sort(mut self, label_sort: bool) -> Self {
        self.label_sort = label_sort;
        self
    }

    /// Uses the union over slots.
    #[must_use]
    pub fn with_union(mut self, union: bool) -> Self {
        self.union = union;
        self
    }

    /// Restricts the query to the slots of one plot.
    #[must_use]
    pub fn with_plot(mut self, plot_id: &str) -> Self {
        self.plot_id = Some(plot_id.to_string());
        self
    }
}

/// Dataset x filter/plot matrix with cached filter rays.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    source: Box<dyn DatasetSource>,
    registry: IdentifierRegistry,
    slots: Vec<Dataslot>,
    filters: Vec<Filter>,
    plots: Vec<Plot>,
    polygons: PolygonRegistry,
    element_states: BTreeMap<String, BTreeMap<String, bool>>,
    slots_used: Vec<String>,
    filters_used: Vec<String>,
    rays: HashMap<String, FilterRay>,
}

impl Pipeline {
    /// Creates an empty pipeline opening measurements from `source`.
    #[must_use]
    pub fn new(source: impl DatasetSource + 'static) -> Self {
        Self::with_config(source, PipelineConfig::default())
    }

    /// Creates an empty pipeline with a custom configuration.
    #[must_use]
    pub fn with_config(source: impl DatasetSource + 'static, config: PipelineConfig) -> Self {
        Self {
            config,
            source: Box::new(source),
            registry: IdentifierRegistry::new(),
            slots: Vec::new(),
            filters: Vec::new(),
            plots: Vec::new(),
            polygons: PolygonRegistry::new(),
            element_states: BTreeMap::new(),
            slots_used: Vec::new(),
            filters_used: Vec::new(),
            rays: HashMap::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the measurement source.
    #[must_use]
    pub fn source(&self) -> &dyn DatasetSource {
        self.source.as_ref()
    }

    /// Removes every slot, filter, plot and polygon filter.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.filters.clear();
        self.plots.clear();
        self.polygons.clear();
        self.element_states.clear();
        self.slots_used.clear();
        self.filters_used.clear();
        self.rays.clear();
        self.registry.clear();
        info!("pipeline reset");
    }

    /// Slots in pipeline order.
    #[must_use]
    pub fn slots(&self) -> &[Dataslot] {
        &self.slots
    }

    /// Filters in pipeline order.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Plots in pipeline order.
    #[must_use]
    pub fn plots(&self) -> &[Plot] {
        &self.plots
    }

    /// Polygon filters available to the pipeline's filters.
    #[must_use]
    pub fn polygon_filters(&self) -> &PolygonRegistry {
        &self.polygons
    }

    /// Activation matrix: slot identifier -> filter/plot identifier -> active.
    #[must_use]
    pub fn element_states(&self) -> &BTreeMap<String, BTreeMap<String, bool>> {
        &self.element_states
    }

    /// Filter ray of a slot.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown slots.
    pub fn ray(&self, slot_id: &str) -> Result<&FilterRay> {
        self.rays
            .get(slot_id)
            .ok_or_else(|| not_found(ElementKind::Slot, slot_id))
    }

    // --- lookups -------------------------------------------------------

    /// Looks up a slot by identifier.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn slot(&self, identifier: &str) -> Result<&Dataslot> {
        Ok(&self.slots[self.slot_index(identifier)?])
    }

    /// Looks up a slot by identifier for modification.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn slot_mut(&mut self, identifier: &str) -> Result<&mut Dataslot> {
        let index = self.slot_index(identifier)?;
        Ok(&mut self.slots[index])
    }

    /// Returns the position of a slot.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn slot_index(&self, identifier: &str) -> Result<usize> {
        self.slots
            .iter()
            .position(|s| s.identifier() == identifier)
            .ok_or_else(|| not_found(ElementKind::Slot, identifier))
    }

    /// Looks up a filter by identifier.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn filter(&self, identifier: &str) -> Result<&Filter> {
        Ok(&self.filters[self.filter_index(identifier)?])
    }

    /// Looks up a filter by identifier for modification.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn filter_mut(&mut self, identifier: &str) -> Result<&mut Filter> {
        let index = self.filter_index(identifier)?;
        Ok(&mut self.filters[index])
    }

    /// Returns the position of a filter.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn filter_index(&self, identifier: &str) -> Result<usize> {
        self.filters
            .iter()
            .position(|f| f.identifier() == identifier)
            .ok_or_else(|| not_found(ElementKind::Filter, identifier))
    }

    /// Looks up a plot by identifier.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn plot(&self, identifier: &str) -> Result<&Plot> {
        Ok(&self.plots[self.plot_index(identifier)?])
    }

    /// Looks up a plot by identifier for modification.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn plot_mut(&mut self, identifier: &str) -> Result<&mut Plot> {
        let index = self.plot_index(identifier)?;
        Ok(&mut self.plots[index])
    }

    /// Returns the position of a plot.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn plot_index(&self, identifier: &str) -> Result<usize> {
        self.plots
            .iter()
            .position(|p| p.identifier() == identifier)
            .ok_or_else(|| not_found(ElementKind::Plot, identifier))
    }

    /// Looks up a polygon filter for modification.
    ///
    /// Geometry changes are picked up by the filter rays through the
    /// hashes of the filters that reference the polygon.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn polygon_filter_mut(&mut self, identifier: &str) -> Result<&mut PolygonFilter> {
        self.polygons.get_mut(identifier)
    }

    // --- structure -----------------------------------------------------

    /// Adds a slot and returns its identifier.
    ///
    /// The slot's dataset is opened to check that it provides the same
    /// features as the slots already present.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateIdentifier`], [`Error::FeatureMismatch`]
    /// or the error of opening the dataset. The pipeline is unchanged on error.
    pub fn add_slot(&mut self, mut slot: Dataslot) -> Result<String> {
        let identifier = self.claim_identifier(ElementKind::Slot, slot.identifier())?;
        slot.assign_identifier(identifier.clone());
        if let Err(err) = self.check_features(&slot) {
            self.registry.release(&identifier);
            return Err(err);
        }

        let active = self.config.new_elements_active;
        let row = self
            .filters
            .iter()
            .map(Filter::identifier)
            .chain(self.plots.iter().map(Plot::identifier))
            .map(|id| (id.to_string(), active))
            .collect();
        self.element_states.insert(identifier.clone(), row);
        self.slots_used.push(identifier.clone());
        self.rays.insert(identifier.clone(), FilterRay::new());
        self.slots.push(slot);
        info!("added slot '{identifier}'");
        Ok(identifier)
    }

    /// Adds a filter and returns its identifier.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateIdentifier`] if the identifier is taken.
    pub fn add_filter(&mut self, mut filt: Filter) -> Result<String> {
        let identifier = self.claim_identifier(ElementKind::Filter, filt.identifier())?;
        filt.assign_identifier(identifier.clone());
        self.insert_column(&identifier, self.config.new_elements_active);
        self.filters_used.push(identifier.clone());
        self.filters.push(filt);
        info!("added filter '{identifier}'");
        Ok(identifier)
    }

    /// Adds a plot and returns its identifier.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateIdentifier`] if the identifier is taken.
    pub fn add_plot(&mut self, mut plot: Plot) -> Result<String> {
        let identifier = self.claim_identifier(ElementKind::Plot, plot.identifier())?;
        plot.assign_identifier(identifier.clone());
        self.insert_column(&identifier, self.config.new_elements_active);
        self.plots.push(plot);
        info!("added plot '{identifier}'");
        Ok(identifier)
    }

    /// Adds a polygon filter and returns its identifier.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateIdentifier`] if the identifier is taken
    /// and a core error for invalid geometry.
    pub fn add_polygon_filter(&mut self, mut polygon: PolygonFilter) -> Result<String> {
        polygon.validate()?;
        let identifier = self.claim_identifier(ElementKind::Polygon, &polygon.identifier)?;
        if polygon.name.is_empty() {
            polygon.name = identifier.replace('_', " ");
        }
        polygon.identifier.clone_from(&identifier);
        self.polygons.push(polygon);
        info!("added polygon filter '{identifier}'");
        Ok(identifier)
    }

    /// Removes a slot together with its matrix row and filter ray.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn remove_slot(&mut self, identifier: &str) -> Result<Dataslot> {
        let index = self.slot_index(identifier)?;
        let slot = self.slots.remove(index);
        self.element_states.remove(identifier);
        self.slots_used.retain(|id| id != identifier);
        self.rays.remove(identifier);
        self.registry.release(identifier);
        info!("removed slot '{identifier}'");
        Ok(slot)
    }

    /// Removes a filter together with its matrix column.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn remove_filter(&mut self, identifier: &str) -> Result<Filter> {
        let index = self.filter_index(identifier)?;
        let filt = self.filters.remove(index);
        self.remove_column(identifier);
        self.filters_used.retain(|id| id != identifier);
        self.registry.release(identifier);
        info!("removed filter '{identifier}'");
        Ok(filt)
    }

    /// Removes a plot together with its matrix column.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn remove_plot(&mut self, identifier: &str) -> Result<Plot> {
        let index = self.plot_index(identifier)?;
        let plot = self.plots.remove(index);
        self.remove_column(identifier);
        self.registry.release(identifier);
        info!("removed plot '{identifier}'");
        Ok(plot)
    }

    /// Removes a polygon filter and every filter's reference to it.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn remove_polygon_filter(&mut self, identifier: &str) -> Result<PolygonFilter> {
        let polygon = self.polygons.remove(identifier)?;
        for filt in &mut self.filters {
            filt.remove_polygon_filter(identifier);
        }
        self.registry.release(identifier);
        info!("removed polygon filter '{identifier}'");
        Ok(polygon)
    }

    /// Appends a copy of a filter, including its matrix column.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn duplicate_filter(&mut self, identifier: &str) -> Result<String> {
        let mut copy = self.filter(identifier)?.clone();
        let new_id = self.registry.allocate(ElementKind::Filter);
        copy.name = format!("{} (copy)", copy.name);
        copy.assign_identifier(new_id.clone());
        self.copy_column(identifier, &new_id);
        if self.is_filter_used(identifier) {
            self.filters_used.push(new_id.clone());
        }
        self.filters.push(copy);
        info!("duplicated filter '{identifier}' as '{new_id}'");
        Ok(new_id)
    }

    /// Appends a copy of a plot, including its matrix column.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn duplicate_plot(&mut self, identifier: &str) -> Result<String> {
        let mut copy = self.plot(identifier)?.clone();
        let new_id = self.registry.allocate(ElementKind::Plot);
        copy.config_mut().layout.name = format!("{} (copy)", copy.name());
        copy.assign_identifier(new_id.clone());
        self.copy_column(identifier, &new_id);
        self.plots.push(copy);
        info!("duplicated plot '{identifier}' as '{new_id}'");
        Ok(new_id)
    }

    // --- activation ----------------------------------------------------

    /// Returns whether a filter or plot is active for a slot.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn is_element_active(&self, slot_id: &str, element_id: &str) -> Result<bool> {
        self.element_states
            .get(slot_id)
            .ok_or_else(|| not_found(ElementKind::Slot, slot_id))?
            .get(element_id)
            .copied()
            .ok_or_else(|| Error::NotFound {
                collection: ELEMENTS,
                identifier: element_id.to_string(),
            })
    }

    /// Activates or deactivates a filter or plot for a slot.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn set_element_active(
        &mut self,
        slot_id: &str,
        element_id: &str,
        active: bool,
    ) -> Result<()> {
        let entry = self
            .element_states
            .get_mut(slot_id)
            .ok_or_else(|| not_found(ElementKind::Slot, slot_id))?
            .get_mut(element_id)
            .ok_or_else(|| Error::NotFound {
                collection: ELEMENTS,
                identifier: element_id.to_string(),
            })?;
        *entry = active;
        Ok(())
    }

    /// Identifiers of the slots in use.
    #[must_use]
    pub fn slots_used(&self) -> &[String] {
        &self.slots_used
    }

    /// Identifiers of the filters in use.
    #[must_use]
    pub fn filters_used(&self) -> &[String] {
        &self.filters_used
    }

    /// Returns true if the slot is in use.
    #[must_use]
    pub fn is_slot_used(&self, identifier: &str) -> bool {
        self.slots_used.iter().any(|id| id == identifier)
    }

    /// Returns true if the filter is in use.
    #[must_use]
    pub fn is_filter_used(&self, identifier: &str) -> bool {
        self.filters_used.iter().any(|id| id == identifier)
    }

    /// Marks a slot as used or unused.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn set_slot_used(&mut self, identifier: &str, used: bool) -> Result<()> {
        self.slot_index(identifier)?;
        set_listed(&mut self.slots_used, identifier, used);
        Ok(())
    }

    /// Marks a filter as used or unused.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn set_filter_used(&mut self, identifier: &str, used: bool) -> Result<()> {
        self.filter_index(identifier)?;
        set_listed(&mut self.filters_used, identifier, used);
        Ok(())
    }

    // --- queries -------------------------------------------------------

    /// Returns the dataset of a slot after the filters up to `filt_index`.
    ///
    /// `None` returns the slot's unfiltered dataset. A negative index
    /// counts from the end, so `Some(-1)` yields the fully filtered
    /// dataset (the unfiltered root child if there are no filters). Only
    /// filters that are used, enabled and active for the slot apply.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfRange`] for bad indices and propagates
    /// dataset and filter evaluation errors.
    pub fn get_dataset(
        &mut self,
        slot_index: usize,
        filt_index: Option<isize>,
        apply_filter: bool,
    ) -> Result<DatasetHandle> {
        let slot = self.slots.get(slot_index).ok_or_else(|| Error::IndexOutOfRange {
            collection: ElementKind::Slot.collection(),
            index: isize::try_from(slot_index).unwrap_or(isize::MAX),
            len: self.slots.len(),
        })?;
        let Some(filt_index) = filt_index else {
            return slot.get_dataset(self.source.as_ref());
        };
        let count = leading_filter_count(filt_index, self.filters.len())?;

        let row = self.element_states.get(slot.identifier());
        let used = &self.filters_used;
        let filters: Vec<&Filter> = self.filters[..count]
            .iter()
            .filter(|f| used.iter().any(|id| id == f.identifier()))
            .filter(|f| {
                row.and_then(|r| r.get(f.identifier()))
                    .copied()
                    .unwrap_or(false)
            })
            .collect();

        let ray = self.rays.entry(slot.identifier().to_string()).or_default();
        ray.get_final_child(
            slot,
            &filters,
            self.source.as_ref(),
            &self.polygons,
            apply_filter,
        )
    }

    /// Returns the fully filtered datasets of the slots shown by a plot.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown plots and propagates
    /// dataset errors.
    pub fn get_plot_datasets(&mut self, plot_id: &str) -> Result<Vec<(String, DatasetHandle)>> {
        let indices: Vec<usize> = self
            .relevant_slots(Some(plot_id))?
            .iter()
            .map(|slot| self.slot_index(slot.identifier()))
            .collect::<Result<_>>()?;
        indices
            .into_iter()
            .map(|index| {
                let dataset = self.get_dataset(index, Some(-1), true)?;
                Ok((self.slots[index].identifier().to_string(), dataset))
            })
            .collect()
    }

    /// Returns the extrema of a feature over the used slots.
    ///
    /// The unfiltered datasets are scanned, so the range covers every
    /// event of a slot regardless of its active filters. With `plot_id`,
    /// only slots active for that plot are scanned.
    /// Slots lacking the feature are skipped with a warning. The range
    /// is widened by `margin` times its width on both sides. Without any
    /// finite value the result is `(inf, -inf)`.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown plots and propagates
    /// dataset errors.
    pub fn get_min_max(
        &self,
        feature: &str,
        plot_id: Option<&str>,
        margin: f64,
    ) -> Result<(f64, f64)> {
        let mut fmin = f64::INFINITY;
        let mut fmax = f64::NEG_INFINITY;
        for slot in self.relevant_slots(plot_id)? {
            let dataset = slot.get_dataset(self.source.as_ref())?;
            let ds = dataset.borrow();
            match ds.min_max(feature) {
                Ok(Some((lo, hi))) => {
                    fmin = fmin.min(lo);
                    fmax = fmax.max(hi);
                }
                Ok(None) => {}
                Err(rtflow_core::Error::FeatureNotFound { .. }) => {
                    warn!(
                        "feature '{feature}' not available in slot '{}', ignoring it for min/max",
                        slot.identifier()
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        if margin > 0.0 && fmin <= fmax {
            let pad = (fmax - fmin) * margin;
            fmin -= pad;
            fmax += pad;
        }
        Ok((fmin, fmax))
    }

    /// Returns the features shared by (or, for a union, present in any of)
    /// the used slots.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown plots and propagates
    /// dataset errors.
    pub fn get_features(&self, query: &FeatureQuery) -> Result<Vec<String>> {
        let mut combined: Option<BTreeSet<String>> = None;
        for slot in self.relevant_slots(query.plot_id.as_deref())? {
            let dataset = slot.get_dataset(self.source.as_ref())?;
            let names = if query.scalar {
                dataset.borrow().features_scalar()
            } else {
                dataset.borrow().features()
            };
            let names: BTreeSet<String> = names.into_iter().collect();
            combined = Some(match combined {
                None => names,
                Some(acc) if query.union => acc.union(&names).cloned().collect(),
                Some(acc) => acc.intersection(&names).cloned().collect(),
            });
        }
        let mut features: Vec<String> = combined.unwrap_or_default().into_iter().collect();
        if query.label_sort {
            features.sort_by_cached_key(|name| feature_label(name).unwrap_or_else(|| name.clone()));
        }
        Ok(features)
    }

    // --- import/export -------------------------------------------------

    /// Exports filters with the polygon filters they reference.
    ///
    /// `None` exports every filter.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown filter or polygon identifiers.
    pub fn export_filters(&self, identifiers: Option<&[&str]>) -> Result<FilterExport> {
        let filters: Vec<&Filter> = match identifiers {
            None => self.filters.iter().collect(),
            Some(ids) => ids.iter().map(|id| self.filter(id)).collect::<Result<_>>()?,
        };
        let mut polygon_ids: Vec<&str> = Vec::new();
        for pid in filters.iter().flat_map(|f| f.polygon_filters()) {
            if !polygon_ids.contains(&pid.as_str()) {
                polygon_ids.push(pid);
            }
        }
        let polygon_filters = polygon_ids
            .into_iter()
            .map(|id| self.polygons.get(id).cloned())
            .collect::<Result<_>>()?;
        Ok(FilterExport {
            polygon_filters,
            filters: filters.into_iter().map(Filter::state).collect(),
        })
    }

    /// Imports exported filters and polygon filters.
    ///
    /// Identifiers that are already taken are replaced by fresh ones and
    /// polygon references are remapped accordingly. Returns the
    /// identifiers of the imported filters.
    ///
    /// # Errors
    /// Returns [`Error::UnknownFeature`], [`Error::InvalidBoxFilter`] or a
    /// core error for invalid content; nothing is imported in that case.
    pub fn import_filters(&mut self, export: &FilterExport) -> Result<Vec<String>> {
        for polygon in &export.polygon_filters {
            polygon.validate()?;
        }
        for (feature, spec) in export.filters.iter().flat_map(|f| &f.box_filters) {
            check_box_filter(feature, spec)?;
        }

        let mut renamed: HashMap<String, String> = HashMap::new();
        for polygon in &export.polygon_filters {
            let original = polygon.identifier.clone();
            let mut polygon = polygon.clone();
            if self.registry.contains(&original) {
                polygon.identifier.clear();
            }
            let identifier = self.add_polygon_filter(polygon)?;
            if identifier != original {
                renamed.insert(original, identifier);
            }
        }

        let mut imported = Vec::with_capacity(export.filters.len());
        for state in &export.filters {
            let mut state = state.clone();
            if self.registry.contains(&state.identifier) {
                state.identifier.clear();
            }
            for pid in &mut state.polygon_filters {
                if let Some(new_id) = renamed.get(pid) {
                    pid.clone_from(new_id);
                }
            }
            imported.push(self.add_filter(Filter::from_state(&state)?)?);
        }
        Ok(imported)
    }

    // --- state ---------------------------------------------------------

    /// Captures the complete pipeline state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        PipelineState {
            elements: self.element_states.clone(),
            filters: self.filters.iter().map(Filter::state).collect(),
            filters_used: self.filters_used.clone(),
            plots: self.plots.iter().map(Plot::state).collect(),
            slots: self.slots.iter().map(Dataslot::state).collect(),
            slots_used: self.slots_used.clone(),
            polygon_filters: self.polygons.as_slice().to_vec(),
        }
    }

    /// Restores a previously captured state.
    ///
    /// Returns false without touching anything if `state` equals the
    /// current state. Slots, filters and plots whose identifiers survive
    /// are updated in place, so cached datasets and filter rays are kept
    /// where their content did not change.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for inconsistent states and
    /// [`Error::InvalidBoxFilter`] or [`Error::UnknownFeature`] for invalid
    /// box filters, leaving the pipeline unchanged. Errors while rebuilding (e.g. a dataset
    /// that cannot be opened) leave the pipeline empty.
    pub fn set_state(&mut self, state: &PipelineState) -> Result<bool> {
        if *state == self.state() {
            debug!("pipeline state unchanged");
            return Ok(false);
        }
        validate_state(state)?;

        let old_slots: HashMap<String, Dataslot> = self
            .slots
            .drain(..)
            .map(|s| (s.identifier().to_string(), s))
            .collect();
        let old_filters: HashMap<String, Filter> = self
            .filters
            .drain(..)
            .map(|f| (f.identifier().to_string(), f))
            .collect();
        let old_plots: HashMap<String, Plot> = self
            .plots
            .drain(..)
            .map(|p| (p.identifier().to_string(), p))
            .collect();
        let old_rays = std::mem::take(&mut self.rays);
        self.reset();

        match self.restore(state, old_slots, old_filters, old_plots, old_rays) {
            Ok(()) => {
                info!(
                    "restored pipeline with {} slots, {} filters and {} plots",
                    self.slots.len(),
                    self.filters.len(),
                    self.plots.len()
                );
                Ok(true)
            }
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    fn restore(
        &mut self,
        state: &PipelineState,
        mut old_slots: HashMap<String, Dataslot>,
        mut old_filters: HashMap<String, Filter>,
        mut old_plots: HashMap<String, Plot>,
        mut old_rays: HashMap<String, FilterRay>,
    ) -> Result<()> {
        for polygon in &state.polygon_filters {
            self.add_polygon_filter(polygon.clone())?;
        }
        for filter_state in &state.filters {
            let filt = match old_filters.remove(&filter_state.identifier) {
                Some(mut filt) => {
                    filt.set_state(filter_state)?;
                    filt
                }
                None => Filter::from_state(filter_state)?,
            };
            self.add_filter(filt)?;
        }
        for plot_state in &state.plots {
            let plot = match old_plots.remove(&plot_state.identifier) {
                Some(mut plot) => {
                    plot.set_state(plot_state)?;
                    plot
                }
                None => Plot::from_state(plot_state),
            };
            self.add_plot(plot)?;
        }
        for slot_state in &state.slots {
            let slot = match old_slots.remove(&slot_state.identifier) {
                Some(mut slot) => {
                    slot.set_state(slot_state)?;
                    slot
                }
                None => Dataslot::from_state(slot_state),
            };
            let identifier = self.add_slot(slot)?;
            if let Some(ray) = old_rays.remove(&identifier) {
                self.rays.insert(identifier, ray);
            }
        }
        for (slot_id, row) in &state.elements {
            for (element_id, &active) in row {
                self.set_element_active(slot_id, element_id, active)?;
            }
        }
        self.filters_used.clone_from(&state.filters_used);
        self.slots_used.clone_from(&state.slots_used);
        Ok(())
    }

    // --- helpers -------------------------------------------------------

    fn claim_identifier(&mut self, kind: ElementKind, requested: &str) -> Result<String> {
        if requested.is_empty() {
            Ok(self.registry.allocate(kind))
        } else {
            self.registry.register(kind, requested)?;
            Ok(requested.to_string())
        }
    }

    fn check_features(&self, slot: &Dataslot) -> Result<()> {
        let found: BTreeSet<String> = slot
            .get_dataset(self.source.as_ref())?
            .borrow()
            .features()
            .into_iter()
            .collect();
        if !self.config.homogeneous_features {
            return Ok(());
        }
        let Some(first) = self.slots.first() else {
            return Ok(());
        };
        let expected: BTreeSet<String> = first
            .get_dataset(self.source.as_ref())?
            .borrow()
            .features()
            .into_iter()
            .collect();
        if found == expected {
            return Ok(());
        }
        let missing: Vec<&String> = expected.difference(&found).collect();
        let extra: Vec<&String> = found.difference(&expected).collect();
        Err(Error::FeatureMismatch {
            slot: slot.identifier().to_string(),
            details: format!("missing {missing:?}, unexpected {extra:?}"),
        })
    }

    fn insert_column(&mut self, identifier: &str, active: bool) {
        for row in self.element_states.values_mut() {
            row.insert(identifier.to_string(), active);
        }
    }

    fn copy_column(&mut self, from: &str, to: &str) {
        let default = self.config.new_elements_active;
        for row in self.element_states.values_mut() {
            let active = row.get(from).copied().unwrap_or(default);
            row.insert(to.to_string(), active);
        }
    }

    fn remove_column(&mut self, identifier: &str) {
        for row in self.element_states.values_mut() {
            row.remove(identifier);
        }
    }

    fn relevant_slots(&self, plot_id: Option<&str>) -> Result<Vec<&Dataslot>> {
        if let Some(plot_id) = plot_id {
            self.plot_index(plot_id)?;
        }
        let shown = |slot: &Dataslot| match plot_id {
            Some(plot_id) => self
                .is_element_active(slot.identifier(), plot_id)
                .unwrap_or(false),
            None => true,
        };
        Ok(self
            .slots
            .iter()
            .filter(|slot| self.is_slot_used(slot.identifier()) && shown(slot))
            .collect())
    }
}

/// Number of leading filters selected by a (possibly negative) filter index.
fn leading_filter_count(filt_index: isize, len: usize) -> Result<usize> {
    let signed_len = isize::try_from(len).unwrap_or(isize::MAX);
    let count = if filt_index < 0 {
        signed_len + filt_index + 1
    } else if filt_index < signed_len {
        filt_index + 1
    } else {
        -1
    };
    usize::try_from(count).map_err(|_| Error::IndexOutOfRange {
        collection: ElementKind::Filter.collection(),
        index: filt_index,
        len,
    })
}

fn set_listed(list: &mut Vec<String>, identifier: &str, listed: bool) {
    let present = list.iter().any(|id| id == identifier);
    if listed && !present {
        list.push(identifier.to_string());
    } else if !listed {
        list.retain(|id| id != identifier);
    }
}

fn not_found(kind: ElementKind, identifier: &str) -> Error {
    Error::NotFound {
        collection: kind.collection(),
        identifier: identifier.to_string(),
    }
}

/// Checks the internal consistency of a state before it is applied.
fn validate_state(state: &PipelineState) -> Result<()> {
    let mut seen = HashSet::new();
    let slot_ids: HashSet<&str> = state.slots.iter().map(|s| s.identifier.as_str()).collect();
    let filter_ids: HashSet<&str> = state.filters.iter().map(|f| f.identifier.as_str()).collect();
    let plot_ids: HashSet<&str> = state.plots.iter().map(|p| p.identifier.as_str()).collect();

    let all_ids = state
        .slots
        .iter()
        .map(|s| s.identifier.as_str())
        .chain(state.filters.iter().map(|f| f.identifier.as_str()))
        .chain(state.plots.iter().map(|p| p.identifier.as_str()))
        .chain(state.polygon_filters.iter().map(|p| p.identifier.as_str()));
    let total =
        state.slots.len() + state.filters.len() + state.plots.len() + state.polygon_filters.len();
    for identifier in all_ids {
        if identifier.is_empty() {
            return Err(Error::InvalidState("empty identifier".to_string()));
        }
        seen.insert(identifier);
    }
    if seen.len() != total {
        return Err(Error::InvalidState("identifiers are not unique".to_string()));
    }

    for (slot_id, row) in &state.elements {
        if !slot_ids.contains(slot_id.as_str()) {
            return Err(Error::InvalidState(format!(
                "activation matrix refers to unknown slot '{slot_id}'"
            )));
        }
        if let Some(element_id) = row
            .keys()
            .find(|id| !filter_ids.contains(id.as_str()) && !plot_ids.contains(id.as_str()))
        {
            return Err(Error::InvalidState(format!(
                "activation matrix refers to unknown element '{element_id}'"
            )));
        }
    }
    if let Some(id) = state.slots_used.iter().find(|id| !slot_ids.contains(id.as_str())) {
        return Err(Error::InvalidState(format!("unknown used slot '{id}'")));
    }
    if let Some(id) = state
        .filters_used
        .iter()
        .find(|id| !filter_ids.contains(id.as_str()))
    {
        return Err(Error::InvalidState(format!("unknown used filter '{id}'")));
    }
    for (feature, spec) in state.filters.iter().flat_map(|f| &f.box_filters) {
        check_box_filter(feature, spec)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_filter_count() {
        assert_eq!(leading_filter_count(0, 3).unwrap(), 1);
        assert_eq!(leading_filter_count(2, 3).unwrap(), 3);
        assert_eq!(leading_filter_count(-1, 3).unwrap(), 3);
        assert_eq!(leading_filter_count(-3, 3).unwrap(), 1);
        assert_eq!(leading_filter_count(-1, 0).unwrap(), 0);
        assert!(leading_filter_count(3, 3).is_err());
        assert!(leading_filter_count(-5, 3).is_err());
    }

    #[test]
    fn test_set_listed_keeps_order() {
        let mut list = vec!["a".to_string(), "b".to_string()];
        set_listed(&mut list, "a", true);
        set_listed(&mut list, "c", true);
        set_listed(&mut list, "b", false);
        assert_eq!(list, vec!["a", "c"]);
    }

    #[test]
    fn test_validate_state_rejects_dangling_references() {
        let mut state = PipelineState::default();
        state.slots_used.push("Slot_1".to_string());
        assert!(matches!(
            validate_state(&state),
            Err(Error::InvalidState(_))
        ));

        let mut state = PipelineState::default();
        state
            .elements
            .insert("Slot_1".to_string(), BTreeMap::new());
        assert!(validate_state(&state).is_err());
    }
}
