//! Dataset views, filter evaluation and hierarchy children.
//!
//! A [`Dataset`] is either a root view over a [`FeatureTable`] or a
//! hierarchy child of another dataset. Children never copy column data;
//! they store the root indices of the events that passed their parent's
//! filter and re-read them on every [`Dataset::apply_filter`].
#![allow(clippy::must_use_candidate)]

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use log::warn;
use rayon::prelude::*;

use crate::config::DatasetConfig;
use crate::error::{Error, Result};
use crate::polygon::PolygonFilter;
use crate::table::FeatureTable;

#[derive(Debug, Clone, PartialEq)]
enum Events {
    /// Every event of the root table.
    All(usize),
    /// Root indices of a subset of events.
    Indexed(Vec<usize>),
}

impl Events {
    fn len(&self) -> usize {
        match self {
            Events::All(len) => *len,
            Events::Indexed(indices) => indices.len(),
        }
    }

    #[inline]
    fn root_index(&self, index: usize) -> usize {
        match self {
            Events::All(_) => index,
            Events::Indexed(indices) => indices[index],
        }
    }
}

/// Borrowed view of one scalar feature over the events of a dataset.
#[derive(Debug, Clone, Copy)]
pub struct FeatureColumn<'a> {
    data: &'a [f64],
    events: &'a Events,
}

impl FeatureColumn<'_> {
    /// Returns the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the view holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value of the event at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        self.data[self.events.root_index(index)]
    }

    /// Returns an iterator over the values.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Collects the values into a vector.
    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }

    /// Returns the extrema of all finite values.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Boolean mask of events passing the current filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterMask {
    all: Vec<bool>,
}

impl FilterMask {
    fn all_pass(len: usize) -> Self {
        Self {
            all: vec![true; len],
        }
    }

    /// Returns the mask, one entry per event.
    pub fn all(&self) -> &[bool] {
        &self.all
    }

    /// Returns the number of passing events.
    pub fn count(&self) -> usize {
        self.all.iter().filter(|&&keep| keep).count()
    }

    /// Returns the number of events covered by the mask.
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Returns true if the mask covers no events.
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Returns the indices of passing events.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.all
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
    }
}

/// A view of a measurement with its own configuration and filter.
#[derive(Debug)]
pub struct Dataset {
    identifier: String,
    table: Rc<FeatureTable>,
    parent: Option<DatasetHandle>,
    events: Events,
    /// Configuration; filtering changes take effect on [`Dataset::apply_filter`].
    pub config: DatasetConfig,
    filter: FilterMask,
}

impl Dataset {
    /// Creates a root dataset owning `table`.
    pub fn new(identifier: &str, table: FeatureTable) -> Self {
        Self::from_shared(identifier, Rc::new(table))
    }

    /// Creates a root dataset over a shared table.
    pub fn from_shared(identifier: &str, table: Rc<FeatureTable>) -> Self {
        let len = table.len();
        Self {
            identifier: identifier.to_string(),
            table,
            parent: None,
            events: Events::All(len),
            config: DatasetConfig::default(),
            filter: FilterMask::all_pass(len),
        }
    }

    /// Returns the dataset identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the number of events in this view.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the view holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the hierarchy parent, if any.
    pub fn parent(&self) -> Option<&DatasetHandle> {
        self.parent.as_ref()
    }

    /// Returns true if this dataset is a hierarchy child.
    pub fn is_hierarchy_child(&self) -> bool {
        self.parent.is_some()
    }

    /// Returns all available feature names, sorted.
    pub fn features(&self) -> Vec<String> {
        self.table.features()
    }

    /// Returns the available scalar feature names, sorted.
    pub fn features_scalar(&self) -> Vec<String> {
        self.table.scalar_features().map(str::to_string).collect()
    }

    /// Returns true if the feature is available.
    pub fn contains_feature(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    /// Returns a view of a scalar feature.
    ///
    /// # Errors
    /// Returns [`Error::FeatureNotFound`] if the dataset has no such scalar feature.
    pub fn feature(&self, name: &str) -> Result<FeatureColumn<'_>> {
        self.table
            .column(name)
            .map(|data| FeatureColumn {
                data,
                events: &self.events,
            })
            .ok_or_else(|| Error::FeatureNotFound {
                feature: name.to_string(),
                dataset: self.identifier.clone(),
            })
    }

    /// Returns the extrema of the finite values of a feature.
    ///
    /// # Errors
    /// Returns [`Error::FeatureNotFound`] if the dataset has no such scalar feature.
    pub fn min_max(&self, name: &str) -> Result<Option<(f64, f64)>> {
        Ok(self.feature(name)?.min_max())
    }

    /// Returns the filter mask computed by the last [`Dataset::apply_filter`].
    pub fn filter(&self) -> &FilterMask {
        &self.filter
    }

    /// Restores the default filtering configuration and clears the mask.
    pub fn reset_filter(&mut self) {
        self.config.filtering = crate::config::FilteringConfig::default();
        self.filter = FilterMask::all_pass(self.len());
    }

    /// Attaches a polygon filter to the filtering configuration.
    pub fn polygon_filter_add(&mut self, polygon: PolygonFilter) {
        self.config.filtering.polygon_filter_add(polygon);
    }

    /// Evaluates the filtering configuration.
    ///
    /// Hierarchy children first apply their parent and take over its
    /// passing events.
    ///
    /// # Errors
    /// Returns [`Error::FeatureNotFound`] if a range or polygon filter
    /// refers to a feature this dataset does not provide and
    /// [`Error::InvalidPolygon`] for degenerate polygon filters.
    pub fn apply_filter(&mut self) -> Result<()> {
        if let Some(parent) = &self.parent {
            let mut parent = parent.borrow_mut();
            parent.apply_filter()?;
            self.events = Events::Indexed(parent.filtered_root_indices());
            self.config.calculation = parent.config.calculation.clone();
            self.config.fluorescence = parent.config.fluorescence.clone();
        }
        self.evaluate_filter()
    }

    fn filtered_root_indices(&self) -> Vec<usize> {
        self.filter
            .indices()
            .map(|i| self.events.root_index(i))
            .collect()
    }

    fn evaluate_filter(&mut self) -> Result<()> {
        let filtering = &self.config.filtering;
        let mut mask = vec![true; self.len()];

        if filtering.enable_filters {
            if filtering.remove_invalid_events {
                for name in self.table.scalar_features() {
                    let column = self.feature(name)?;
                    mask.par_iter_mut().enumerate().for_each(|(i, keep)| {
                        *keep = *keep && column.get(i).is_finite();
                    });
                }
            }

            for (name, range) in filtering.ranges() {
                let column = self.feature(name)?;
                mask.par_iter_mut().enumerate().for_each(|(i, keep)| {
                    *keep = *keep && range.contains(column.get(i));
                });
            }

            for polygon in filtering.polygon_filters() {
                polygon.validate()?;
                let xs = self.feature(&polygon.axis_x)?;
                let ys = self.feature(&polygon.axis_y)?;
                mask.par_iter_mut().enumerate().for_each(|(i, keep)| {
                    *keep = *keep && polygon.contains(xs.get(i), ys.get(i));
                });
            }

            if filtering.limit_events > 0 {
                limit_events(&mut mask, filtering.limit_events, &self.identifier);
            }
        }

        self.filter = FilterMask { all: mask };
        Ok(())
    }
}

/// Reduces the passing events to `limit`, evenly spaced.
fn limit_events(mask: &mut [bool], limit: usize, dataset: &str) {
    let passing: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect();
    let count = passing.len();
    if count < limit {
        warn!("dataset '{dataset}': only {count} events pass, fewer than the limit of {limit}");
        return;
    }
    if count == limit {
        return;
    }
    mask.fill(false);
    for k in 0..limit {
        mask[passing[k * count / limit]] = true;
    }
}

/// Shared single-threaded handle to a [`Dataset`].
///
/// Clones refer to the same dataset; use [`DatasetHandle::ptr_eq`] to
/// compare identity.
#[derive(Debug, Clone)]
pub struct DatasetHandle(Rc<RefCell<Dataset>>);

impl DatasetHandle {
    /// Wraps a dataset in a new handle.
    pub fn new(dataset: Dataset) -> Self {
        Self(Rc::new(RefCell::new(dataset)))
    }

    /// Immutably borrows the dataset.
    ///
    /// # Panics
    /// Panics if the dataset is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, Dataset> {
        self.0.borrow()
    }

    /// Mutably borrows the dataset.
    ///
    /// # Panics
    /// Panics if the dataset is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, Dataset> {
        self.0.borrow_mut()
    }

    /// Returns true if both handles refer to the same dataset.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns the number of events in the view.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Returns true if the view holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// See [`Dataset::apply_filter`].
    ///
    /// # Errors
    /// Propagates errors from [`Dataset::apply_filter`].
    pub fn apply_filter(&self) -> Result<()> {
        self.0.borrow_mut().apply_filter()
    }

    /// See [`Dataset::reset_filter`].
    pub fn reset_filter(&self) {
        self.0.borrow_mut().reset_filter();
    }

    /// Derives a hierarchy child holding the events that currently pass
    /// this dataset's filter.
    pub fn new_child(&self) -> Self {
        let parent = self.0.borrow();
        let events = parent.filtered_root_indices();
        let len = events.len();
        let config = DatasetConfig {
            calculation: parent.config.calculation.clone(),
            fluorescence: parent.config.fluorescence.clone(),
            ..DatasetConfig::default()
        };
        Self::new(Dataset {
            identifier: format!("{}_child", parent.identifier),
            table: Rc::clone(&parent.table),
            parent: Some(self.clone()),
            events: Events::Indexed(events),
            config,
            filter: FilterMask::all_pass(len),
        })
    }
}

impl From<Dataset> for DatasetHandle {
    fn from(dataset: Dataset) -> Self {
        Self::new(dataset)
    }
}
