//! Cached filter chains per slot.
//!
//! A [`FilterRay`] keeps the hierarchy children produced by applying an
//! ordered list of filters to one slot. Step `i` holds the events passing
//! the first `i + 1` filters. A new request reuses the longest cached
//! prefix whose filter hashes match and rebuilds only the remainder.

use log::debug;
use rtflow_core::{DatasetHandle, DatasetSource};

use crate::dataslot::Dataslot;
use crate::error::Result;
use crate::filter::Filter;
use crate::polygons::PolygonRegistry;

/// Chain of filtered dataset views for one slot.
#[derive(Debug, Default)]
pub struct FilterRay {
    slot_hash: Option<String>,
    root: Option<DatasetHandle>,
    steps: Vec<DatasetHandle>,
    step_hashes: Vec<String>,
    generation: usize,
}

impl FilterRay {
    /// Creates an empty ray.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times materialized steps were discarded.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Cached steps; step `i` holds the events passing the first `i + 1` filters.
    #[must_use]
    pub fn steps(&self) -> &[DatasetHandle] {
        &self.steps
    }

    /// Hashes of the filters that produced [`FilterRay::steps`].
    #[must_use]
    pub fn step_hashes(&self) -> &[String] {
        &self.step_hashes
    }

    /// Drops every cached view.
    pub fn reset(&mut self) {
        if !self.steps.is_empty() {
            self.generation += 1;
        }
        self.root = None;
        self.steps.clear();
        self.step_hashes.clear();
    }

    /// Returns the view of `slot` after applying `filters` in order.
    ///
    /// Filters whose `filter_used` flag is false are skipped. Without any
    /// remaining filter the unfiltered root child is returned. The final
    /// view is only re-evaluated when `apply_filter` is set.
    ///
    /// # Errors
    /// Propagates dataset opening and filter evaluation errors.
    pub fn get_final_child(
        &mut self,
        slot: &Dataslot,
        filters: &[&Filter],
        source: &dyn DatasetSource,
        polygons: &PolygonRegistry,
        apply_filter: bool,
    ) -> Result<DatasetHandle> {
        let slot_hash = slot.hash();
        if self.slot_hash.as_deref() != Some(slot_hash.as_str()) {
            if self.slot_hash.is_some() {
                debug!("slot '{}' changed, resetting filter ray", slot.identifier());
            }
            self.reset();
            self.slot_hash = Some(slot_hash);
        }

        let mut current = match &self.root {
            Some(root) => root.clone(),
            None => {
                let root = slot.get_dataset(source)?.new_child();
                self.root = Some(root.clone());
                root
            }
        };

        for (index, filt) in filters.iter().filter(|f| f.filter_used).enumerate() {
            let hash = filt.hash(polygons);
            if index < self.steps.len() {
                if self.step_hashes[index] == hash {
                    current = self.steps[index].clone();
                    continue;
                }
                debug!(
                    "slot '{}': filter ray diverges at step {index} ({})",
                    slot.identifier(),
                    filt.identifier()
                );
                self.steps.truncate(index);
                self.step_hashes.truncate(index);
                self.generation += 1;
            }
            current = self.add_step(&current, filt, polygons, hash)?;
        }

        if apply_filter {
            current.apply_filter()?;
        }
        Ok(current)
    }

    fn add_step(
        &mut self,
        parent: &DatasetHandle,
        filt: &Filter,
        polygons: &PolygonRegistry,
        hash: String,
    ) -> Result<DatasetHandle> {
        // The filter is configured on an intermediate child so that the
        // step itself keeps an empty filtering configuration.
        let stage = parent.new_child();
        filt.update_dataset(&mut stage.borrow_mut(), polygons)?;
        stage.apply_filter()?;
        let step = stage.new_child();
        self.steps.push(step.clone());
        self.step_hashes.push(hash);
        Ok(step)
    }
}
