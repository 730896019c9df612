//! Input measurements of a pipeline.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use rtflow_core::{DatasetHandle, DatasetSource};
use serde::{Deserialize, Serialize};

use crate::digest::ContentHasher;
use crate::error::{Error, Result};

/// Default display color of new slots.
pub const DEFAULT_SLOT_COLOR: &str = "#0000FF";

/// Where the temperature for the Young's modulus computation comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureSource {
    /// Per-event `temp` feature.
    #[default]
    Feature,
    /// Fixed value from [`EmodulusConfig::temperature`].
    Manual,
}

/// Parameters for the Young's modulus computation of a slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmodulusConfig {
    pub enabled: bool,
    pub medium: Option<String>,
    #[serde(rename = "temperature source")]
    pub temperature_source: TemperatureSource,
    /// Temperature [°C], used with [`TemperatureSource::Manual`].
    pub temperature: Option<f64>,
    #[serde(rename = "viscosity model")]
    pub viscosity_model: Option<String>,
    /// Look-up table identifier.
    pub lut: Option<String>,
}

/// Serialized form of a [`Dataslot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotState {
    pub identifier: String,
    pub name: String,
    pub path: PathBuf,
    pub color: String,
    /// Fluorescence channel labels, e.g. `"FL-1" -> "GFP"`.
    #[serde(rename = "fl names")]
    pub fl_names: BTreeMap<String, String>,
    pub emodulus: EmodulusConfig,
}

/// One input measurement plus its per-measurement overrides.
///
/// The dataset is opened on first use and cached until the path or an
/// override changes.
#[derive(Debug)]
pub struct Dataslot {
    identifier: String,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
    path: PathBuf,
    fl_names: BTreeMap<String, String>,
    emodulus: EmodulusConfig,
    dataset: RefCell<Option<DatasetHandle>>,
}

impl Dataslot {
    /// Creates a slot for the measurement at `path`.
    ///
    /// The identifier is assigned when the slot is added to a pipeline.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            identifier: String::new(),
            name,
            color: DEFAULT_SLOT_COLOR.to_string(),
            path,
            fl_names: BTreeMap::new(),
            emodulus: EmodulusConfig::default(),
            dataset: RefCell::new(None),
        }
    }

    /// Sets the identifier, builder style.
    #[must_use]
    pub fn with_identifier(mut self, identifier: &str) -> Self {
        self.identifier = identifier.to_string();
        self
    }

    /// Restores a slot from its state.
    #[must_use]
    pub fn from_state(state: &SlotState) -> Self {
        let mut slot = Self::new(&state.path).with_identifier(&state.identifier);
        slot.apply_state(state);
        slot
    }

    /// Returns the identifier; empty until added to a pipeline.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn assign_identifier(&mut self, identifier: String) {
        self.identifier = identifier;
    }

    /// Returns the measurement path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Points the slot at another measurement.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
        self.invalidate();
    }

    /// Returns the fluorescence channel labels.
    #[must_use]
    pub fn fl_names(&self) -> &BTreeMap<String, String> {
        &self.fl_names
    }

    /// Sets the label of a fluorescence channel such as `"FL-1"`.
    pub fn set_fl_name(&mut self, channel: &str, label: &str) {
        self.fl_names.insert(channel.to_string(), label.to_string());
        self.invalidate();
    }

    /// Returns the Young's modulus parameters.
    #[must_use]
    pub fn emodulus(&self) -> &EmodulusConfig {
        &self.emodulus
    }

    /// Replaces the Young's modulus parameters.
    pub fn set_emodulus(&mut self, emodulus: EmodulusConfig) {
        self.emodulus = emodulus;
        self.invalidate();
    }

    /// Returns a digest of everything that determines the slot's dataset.
    #[must_use]
    pub fn hash(&self) -> String {
        let mut hasher = ContentHasher::new("slot");
        hasher
            .str(&self.path.to_string_lossy())
            .usize(self.fl_names.len());
        for (channel, label) in &self.fl_names {
            hasher.str(channel).str(label);
        }
        let emod = &self.emodulus;
        hasher
            .bool(emod.enabled)
            .opt_str(emod.medium.as_deref())
            .bool(emod.temperature_source == TemperatureSource::Manual)
            .opt_f64(emod.temperature)
            .opt_str(emod.viscosity_model.as_deref())
            .opt_str(emod.lut.as_deref());
        hasher.finish()
    }

    /// Returns the slot's root dataset, opening it on first use.
    ///
    /// # Errors
    /// Propagates errors from [`DatasetSource::open`].
    pub fn get_dataset(&self, source: &dyn DatasetSource) -> Result<DatasetHandle> {
        if let Some(dataset) = self.dataset.borrow().as_ref() {
            return Ok(dataset.clone());
        }
        debug!("slot '{}': opening {}", self.identifier, self.path.display());
        let mut dataset = source.open(&self.path)?;
        let calculation = &mut dataset.config.calculation;
        if self.emodulus.enabled {
            calculation.emodulus_medium.clone_from(&self.emodulus.medium);
            calculation
                .emodulus_viscosity_model
                .clone_from(&self.emodulus.viscosity_model);
            calculation.emodulus_lut.clone_from(&self.emodulus.lut);
            calculation.emodulus_temperature = match self.emodulus.temperature_source {
                TemperatureSource::Manual => self.emodulus.temperature,
                TemperatureSource::Feature => None,
            };
        }
        for (channel, label) in &self.fl_names {
            dataset
                .config
                .fluorescence
                .insert(channel.clone(), label.clone());
        }
        let handle = DatasetHandle::new(dataset);
        *self.dataset.borrow_mut() = Some(handle.clone());
        Ok(handle)
    }

    /// Drops the cached dataset.
    pub fn invalidate(&self) {
        self.dataset.borrow_mut().take();
    }

    /// Captures the current settings.
    #[must_use]
    pub fn state(&self) -> SlotState {
        SlotState {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            path: self.path.clone(),
            color: self.color.clone(),
            fl_names: self.fl_names.clone(),
            emodulus: self.emodulus.clone(),
        }
    }

    /// Applies a previously captured state.
    ///
    /// The cached dataset survives if the dataset-relevant settings are
    /// unchanged.
    ///
    /// # Errors
    /// Returns [`Error::IdentifierMismatch`] if the state belongs to another slot.
    pub fn set_state(&mut self, state: &SlotState) -> Result<()> {
        if state.identifier != self.identifier {
            return Err(Error::IdentifierMismatch {
                expected: self.identifier.clone(),
                found: state.identifier.clone(),
            });
        }
        self.apply_state(state);
        Ok(())
    }

    fn apply_state(&mut self, state: &SlotState) {
        let before = self.hash();
        self.name.clone_from(&state.name);
        self.color.clone_from(&state.color);
        self.path.clone_from(&state.path);
        self.fl_names.clone_from(&state.fl_names);
        self.emodulus = state.emodulus.clone();
        if self.hash() != before {
            self.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtflow_core::{FeatureTable, MemorySource};

    fn source() -> MemorySource {
        let table = FeatureTable::new()
            .with_column("deform", vec![0.1, 0.2, 0.3])
            .unwrap();
        MemorySource::new()
            .with_table("/data/a.rtdc", table.clone())
            .with_table("/data/b.rtdc", table)
    }

    #[test]
    fn test_new_slot() {
        let slot = Dataslot::new("/data/a.rtdc");
        assert_eq!(slot.name, "a");
        assert!(slot.identifier().is_empty());
        assert_eq!(slot.color, DEFAULT_SLOT_COLOR);
    }

    #[test]
    fn test_dataset_is_cached() {
        let source = source();
        let slot = Dataslot::new("/data/a.rtdc");
        let first = slot.get_dataset(&source).unwrap();
        let second = slot.get_dataset(&source).unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_path_change_reopens() {
        let source = source();
        let mut slot = Dataslot::new("/data/a.rtdc");
        let first = slot.get_dataset(&source).unwrap();
        let hash = slot.hash();

        slot.set_path("/data/b.rtdc");
        assert_ne!(slot.hash(), hash);
        let second = slot.get_dataset(&source).unwrap();
        assert!(!first.ptr_eq(&second));
    }

    #[test]
    fn test_overrides_reach_dataset() {
        let source = source();
        let mut slot = Dataslot::new("/data/a.rtdc");
        slot.set_fl_name("FL-1", "GFP");
        slot.set_emodulus(EmodulusConfig {
            enabled: true,
            medium: Some("CellCarrier".to_string()),
            temperature_source: TemperatureSource::Manual,
            temperature: Some(23.5),
            viscosity_model: Some("buyukurganci-2022".to_string()),
            lut: Some("LE-2D-FEM-19".to_string()),
        });
        let ds = slot.get_dataset(&source).unwrap();
        let ds = ds.borrow();
        assert_eq!(ds.config.fluorescence["FL-1"], "GFP");
        assert_eq!(ds.config.calculation.emodulus_temperature, Some(23.5));
        assert_eq!(
            ds.config.calculation.emodulus_medium.as_deref(),
            Some("CellCarrier")
        );
    }

    #[test]
    fn test_state_round_trip_keeps_cache() {
        let source = source();
        let mut slot = Dataslot::new("/data/a.rtdc").with_identifier("Slot_1");
        slot.set_fl_name("FL-2", "PE");
        let ds = slot.get_dataset(&source).unwrap();

        let mut state = slot.state();
        slot.set_state(&state).unwrap();
        assert_eq!(slot.state(), state);
        assert!(slot.get_dataset(&source).unwrap().ptr_eq(&ds));

        // display-only changes keep the cache
        state.name = "renamed".to_string();
        state.color = "#FF0000".to_string();
        slot.set_state(&state).unwrap();
        assert!(slot.get_dataset(&source).unwrap().ptr_eq(&ds));

        state.path = PathBuf::from("/data/b.rtdc");
        slot.set_state(&state).unwrap();
        assert!(!slot.get_dataset(&source).unwrap().ptr_eq(&ds));
    }

    #[test]
    fn test_state_identifier_mismatch() {
        let slot = Dataslot::new("/data/a.rtdc").with_identifier("Slot_1");
        let mut other = Dataslot::new("/data/a.rtdc").with_identifier("Slot_2");
        assert!(matches!(
            other.set_state(&slot.state()),
            Err(Error::IdentifierMismatch { .. })
        ));
    }

    #[test]
    fn test_from_state() {
        let mut slot = Dataslot::new("/data/a.rtdc").with_identifier("Slot_4");
        slot.name = "Control".to_string();
        let restored = Dataslot::from_state(&slot.state());
        assert_eq!(restored.state(), slot.state());
    }
}
