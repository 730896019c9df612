//! Opening measurements by path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::table::FeatureTable;

/// Opens root datasets for measurement paths.
///
/// File formats are handled by implementors; the pipeline only relies on
/// getting a fresh root [`Dataset`] for every call.
pub trait DatasetSource: std::fmt::Debug {
    /// Opens the measurement at `path`.
    ///
    /// # Errors
    /// Returns an error if the measurement cannot be opened.
    fn open(&self, path: &Path) -> Result<Dataset>;
}

/// Source serving measurements that are already held in memory.
///
/// Every [`DatasetSource::open`] returns a new root dataset sharing the
/// registered table.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<PathBuf, Rc<FeatureTable>>,
}

impl MemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table under `path`, builder style.
    #[must_use]
    pub fn with_table(mut self, path: impl Into<PathBuf>, table: FeatureTable) -> Self {
        self.insert(path, table);
        self
    }

    /// Registers or replaces a table under `path`.
    pub fn insert(&mut self, path: impl Into<PathBuf>, table: FeatureTable) {
        self.tables.insert(path.into(), Rc::new(table));
    }

    /// Removes the table registered under `path`.
    pub fn remove(&mut self, path: &Path) -> Option<Rc<FeatureTable>> {
        self.tables.remove(path)
    }

    /// Returns true if a table is registered under `path`.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.tables.contains_key(path)
    }
}

impl DatasetSource for MemorySource {
    fn open(&self, path: &Path) -> Result<Dataset> {
        self.tables
            .get(path)
            .map(|table| Dataset::from_shared(&path.display().to_string(), Rc::clone(table)))
            .ok_or_else(|| Error::DatasetNotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source() {
        let table = FeatureTable::new()
            .with_column("deform", vec![0.1, 0.2])
            .unwrap();
        let source = MemorySource::new().with_table("/data/m001.rtdc", table);

        let ds = source.open(Path::new("/data/m001.rtdc")).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.identifier(), "/data/m001.rtdc");

        let err = source.open(Path::new("/data/m002.rtdc")).unwrap_err();
        assert!(matches!(err, Error::DatasetNotFound(_)));
    }
}
