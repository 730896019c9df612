//! Identifier allocation for pipeline elements.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};

/// Kind of pipeline element an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// A [`crate::Dataslot`].
    Slot,
    /// A [`crate::Filter`].
    Filter,
    /// A [`crate::Plot`].
    Plot,
    /// A polygon filter.
    Polygon,
}

impl ElementKind {
    /// Prefix of allocated identifiers.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            ElementKind::Slot => "Slot",
            ElementKind::Filter => "Filter",
            ElementKind::Plot => "Plot",
            ElementKind::Polygon => "Polygon",
        }
    }

    /// Name of the pipeline collection holding this kind, used in errors.
    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            ElementKind::Slot => "pipeline slots",
            ElementKind::Filter => "pipeline filters",
            ElementKind::Plot => "pipeline plots",
            ElementKind::Polygon => "pipeline polygon filters",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ElementKind::Slot => "slot",
            ElementKind::Filter => "filter",
            ElementKind::Plot => "plot",
            ElementKind::Polygon => "polygon filter",
        }
    }
}

/// Identifiers in use by one pipeline.
///
/// Identifiers are unique across all element kinds because filters and
/// plots share the columns of the element-activation matrix.
#[derive(Debug, Clone, Default)]
pub struct IdentifierRegistry {
    taken: HashSet<String>,
    counters: HashMap<ElementKind, usize>,
}

impl IdentifierRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates and registers a fresh identifier such as `Filter_3`.
    pub fn allocate(&mut self, kind: ElementKind) -> String {
        let counter = self.counters.entry(kind).or_insert(0);
        loop {
            *counter += 1;
            let identifier = format!("{}_{}", kind.prefix(), counter);
            if self.taken.insert(identifier.clone()) {
                return identifier;
            }
        }
    }

    /// Registers an externally chosen identifier.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateIdentifier`] if the identifier is taken.
    pub fn register(&mut self, kind: ElementKind, identifier: &str) -> Result<()> {
        if identifier.is_empty() {
            return Err(Error::InvalidState(format!(
                "empty {} identifier",
                kind.label()
            )));
        }
        if !self.taken.insert(identifier.to_string()) {
            return Err(Error::DuplicateIdentifier {
                kind: kind.label(),
                identifier: identifier.to_string(),
            });
        }
        Ok(())
    }

    /// Frees an identifier; returns false if it was not registered.
    pub fn release(&mut self, identifier: &str) -> bool {
        self.taken.remove(identifier)
    }

    /// Returns true if the identifier is in use.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.taken.contains(identifier)
    }

    /// Frees every identifier. Counters keep running.
    pub fn clear(&mut self) {
        self.taken.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_skips_taken() {
        let mut registry = IdentifierRegistry::new();
        registry.register(ElementKind::Filter, "Filter_2").unwrap();
        assert_eq!(registry.allocate(ElementKind::Filter), "Filter_1");
        assert_eq!(registry.allocate(ElementKind::Filter), "Filter_3");
        assert_eq!(registry.allocate(ElementKind::Slot), "Slot_1");
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = IdentifierRegistry::new();
        registry.register(ElementKind::Plot, "overview").unwrap();
        let err = registry.register(ElementKind::Filter, "overview").unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentifier { .. }));

        assert!(registry.release("overview"));
        registry.register(ElementKind::Filter, "overview").unwrap();
    }

    #[test]
    fn test_released_identifiers_are_not_reallocated() {
        let mut registry = IdentifierRegistry::new();
        let first = registry.allocate(ElementKind::Slot);
        registry.release(&first);
        assert_ne!(registry.allocate(ElementKind::Slot), first);
    }
}
