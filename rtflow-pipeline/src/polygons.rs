//! Polygon filters referenced by pipeline filters.

use rtflow_core::PolygonFilter;

use crate::digest::ContentHasher;
use crate::error::{Error, Result};
use crate::registry::ElementKind;

/// Ordered collection of polygon filters owned by a pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolygonRegistry {
    polygons: Vec<PolygonFilter>,
}

impl PolygonRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a polygon filter.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn get(&self, identifier: &str) -> Result<&PolygonFilter> {
        self.polygons
            .iter()
            .find(|p| p.identifier == identifier)
            .ok_or_else(|| not_found(identifier))
    }

    /// Looks up a polygon filter for modification.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown identifiers.
    pub fn get_mut(&mut self, identifier: &str) -> Result<&mut PolygonFilter> {
        self.polygons
            .iter_mut()
            .find(|p| p.identifier == identifier)
            .ok_or_else(|| not_found(identifier))
    }

    /// Returns true if a polygon filter with this identifier exists.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.polygons.iter().any(|p| p.identifier == identifier)
    }

    /// Returns all polygon filters in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[PolygonFilter] {
        &self.polygons
    }

    pub(crate) fn push(&mut self, polygon: PolygonFilter) {
        self.polygons.push(polygon);
    }

    pub(crate) fn remove(&mut self, identifier: &str) -> Result<PolygonFilter> {
        let index = self
            .polygons
            .iter()
            .position(|p| p.identifier == identifier)
            .ok_or_else(|| not_found(identifier))?;
        Ok(self.polygons.remove(index))
    }

    pub(crate) fn clear(&mut self) {
        self.polygons.clear();
    }

    /// Feeds the geometry of a polygon filter into a digest.
    ///
    /// Unknown identifiers only contribute their name.
    pub(crate) fn hash_into(&self, identifier: &str, hasher: &mut ContentHasher) {
        hasher.str(identifier);
        if let Ok(polygon) = self.get(identifier) {
            hasher
                .str(&polygon.axis_x)
                .str(&polygon.axis_y)
                .bool(polygon.inverted)
                .usize(polygon.points.len());
            for &[x, y] in &polygon.points {
                hasher.f64(x).f64(y);
            }
        }
    }
}

fn not_found(identifier: &str) -> Error {
    Error::NotFound {
        collection: ElementKind::Polygon.collection(),
        identifier: identifier.to_string(),
    }
}
