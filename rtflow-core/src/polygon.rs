//! Polygon filters over a pair of scalar features.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A closed polygon in the plane spanned by two scalar features.
///
/// Events whose `(axis_x, axis_y)` values fall inside the polygon pass
/// the filter; with `inverted` set, events outside pass instead.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PolygonFilter {
    /// Unique identifier within a pipeline.
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Feature on the x axis.
    #[cfg_attr(feature = "serde", serde(rename = "axis x"))]
    pub axis_x: String,
    /// Feature on the y axis.
    #[cfg_attr(feature = "serde", serde(rename = "axis y"))]
    pub axis_y: String,
    /// Polygon vertices; the polygon is implicitly closed.
    pub points: Vec<[f64; 2]>,
    /// Pass events outside the polygon instead of inside.
    pub inverted: bool,
}

impl PolygonFilter {
    /// Creates a polygon filter.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPolygon`] for fewer than three vertices,
    /// non-finite vertices or identical axes.
    pub fn new(identifier: &str, axes: (&str, &str), points: Vec<[f64; 2]>) -> Result<Self> {
        let polygon = Self {
            identifier: identifier.to_string(),
            name: identifier.to_string(),
            axis_x: axes.0.to_string(),
            axis_y: axes.1.to_string(),
            points,
            inverted: false,
        };
        polygon.validate()?;
        Ok(polygon)
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Sets the inversion flag.
    #[must_use]
    pub fn with_inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Checks the polygon geometry.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPolygon`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.points.len() < 3 {
            return Err(Error::InvalidPolygon(format!(
                "'{}' has {} vertices, at least 3 are required",
                self.identifier,
                self.points.len()
            )));
        }
        if self.points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::InvalidPolygon(format!(
                "'{}' has non-finite vertices",
                self.identifier
            )));
        }
        if self.axis_x == self.axis_y {
            return Err(Error::InvalidPolygon(format!(
                "'{}' uses '{}' for both axes",
                self.identifier, self.axis_x
            )));
        }
        Ok(())
    }

    /// Returns true if an event at `(x, y)` passes this filter.
    ///
    /// Non-finite coordinates never pass, regardless of inversion.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if !(x.is_finite() && y.is_finite()) {
            return false;
        }
        self.inside(x, y) != self.inverted
    }

    // Even-odd rule.
    fn inside(&self, x: f64, y: f64) -> bool {
        if self.points.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = self.points.len() - 1;
        for (i, &[xi, yi]) in self.points.iter().enumerate() {
            let [xj, yj] = self.points[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> PolygonFilter {
        PolygonFilter::new(
            "Polygon_1",
            ("area_um", "deform"),
            vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_contains() {
        let poly = square();
        assert!(poly.contains(0.5, 0.5));
        assert!(poly.contains(0.1, 0.9));
        assert!(!poly.contains(1.5, 0.5));
        assert!(!poly.contains(-0.1, 0.5));
        assert!(!poly.contains(f64::NAN, 0.5));
    }

    #[test]
    fn test_inverted() {
        let poly = square().with_inverted(true);
        assert!(!poly.contains(0.5, 0.5));
        assert!(poly.contains(1.5, 0.5));
        assert!(!poly.contains(f64::INFINITY, 0.5));
    }

    #[test]
    fn test_too_few_vertices_contain_nothing() {
        let mut poly = square();
        poly.points.truncate(2);
        assert!(!poly.contains(0.5, 0.5));
        poly.points.clear();
        assert!(!poly.contains(0.5, 0.5));
        // inversion still applies to the empty region
        poly.inverted = true;
        assert!(poly.contains(0.5, 0.5));
    }

    #[test]
    fn test_invalid_polygons() {
        assert!(PolygonFilter::new("p", ("area_um", "deform"), vec![[0.0, 0.0]]).is_err());
        assert!(PolygonFilter::new(
            "p",
            ("deform", "deform"),
            vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0]]
        )
        .is_err());
        assert!(PolygonFilter::new(
            "p",
            ("area_um", "deform"),
            vec![[0.0, 0.0], [f64::NAN, 1.0], [1.0, 1.0]]
        )
        .is_err());
    }
}
