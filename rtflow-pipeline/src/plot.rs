//! Plot configurations.
//!
//! A [`Plot`] is pure configuration consumed by the rendering side; it
//! never touches dataset filtering.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Axis scaling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Linear,
    Log,
}

/// How datasets are distributed over the plot grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Division {
    /// One plot per dataset.
    #[serde(rename = "each")]
    Each,
    /// All datasets in one plot.
    #[serde(rename = "merge")]
    Merge,
    /// One scatter plot per dataset plus one merged contour plot.
    #[default]
    #[serde(rename = "multiscatter+contour")]
    MultiscatterContour,
}

/// Coloring of scatter markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerHue {
    /// Density estimate.
    #[default]
    Kde,
    /// Value of [`ScatterConfig::hue_feature`].
    Feature,
    /// Slot color.
    Dataset,
    /// Plain black.
    None,
}

/// Contour line style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
}

/// Grid layout section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(rename = "column count")]
    pub column_count: usize,
    pub division: Division,
    #[serde(rename = "label plots")]
    pub label_plots: bool,
    pub name: String,
    /// Width of a single plot [px].
    #[serde(rename = "size x")]
    pub size_x: u32,
    /// Height of a single plot [px].
    #[serde(rename = "size y")]
    pub size_y: u32,
}

/// Axes section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(rename = "auto range")]
    pub auto_range: bool,
    #[serde(rename = "axis x")]
    pub axis_x: String,
    #[serde(rename = "axis y")]
    pub axis_y: String,
    pub isoelastics: bool,
    /// Density estimation method.
    pub kde: String,
    #[serde(rename = "range x")]
    pub range_x: [f64; 2],
    #[serde(rename = "range y")]
    pub range_y: [f64; 2],
    #[serde(rename = "scale x")]
    pub scale_x: Scale,
    #[serde(rename = "scale y")]
    pub scale_y: Scale,
}

/// Scatter rendering section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterConfig {
    pub colormap: String,
    pub downsample: bool,
    #[serde(rename = "downsampling value")]
    pub downsampling_value: usize,
    pub enabled: bool,
    #[serde(rename = "hue feature")]
    pub hue_feature: String,
    #[serde(rename = "hue max")]
    pub hue_max: f64,
    #[serde(rename = "hue min")]
    pub hue_min: f64,
    #[serde(rename = "marker alpha")]
    pub marker_alpha: f64,
    #[serde(rename = "marker hue")]
    pub marker_hue: MarkerHue,
    #[serde(rename = "marker size")]
    pub marker_size: f64,
    #[serde(rename = "show event count")]
    pub show_event_count: bool,
}

/// Contour rendering section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourConfig {
    pub enabled: bool,
    pub legend: bool,
    #[serde(rename = "line widths")]
    pub line_widths: [f64; 2],
    #[serde(rename = "line styles")]
    pub line_styles: [LineStyle; 2],
    /// Density percentiles at which contours are drawn.
    pub percentiles: [f64; 2],
    #[serde(rename = "spacing x")]
    pub spacing_x: f64,
    #[serde(rename = "spacing y")]
    pub spacing_y: f64,
}

/// All sections of a plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    pub layout: LayoutConfig,
    pub general: GeneralConfig,
    pub scatter: ScatterConfig,
    pub contour: ContourConfig,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig {
                column_count: 2,
                division: Division::MultiscatterContour,
                label_plots: true,
                name: String::new(),
                size_x: 400,
                size_y: 400,
            },
            general: GeneralConfig {
                auto_range: true,
                axis_x: "area_um".to_string(),
                axis_y: "deform".to_string(),
                isoelastics: true,
                kde: "histogram".to_string(),
                range_x: [0.0, 0.0],
                range_y: [0.0, 0.0],
                scale_x: Scale::Linear,
                scale_y: Scale::Linear,
            },
            scatter: ScatterConfig {
                colormap: "viridis".to_string(),
                downsample: true,
                downsampling_value: 5000,
                enabled: true,
                hue_feature: "bright_avg".to_string(),
                hue_max: 1.0,
                hue_min: 0.0,
                marker_alpha: 0.3,
                marker_hue: MarkerHue::Kde,
                marker_size: 3.0,
                show_event_count: true,
            },
            contour: ContourConfig {
                enabled: true,
                legend: false,
                line_widths: [3.0, 1.5],
                line_styles: [LineStyle::Solid, LineStyle::Dashed],
                percentiles: [50.0, 95.0],
                spacing_x: 10.0,
                spacing_y: 0.01,
            },
        }
    }
}

/// Serialized form of a [`Plot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotState {
    pub identifier: String,
    #[serde(flatten)]
    pub config: PlotConfig,
}

/// A named visualization configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Plot {
    identifier: String,
    config: PlotConfig,
}

impl Plot {
    /// Creates a plot with the default configuration.
    #[must_use]
    pub fn new(identifier: &str) -> Self {
        let mut config = PlotConfig::default();
        config.layout.name = identifier.replace('_', " ");
        Self {
            identifier: identifier.to_string(),
            config,
        }
    }

    /// Restores a plot from its state.
    #[must_use]
    pub fn from_state(state: &PlotState) -> Self {
        Self {
            identifier: state.identifier.clone(),
            config: state.config.clone(),
        }
    }

    /// Returns the identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn assign_identifier(&mut self, identifier: String) {
        if self.config.layout.name.is_empty() {
            self.config.layout.name = identifier.replace('_', " ");
        }
        self.identifier = identifier;
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.layout.name
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PlotConfig {
        &self.config
    }

    /// Returns the configuration for modification.
    pub fn config_mut(&mut self) -> &mut PlotConfig {
        &mut self.config
    }

    /// Captures the current configuration.
    #[must_use]
    pub fn state(&self) -> PlotState {
        PlotState {
            identifier: self.identifier.clone(),
            config: self.config.clone(),
        }
    }

    /// Replaces the configuration.
    ///
    /// # Errors
    /// Returns [`Error::IdentifierMismatch`] if the state belongs to another plot.
    pub fn set_state(&mut self, state: &PlotState) -> Result<()> {
        if state.identifier != self.identifier {
            return Err(Error::IdentifierMismatch {
                expected: self.identifier.clone(),
                found: state.identifier.clone(),
            });
        }
        self.config = state.config.clone();
        Ok(())
    }
}
