//! # rtflow-pipeline
//!
//! Analysis pipeline over RT-DC measurements.
//!
//! A [`Pipeline`] combines measurement slots ([`Dataslot`]) with an
//! ordered list of [`Filter`]s and a list of [`Plot`]s. Which filters and
//! plots apply to which slot is controlled by an activation matrix. The
//! filtered view of each slot is cached in a [`FilterRay`] so that only
//! the part of a filter chain that actually changed is recomputed.
//!
//! The complete pipeline state converts to and from [`PipelineState`],
//! which serializes to the session JSON format.

mod config;
mod dataslot;
mod digest;
mod error;
mod filter;
mod pipeline;
mod plot;
mod polygons;
mod ray;
mod registry;
mod state;

pub use config::PipelineConfig;
pub use dataslot::{Dataslot, EmodulusConfig, SlotState, TemperatureSource, DEFAULT_SLOT_COLOR};
pub use error::{Error, Result};
pub use filter::{BoxFilter, Filter, FilterState, DEFAULT_LIMIT_EVENTS};
pub use pipeline::{FeatureQuery, Pipeline};
pub use plot::{
    ContourConfig, Division, GeneralConfig, LayoutConfig, LineStyle, MarkerHue, Plot, PlotConfig,
    PlotState, Scale, ScatterConfig,
};
pub use polygons::PolygonRegistry;
pub use ray::FilterRay;
pub use registry::{ElementKind, IdentifierRegistry};
pub use state::{FilterExport, PipelineState};

pub use rtflow_core::{DatasetHandle, DatasetSource, FeatureTable, MemorySource, PolygonFilter};
