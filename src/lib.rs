//! Arclink lets a vector-tile map renderer consume ArcGIS Server REST
//! services as native sources and layers.
//!
//! # Quick start
//!
//! Bind a dynamic map service to a renderer source and draw it:
//!
//! ```no_run
//! use std::sync::Arc;
//! use arclink::renderer::{LayerSpec, Renderer};
//! use arclink::service::{DynamicMapOptions, DynamicMapService};
//!
//! # async fn example(renderer: Arc<dyn Renderer>) -> Result<(), arclink::error::ArclinkError> {
//! let service = DynamicMapService::new(
//!     "census",
//!     renderer,
//!     DynamicMapOptions::new("https://sampleserver6.arcgisonline.com/arcgis/rest/services/Census/MapServer")
//!         .with_layers(vec![0, 1, 2])
//!         .with_format("png32"),
//! )?;
//! service.add_layer(LayerSpec::new("census-imagery", "raster", ""), None)?;
//!
//! // Mutations update option state synchronously and coalesce renderer
//! // refreshes behind the scenes.
//! service.set_layer_visibility(1, false)?;
//! service.set_layer_definition(2, "POP2000 > 50000")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Main components
//!
//! * [`service`] — one adapter per ArcGIS service family (dynamic map, tiled
//!   map, image, feature, vector tile, vector basemap style). An adapter owns
//!   one renderer source: it derives the source descriptor from its mutable
//!   option state and keeps the renderer in sync as that state changes.
//! * [`dynamic_layer`] — per-sublayer override records (visibility, filters,
//!   renderers, labeling) and the set that serializes them into the
//!   `dynamicLayers` export parameter.
//! * [`filter`] — typed filter expressions compiled to SQL `where` clauses.
//! * [`tasks`] — parameters for the one-shot `identify`, `find` and `query`
//!   helpers.
//! * [`renderer`] — the boundary trait the host map engine implements.
//!
//! The crate draws nothing itself and keeps no state outside its adapters;
//! its only external surfaces are the renderer trait and the HTTP requests it
//! issues against the ArcGIS REST endpoints.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

pub(crate) mod async_runtime;
pub mod attribution;
pub mod dynamic_layer;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod http;
pub mod metadata;
pub mod params;
pub(crate) mod refresh;
pub mod renderer;
pub mod service;
pub mod tasks;

pub use attribution::Attribution;
pub use dynamic_layer::{DrawingInfo, DynamicLayer, DynamicLayerOp, DynamicLayerSet};
pub use error::ArclinkError;
pub use filter::{ComparisonOp, FilterValue, GroupOp, LayerFilter};
pub use geometry::{Extent, Geometry, LngLat, ScreenSize};
pub use metadata::ServiceMetadata;
pub use params::{EpochMs, TimeExtent};
pub use renderer::{LayerSpec, Renderer, RendererError, SourceDescriptor};
pub use service::{
    DynamicMapOptions, DynamicMapService, FeatureService, FeatureServiceOptions, ImageService,
    ImageServiceOptions, ServiceAdapter, ServiceStrategy, TiledMapOptions, TiledMapService,
    VectorBasemapStyle, VectorTileOptions, VectorTileService,
};
pub use tasks::{
    FeatureQuery, FindParameters, IdentifyParameters, StatisticDefinition, StatisticType,
};
