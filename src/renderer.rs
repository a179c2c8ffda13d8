//! The renderer boundary consumed by service adapters.
//!
//! Arclink does not draw anything itself. Adapters push [`SourceDescriptor`]s
//! and [`LayerSpec`]s across the [`Renderer`] trait and leave all painting to
//! the host map engine. The trait is intentionally the smallest capability set
//! the adapters need, so one thin implementation per renderer version is
//! enough.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::attribution::Attribution;

/// Errors reported by a [`Renderer`] implementation.
#[derive(Debug, Error)]
pub enum RendererError {
    /// The referenced source is not registered on the renderer.
    #[error("source '{0}' not found")]
    SourceNotFound(String),
    /// The referenced layer is not registered on the renderer.
    #[error("layer '{0}' not found")]
    LayerNotFound(String),
    /// An in-flight tile request was aborted by a style or source mutation.
    #[error("tile load aborted")]
    AbortedTileLoad,
    /// A source handle went stale during a style reload.
    #[error("stale source handle")]
    StaleSource,
    /// The renderer version does not support this operation.
    #[error("operation not supported by this renderer: {0}")]
    Unsupported(&'static str),
    /// Any other renderer-internal failure.
    #[error("renderer error: {0}")]
    Backend(String),
}

impl RendererError {
    /// Whether this error is an expected consequence of mutating a live style
    /// and can be ignored during a source refresh.
    ///
    /// `SourceNotFound` counts as a race here: during a style reload the old
    /// source handle may disappear between the existence check and the update.
    pub fn is_race(&self) -> bool {
        matches!(
            self,
            RendererError::AbortedTileLoad
                | RendererError::StaleSource
                | RendererError::SourceNotFound(_)
        )
    }
}

/// The renderer-facing description of how to fetch a source's data.
///
/// Descriptors are derived values: adapters recompute them from option state
/// on every read and never mutate one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceDescriptor {
    /// Pre-rendered imagery fetched tile by tile.
    Raster {
        /// Tile URL templates. May contain `{z}/{y}/{x}` or bbox placeholders.
        tiles: Vec<String>,
        /// Edge size of one tile in pixels.
        #[serde(rename = "tileSize")]
        tile_size: u32,
    },
    /// Vector tiles in MVT format.
    Vector {
        /// Tile URL templates.
        tiles: Vec<String>,
    },
    /// A GeoJSON document fetched from a URL.
    #[serde(rename = "geojson")]
    GeoJson {
        /// URL of the document.
        data: String,
    },
}

impl SourceDescriptor {
    /// Tile URL templates of this source, if it is tiled.
    pub fn tiles(&self) -> Option<&[String]> {
        match self {
            SourceDescriptor::Raster { tiles, .. } | SourceDescriptor::Vector { tiles } => {
                Some(tiles)
            }
            SourceDescriptor::GeoJson { .. } => None,
        }
    }
}

/// A style layer bound to a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Unique layer id.
    pub id: String,
    /// Layer type understood by the renderer (`raster`, `fill`, `line`, ...).
    #[serde(rename = "type")]
    pub layer_type: String,
    /// Id of the source the layer draws from.
    pub source: String,
    /// Source layer name, required by the renderer for vector sources.
    #[serde(rename = "source-layer", skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    /// Paint properties, passed through to the renderer untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paint: Option<Value>,
}

impl LayerSpec {
    /// Creates a layer spec with no paint properties.
    pub fn new(
        id: impl Into<String>,
        layer_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            layer_type: layer_type.into(),
            source: source.into(),
            source_layer: None,
            paint: None,
        }
    }

    /// Sets the source layer name.
    pub fn with_source_layer(mut self, source_layer: impl Into<String>) -> Self {
        self.source_layer = Some(source_layer.into());
        self
    }

    /// Sets the paint properties.
    pub fn with_paint(mut self, paint: Value) -> Self {
        self.paint = Some(paint);
        self
    }
}

/// Listener registered with [`Renderer::on`].
pub type EventListener = Box<dyn Fn(&Value) + Send + Sync>;

/// Handle to a registered event listener.
pub type ListenerId = u64;

/// The capability set adapters require from the host map renderer.
///
/// Methods with default implementations are optional capabilities: a renderer
/// that does not support them reports [`RendererError::Unsupported`] (or does
/// nothing, for the cosmetic ones), and adapters fall back to the next
/// supported path.
pub trait Renderer: Send + Sync {
    /// Registers a source under the given id.
    fn add_source(&self, id: &str, descriptor: &SourceDescriptor) -> Result<(), RendererError>;

    /// Returns the currently registered descriptor for the id, if any.
    fn get_source(&self, id: &str) -> Option<SourceDescriptor>;

    /// Unregisters the source.
    fn remove_source(&self, id: &str) -> Result<(), RendererError>;

    /// Adds a style layer, optionally before an existing layer.
    fn add_layer(&self, layer: &LayerSpec, before_id: Option<&str>) -> Result<(), RendererError>;

    /// Removes a style layer.
    fn remove_layer(&self, id: &str) -> Result<(), RendererError>;

    /// Returns the layer spec for the id, if registered.
    fn get_layer(&self, id: &str) -> Option<LayerSpec>;

    /// Updates a single paint property of a layer.
    fn set_paint_property(
        &self,
        layer_id: &str,
        property: &str,
        value: Value,
    ) -> Result<(), RendererError>;

    /// Pushes an attribution string for the source to the renderer's
    /// attribution control. Cosmetic; the default does nothing.
    fn set_attribution(&self, _source_id: &str, _attribution: &Attribution) {}

    /// Subscribes to a renderer event. The default registers nothing.
    fn on(&self, _event: &str, _listener: EventListener) -> ListenerId {
        0
    }

    /// Removes a listener registered with [`Renderer::on`].
    fn off(&self, _event: &str, _listener: ListenerId) {}

    /// Replaces the tile URLs of a live tiled source without re-registering
    /// it. First tier of the tile refresh chain.
    fn set_tiles(&self, _source_id: &str, _tiles: &[String]) -> Result<(), RendererError> {
        Err(RendererError::Unsupported("set_tiles"))
    }

    /// Drops cached tiles of the source and schedules a reload. Second tier,
    /// for renderer versions without `set_tiles`.
    fn clear_tile_cache(&self, _source_id: &str) -> Result<(), RendererError> {
        Err(RendererError::Unsupported("clear_tile_cache"))
    }

    /// Legacy variant of [`Renderer::clear_tile_cache`] for renderer versions
    /// that keep secondary source caches. Third tier.
    fn legacy_clear_tile_cache(&self, _source_id: &str) -> Result<(), RendererError> {
        Err(RendererError::Unsupported("legacy_clear_tile_cache"))
    }
}

/// Pushes new tile URLs to a live source, walking the three-tier capability
/// chain in priority order.
///
/// Returns `Unsupported` only when no tier is available, in which case the
/// caller should re-register the source instead.
pub(crate) fn refresh_source_tiles(
    renderer: &dyn Renderer,
    source_id: &str,
    tiles: &[String],
) -> Result<(), RendererError> {
    match renderer.set_tiles(source_id, tiles) {
        Err(RendererError::Unsupported(_)) => {}
        other => return other,
    }
    match renderer.clear_tile_cache(source_id) {
        Err(RendererError::Unsupported(_)) => {}
        other => return other,
    }
    renderer.legacy_clear_tile_cache(source_id)
}
