//! Adapter for ArcGIS Dynamic Map services (`MapServer` export).
//!
//! A dynamic map service renders imagery on demand through its `export`
//! endpoint. The adapter registers a raster source whose tile URL template
//! carries the whole option state as query parameters, so every mutation
//! reduces to regenerating one URL and pushing it to the renderer.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::dynamic_layer::{DrawingInfo, DynamicLayer, DynamicLayerOp, DynamicLayerSet};
use crate::error::ArclinkError;
use crate::filter::LayerFilter;
use crate::geometry::{Extent, ScreenSize};
use crate::http::HttpClient;
use crate::params::{layers_param, time_param, EpochMs, ParamList, TimeExtent};
use crate::renderer::{Renderer, SourceDescriptor};
use crate::tasks::{FindParameters, IdentifyParameters};

use super::{normalize_service_url, ServiceAdapter, ServiceStrategy, TaskKind};

/// Options of a [`DynamicMapService`].
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMapOptions {
    url: String,
    /// Sublayers to draw. `None` lets the server decide; an empty list draws
    /// nothing.
    pub layers: Option<Vec<u32>>,
    /// Per-sublayer definition expressions.
    pub layer_defs: Option<BTreeMap<u32, String>>,
    /// Export image format.
    pub format: String,
    /// Whether exported images have a transparent background.
    pub transparent: bool,
    /// Export DPI. Unset uses the server default.
    pub dpi: Option<u32>,
    /// Edge size of one exported tile in pixels.
    pub tile_size: u32,
    /// Time range for time-aware services.
    pub time: Option<TimeExtent>,
    /// Whether the service's copyright text is pushed to the renderer.
    pub attribution_from_service: bool,
}

impl DynamicMapOptions {
    /// Creates options for the given `MapServer` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            layers: None,
            layer_defs: None,
            format: "png24".to_string(),
            transparent: true,
            dpi: None,
            tile_size: 256,
            time: None,
            attribution_from_service: true,
        }
    }

    /// Selects the sublayers to draw.
    pub fn with_layers(mut self, layers: Vec<u32>) -> Self {
        self.layers = Some(layers);
        self
    }

    /// Sets per-sublayer definition expressions.
    pub fn with_layer_defs(mut self, layer_defs: BTreeMap<u32, String>) -> Self {
        self.layer_defs = Some(layer_defs);
        self
    }

    /// Sets the export image format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Sets background transparency.
    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Sets the export DPI.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    /// Sets the time range.
    pub fn with_time(mut self, time: TimeExtent) -> Self {
        self.time = Some(time);
        self
    }

    /// Disables the attribution lookup.
    pub fn without_service_attribution(mut self) -> Self {
        self.attribution_from_service = false;
        self
    }
}

/// Descriptor derivation for dynamic map services.
#[derive(Debug)]
pub struct DynamicMapStrategy {
    options: DynamicMapOptions,
    overrides: DynamicLayerSet,
}

impl DynamicMapStrategy {
    /// Validates the options and creates the strategy.
    pub fn new(mut options: DynamicMapOptions) -> Result<Self, ArclinkError> {
        options.url = normalize_service_url(&options.url)?;
        Ok(Self {
            options,
            overrides: DynamicLayerSet::new(),
        })
    }

    pub(crate) fn options(&self) -> &DynamicMapOptions {
        &self.options
    }

    pub(crate) fn options_mut(&mut self) -> &mut DynamicMapOptions {
        &mut self.options
    }

    pub(crate) fn overrides(&self) -> &DynamicLayerSet {
        &self.overrides
    }

    pub(crate) fn overrides_mut(&mut self) -> &mut DynamicLayerSet {
        &mut self.overrides
    }

    pub(crate) fn visible_ids(&self) -> Vec<u32> {
        self.options.layers.clone().unwrap_or_default()
    }

    /// Appends the parameters shared by export and identify requests.
    fn push_layer_state(
        &self,
        params: &mut ParamList,
        layers_prefix: &str,
    ) -> Result<(), ArclinkError> {
        params.push_opt(
            "layers",
            layers_param(layers_prefix, self.options.layers.as_deref()),
        );
        if let Some(layer_defs) = &self.options.layer_defs {
            params.push_json("layerDefs", layer_defs)?;
        }
        if !self.overrides.is_empty() {
            params.push_json("dynamicLayers", &self.overrides.to_wire(&self.visible_ids()))?;
        }
        params.push_opt("time", time_param(self.options.time.as_ref()));
        Ok(())
    }

    /// The export tile URL template registered on the renderer. The bbox
    /// placeholder is substituted per tile by the renderer and must stay
    /// unencoded.
    pub(crate) fn export_tile_url(&self) -> Result<String, ArclinkError> {
        let mut params = ParamList::new();
        params.push_raw("bbox", "{bbox-epsg-3857}");
        params.push("bboxSR", "3857");
        params.push("imageSR", "3857");
        params.push("format", self.options.format.clone());
        if let Some(dpi) = self.options.dpi {
            params.push("dpi", dpi.to_string());
        }
        params.push("transparent", self.options.transparent.to_string());
        params.push("size", format!("{0},{0}", self.options.tile_size));
        self.push_layer_state(&mut params, "show")?;
        params.push("f", "image");
        Ok(params.append_to(&format!("{}/export", self.options.url)))
    }
}

impl ServiceStrategy for DynamicMapStrategy {
    fn service_url(&self) -> &str {
        &self.options.url
    }

    fn source_descriptor(&self) -> Result<SourceDescriptor, ArclinkError> {
        Ok(SourceDescriptor::Raster {
            tiles: vec![self.export_tile_url()?],
            tile_size: self.options.tile_size,
        })
    }

    fn task_url(&self, task: TaskKind) -> Option<String> {
        let endpoint = match task {
            TaskKind::Export => "export",
            TaskKind::Identify => "identify",
            TaskKind::Find => "find",
            TaskKind::Legend => "legend",
            TaskKind::Layers => "layers",
            TaskKind::Query => return None,
        };
        Some(format!("{}/{endpoint}", self.options.url))
    }

    fn attribution_from_service(&self) -> bool {
        self.options.attribution_from_service
    }
}

/// Adapter for a dynamic map service.
pub type DynamicMapService = ServiceAdapter<DynamicMapStrategy>;

impl DynamicMapService {
    /// Creates the adapter and registers its raster source.
    pub fn new(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        options: DynamicMapOptions,
    ) -> Result<Self, ArclinkError> {
        Self::from_strategy(source_id, renderer, DynamicMapStrategy::new(options)?)
    }

    /// Same as [`DynamicMapService::new`] with a custom HTTP client.
    pub fn with_http_client(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        options: DynamicMapOptions,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ArclinkError> {
        Self::from_parts(source_id, renderer, DynamicMapStrategy::new(options)?, http)
    }

    /// Mutates the override set. Inside a transaction the refresh is held
    /// back until commit; otherwise one is scheduled.
    fn mutate_overrides(
        &self,
        f: impl FnOnce(&mut DynamicLayerSet),
    ) -> Result<(), ArclinkError> {
        let in_transaction = self.write(|strategy| {
            f(strategy.overrides_mut());
            strategy.overrides().is_in_transaction()
        })?;
        if in_transaction {
            Ok(())
        } else {
            self.schedule_refresh()
        }
    }

    /// Selects the sublayers to draw.
    pub fn set_layers(&self, layers: Option<Vec<u32>>) -> Result<(), ArclinkError> {
        self.write_and_refresh(|strategy| strategy.options_mut().layers = layers)
    }

    /// Sets per-sublayer definition expressions.
    pub fn set_layer_defs(
        &self,
        layer_defs: Option<BTreeMap<u32, String>>,
    ) -> Result<(), ArclinkError> {
        self.write_and_refresh(|strategy| strategy.options_mut().layer_defs = layer_defs)
    }

    /// Sets the time range. No `time` parameter is emitted until `to` is
    /// also given.
    pub fn set_date(&self, from: EpochMs, to: Option<EpochMs>) -> Result<(), ArclinkError> {
        self.write_and_refresh(|strategy| {
            strategy.options_mut().time = Some(TimeExtent { from, to })
        })
    }

    /// Clears the time range.
    pub fn clear_date(&self) -> Result<(), ArclinkError> {
        self.write_and_refresh(|strategy| strategy.options_mut().time = None)
    }

    /// Replaces the whole override set.
    pub fn set_dynamic_layers(&self, layers: Vec<DynamicLayer>) -> Result<(), ArclinkError> {
        self.mutate_overrides(|overrides| overrides.replace(layers))
    }

    /// Sets a sublayer's visibility.
    pub fn set_layer_visibility(&self, id: u32, visible: bool) -> Result<(), ArclinkError> {
        self.mutate_overrides(|overrides| overrides.set_visibility(id, visible))
    }

    /// Sets a sublayer's definition expression.
    pub fn set_layer_definition(
        &self,
        id: u32,
        expression: impl Into<String>,
    ) -> Result<(), ArclinkError> {
        let expression = expression.into();
        self.mutate_overrides(|overrides| overrides.set_definition(id, expression))
    }

    /// Compiles the filter and applies it as a sublayer's definition
    /// expression. A filter with no constraint leaves the sublayer untouched.
    pub fn set_layer_filter(&self, id: u32, filter: &LayerFilter) -> Result<(), ArclinkError> {
        self.mutate_overrides(|overrides| overrides.set_filter(id, filter))
    }

    /// Sets a sublayer's renderer.
    pub fn set_layer_renderer(&self, id: u32, renderer: Value) -> Result<(), ArclinkError> {
        self.mutate_overrides(|overrides| overrides.set_renderer(id, renderer))
    }

    /// Shallow-merges drawing info fields into a sublayer.
    pub fn set_layer_drawing_info(
        &self,
        id: u32,
        patch: DrawingInfo,
    ) -> Result<(), ArclinkError> {
        self.mutate_overrides(|overrides| overrides.set_drawing_info(id, patch))
    }

    /// Replaces a sublayer's labeling with a single label class.
    pub fn set_layer_labels(&self, id: u32, label: Value) -> Result<(), ArclinkError> {
        self.mutate_overrides(|overrides| overrides.set_labels(id, label))
    }

    /// Shows or hides a sublayer's labels.
    pub fn set_layer_labels_visible(&self, id: u32, visible: bool) -> Result<(), ArclinkError> {
        self.mutate_overrides(|overrides| overrides.set_labels_visible(id, visible))
    }

    /// Sets a sublayer's time options.
    pub fn set_layer_time_options(&self, id: u32, options: Value) -> Result<(), ArclinkError> {
        self.mutate_overrides(|overrides| overrides.set_time_options(id, options))
    }

    /// Applies a batch of override mutations in order.
    pub fn apply_layer_ops(&self, ops: Vec<DynamicLayerOp>) -> Result<(), ArclinkError> {
        self.mutate_overrides(|overrides| overrides.apply_batch(ops))
    }

    /// Opens an override transaction. Mutations go to a staging buffer until
    /// [`DynamicMapService::commit`]. A `begin` while a transaction is open
    /// silently restarts it.
    pub fn begin(&self) -> Result<(), ArclinkError> {
        self.write(|strategy| strategy.overrides_mut().begin())
    }

    /// Commits the open transaction and refreshes the source exactly once.
    pub fn commit(&self) -> Result<(), ArclinkError> {
        let committed = self.write(|strategy| {
            let visible = strategy.visible_ids();
            strategy.overrides_mut().commit(&visible)
        })?;
        if committed {
            self.schedule_refresh()
        } else {
            Ok(())
        }
    }

    /// Discards the open transaction without refreshing.
    pub fn rollback(&self) -> Result<(), ArclinkError> {
        self.write(|strategy| {
            strategy.overrides_mut().rollback();
        })
    }

    /// Whether an override transaction is open.
    pub fn is_in_transaction(&self) -> bool {
        self.read(|strategy| strategy.overrides().is_in_transaction())
    }

    /// Snapshot of the committed override records.
    pub fn dynamic_layers(&self) -> Vec<DynamicLayer> {
        self.read(|strategy| strategy.overrides().layers().to_vec())
    }

    /// Identifies features around a point, honoring the current layer
    /// selection, definition expressions, overrides and time range.
    pub async fn identify(
        &self,
        parameters: &IdentifyParameters,
    ) -> Result<Value, ArclinkError> {
        let mut params = parameters.to_params()?;
        self.read(|strategy| strategy.push_layer_state(&mut params, "visible"))?;
        self.task_json(TaskKind::Identify, &params).await
    }

    /// Searches features by text.
    pub async fn find(&self, parameters: &FindParameters) -> Result<Value, ArclinkError> {
        let mut params = parameters.to_params();
        self.read(|strategy| {
            if let Some(layer_defs) = &strategy.options().layer_defs {
                params.push_json("layerDefs", layer_defs)
            } else {
                Ok(())
            }
        })?;
        self.task_json(TaskKind::Find, &params).await
    }

    /// Exports a map image for the extent and returns the binary body.
    pub async fn export_map_image(
        &self,
        extent: &Extent,
        size: ScreenSize,
    ) -> Result<Bytes, ArclinkError> {
        let mut params = ParamList::new();
        params.push("bbox", extent.to_bbox_string());
        params.push("bboxSR", "4326");
        params.push("imageSR", "3857");
        params.push("size", format!("{},{}", size.width, size.height));
        self.read(|strategy| {
            params.push("format", strategy.options().format.clone());
            params.push("transparent", strategy.options().transparent.to_string());
            strategy.push_layer_state(&mut params, "show")
        })?;
        params.push("f", "image");
        self.task_bytes(TaskKind::Export, &params).await
    }

}
