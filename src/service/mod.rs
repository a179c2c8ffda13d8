//! Service adapters bind ArcGIS REST services to renderer sources.
//!
//! One [`ServiceAdapter`] owns one renderer source: it derives a
//! [`SourceDescriptor`](crate::renderer::SourceDescriptor) from its mutable
//! option state, registers it at construction, and re-applies it through a
//! debouncer whenever a mutator runs. Family-specific behavior (how the
//! descriptor and task endpoints are built) lives in a [`ServiceStrategy`]
//! implemented once per service family, so there is exactly one lifecycle
//! implementation shared by all of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::ArclinkError;
use crate::http::{fetch_json, HttpClient, ReqwestHttpClient};
use crate::geometry::EsriExtent;
use crate::metadata::{FieldInfo, LayerSummary, MetadataCache, ServiceMetadata};
use crate::params::ParamList;
use crate::refresh::{RefreshFn, SourceRefreshDebouncer};
use crate::renderer::{refresh_source_tiles, LayerSpec, Renderer, RendererError, SourceDescriptor};

mod basemap_style;
mod dynamic_map;
mod feature;
mod image;
mod tiled_map;
mod vector_tile;

pub use basemap_style::{resolve_style_path, VectorBasemapStyle};
pub use dynamic_map::{DynamicMapOptions, DynamicMapService, DynamicMapStrategy};
pub use feature::{FeatureService, FeatureServiceOptions, FeatureSourceMode, FeatureStrategy};
pub use image::{ImageService, ImageServiceOptions, ImageStrategy};
pub use tiled_map::{TiledMapOptions, TiledMapService, TiledMapStrategy};
pub use vector_tile::{VectorTileOptions, VectorTileService, VectorTileStrategy};

/// One-shot task endpoints a service family may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Map image export (`export` / `exportImage`).
    Export,
    /// The `identify` endpoint.
    Identify,
    /// The `find` endpoint.
    Find,
    /// The per-layer `query` endpoint.
    Query,
    /// The `legend` endpoint.
    Legend,
    /// The `layers` listing endpoint.
    Layers,
}

/// Family-specific derivation of renderer sources and task endpoints.
///
/// Implementations hold the family's option state; the shared
/// [`ServiceAdapter`] owns the lifecycle around them.
pub trait ServiceStrategy: Send + Sync + 'static {
    /// Normalized service root URL, without a trailing slash.
    fn service_url(&self) -> &str;

    /// Derives the renderer source for the current option state.
    fn source_descriptor(&self) -> Result<SourceDescriptor, ArclinkError>;

    /// Endpoint URL (without query parameters) of a task, if the family
    /// supports it.
    fn task_url(&self, task: TaskKind) -> Option<String>;

    /// Whether the service's copyright text is pushed to the renderer's
    /// attribution control.
    fn attribution_from_service(&self) -> bool {
        true
    }
}

/// Validates and normalizes a service URL at construction time.
pub(crate) fn normalize_service_url(url: &str) -> Result<String, ArclinkError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(ArclinkError::Configuration(
            "service URL is required".into(),
        ));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

struct AdapterInner<S: ServiceStrategy> {
    source_id: String,
    renderer: Arc<dyn Renderer>,
    strategy: RwLock<S>,
    http: Arc<dyn HttpClient>,
    metadata: MetadataCache,
    debouncer: SourceRefreshDebouncer,
    bound_layers: Mutex<Vec<String>>,
    removed: AtomicBool,
}

/// A registered renderer source driven by one ArcGIS service.
///
/// The adapter is cheaply cloneable; clones share the same state and source.
/// Its life cycle is `Active` (source registered) until [`remove()`] is
/// called, after which every operation reports [`ArclinkError::Removed`] and
/// a new adapter must be constructed to re-add the source.
///
/// [`remove()`]: ServiceAdapter::remove
pub struct ServiceAdapter<S: ServiceStrategy> {
    inner: Arc<AdapterInner<S>>,
}

impl<S: ServiceStrategy> Clone for ServiceAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ServiceStrategy> std::fmt::Debug for ServiceAdapter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAdapter")
            .field("source_id", &self.inner.source_id)
            .field("removed", &self.inner.removed.load(Ordering::SeqCst))
            .finish()
    }
}

impl<S: ServiceStrategy> ServiceAdapter<S> {
    /// Creates an adapter with the default HTTP client.
    pub fn from_strategy(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        strategy: S,
    ) -> Result<Self, ArclinkError> {
        Self::from_parts(source_id, renderer, strategy, Arc::new(ReqwestHttpClient::new()))
    }

    /// Creates an adapter with a custom HTTP client.
    ///
    /// Registers the derived source on the renderer immediately. Registration
    /// is idempotent: if a source with the same id already exists it is left
    /// alone, so constructing twice for the same id does not fail.
    pub fn from_parts(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        strategy: S,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ArclinkError> {
        let source_id = source_id.into();
        let metadata = MetadataCache::new(strategy.service_url());
        let inner = Arc::new(AdapterInner {
            source_id,
            renderer,
            strategy: RwLock::new(strategy),
            http,
            metadata,
            debouncer: SourceRefreshDebouncer::new(),
            bound_layers: Mutex::new(Vec::new()),
            removed: AtomicBool::new(false),
        });

        let descriptor = inner.strategy.read().source_descriptor()?;
        if inner.renderer.get_source(&inner.source_id).is_none() {
            inner.renderer.add_source(&inner.source_id, &descriptor)?;
        }

        let adapter = Self { inner };
        if adapter.inner.strategy.read().attribution_from_service() {
            adapter.spawn_attribution_fetch();
        }
        Ok(adapter)
    }

    /// Id of the renderer source this adapter owns.
    pub fn source_id(&self) -> &str {
        &self.inner.source_id
    }

    /// The renderer this adapter is bound to.
    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.inner.renderer
    }

    /// The HTTP client used for metadata and task requests.
    pub(crate) fn http(&self) -> &Arc<dyn HttpClient> {
        &self.inner.http
    }

    /// Whether [`ServiceAdapter::remove`] has been called.
    pub fn is_removed(&self) -> bool {
        self.inner.removed.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<(), ArclinkError> {
        if self.is_removed() {
            Err(ArclinkError::Removed)
        } else {
            Ok(())
        }
    }

    /// Reads from the strategy.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.strategy.read())
    }

    /// Mutates the strategy without triggering a refresh.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R, ArclinkError> {
        self.ensure_active()?;
        Ok(f(&mut self.inner.strategy.write()))
    }

    /// Mutates the strategy, then schedules a (possibly debounced) refresh.
    ///
    /// The option state is updated synchronously; only the renderer-visible
    /// effect may be deferred.
    pub(crate) fn write_and_refresh(
        &self,
        f: impl FnOnce(&mut S),
    ) -> Result<(), ArclinkError> {
        self.write(f)?;
        self.schedule_refresh()
    }

    /// Schedules a refresh of the renderer source through the debouncer.
    pub(crate) fn schedule_refresh(&self) -> Result<(), ArclinkError> {
        let weak = Arc::downgrade(&self.inner);
        let refresh: RefreshFn = Arc::new(move || match weak.upgrade() {
            Some(inner) => apply_refresh(&inner),
            None => Ok(()),
        });
        self.inner.debouncer.schedule(refresh)
    }

    /// Forces an immediate refresh of the renderer source.
    pub fn update(&self) -> Result<(), ArclinkError> {
        self.ensure_active()?;
        let result = apply_refresh(&self.inner);
        self.inner.debouncer.mark_applied();
        result
    }

    /// Unregisters the source and any layers added through this adapter.
    ///
    /// Idempotent: calling it twice is a no-op. The adapter is terminal
    /// afterwards.
    pub fn remove(&self) -> Result<(), ArclinkError> {
        if self.inner.removed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let layers: Vec<String> = self.inner.bound_layers.lock().drain(..).collect();
        for layer_id in layers {
            if let Err(error) = self.inner.renderer.remove_layer(&layer_id) {
                log::warn!("failed to remove layer '{layer_id}': {error}");
            }
        }

        match self.inner.renderer.remove_source(&self.inner.source_id) {
            Err(error) if error.is_race() => Ok(()),
            Err(error) => Err(error.into()),
            Ok(()) => Ok(()),
        }
    }

    /// Adds a style layer bound to this adapter's source. The layer's
    /// `source` field is overwritten with the adapter's source id, and the
    /// layer is removed again by [`ServiceAdapter::remove`].
    pub fn add_layer(
        &self,
        mut layer: LayerSpec,
        before_id: Option<&str>,
    ) -> Result<(), ArclinkError> {
        self.ensure_active()?;
        layer.source = self.inner.source_id.clone();
        self.inner.renderer.add_layer(&layer, before_id)?;
        self.inner.bound_layers.lock().push(layer.id);
        Ok(())
    }

    /// Removes a style layer previously added through this adapter.
    pub fn remove_layer(&self, layer_id: &str) -> Result<(), ArclinkError> {
        self.ensure_active()?;
        self.inner.bound_layers.lock().retain(|id| id != layer_id);
        self.inner.renderer.remove_layer(layer_id)?;
        Ok(())
    }

    /// Service metadata, fetched once per adapter lifetime.
    ///
    /// Concurrent calls before the first fetch resolves share the same
    /// in-flight request.
    pub async fn get_metadata(&self) -> Result<Arc<ServiceMetadata>, ArclinkError> {
        self.inner.metadata.get_or_fetch(self.inner.http.as_ref()).await
    }

    /// Runs a one-shot task request and parses the JSON response.
    pub(crate) async fn task_json(
        &self,
        task: TaskKind,
        params: &ParamList,
    ) -> Result<Value, ArclinkError> {
        self.ensure_active()?;
        let url = self.task_endpoint(task)?;
        fetch_json(self.inner.http.as_ref(), &params.append_to(&url)).await
    }

    /// Runs a one-shot task request and returns the raw response body.
    pub(crate) async fn task_bytes(
        &self,
        task: TaskKind,
        params: &ParamList,
    ) -> Result<Bytes, ArclinkError> {
        self.ensure_active()?;
        let url = self.task_endpoint(task)?;
        let full = params.append_to(&url);
        log::trace!("Requesting {full}");
        self.inner.http.get(&full).await
    }

    /// Runs a GET against a path below the service root and parses the JSON
    /// response.
    pub(crate) async fn service_json(
        &self,
        path: &str,
        params: &ParamList,
    ) -> Result<Value, ArclinkError> {
        self.ensure_active()?;
        let url = format!("{}/{path}", self.read(|s| s.service_url().to_string()));
        fetch_json(self.inner.http.as_ref(), &params.append_to(&url)).await
    }

    /// Full description of one sublayer, from `{url}/{id}?f=json`.
    pub async fn get_layer_info(&self, layer_id: u32) -> Result<Value, ArclinkError> {
        let mut params = ParamList::new();
        params.push("f", "json");
        self.service_json(&layer_id.to_string(), &params).await
    }

    /// Field list of one sublayer.
    pub async fn get_layer_fields(&self, layer_id: u32) -> Result<Vec<FieldInfo>, ArclinkError> {
        let mut info = self.get_layer_info(layer_id).await?;
        match info.get_mut("fields") {
            Some(fields) => Ok(serde_json::from_value(fields.take())?),
            None => Err(ArclinkError::NotFound),
        }
    }

    /// Extent of one sublayer, in the service's spatial reference.
    pub async fn get_layer_extent(&self, layer_id: u32) -> Result<EsriExtent, ArclinkError> {
        let mut info = self.get_layer_info(layer_id).await?;
        match info.get_mut("extent") {
            Some(extent) => Ok(serde_json::from_value(extent.take())?),
            None => Err(ArclinkError::NotFound),
        }
    }

    /// Fetches the legend of the service, for families with a `legend`
    /// endpoint.
    pub async fn generate_legend(&self) -> Result<Value, ArclinkError> {
        let mut params = ParamList::new();
        params.push("f", "json");
        self.task_json(TaskKind::Legend, &params).await
    }

    /// Lists the sublayers the service exposes, from `{url}/layers`.
    pub async fn discover_layers(&self) -> Result<Vec<LayerSummary>, ArclinkError> {
        let mut params = ParamList::new();
        params.push("f", "json");
        let mut value = self.service_json("layers", &params).await?;
        match value.get_mut("layers") {
            Some(layers) => Ok(serde_json::from_value(layers.take())?),
            None => Err(ArclinkError::NotFound),
        }
    }

    fn task_endpoint(&self, task: TaskKind) -> Result<String, ArclinkError> {
        self.inner
            .strategy
            .read()
            .task_url(task)
            .ok_or_else(|| ArclinkError::Generic(format!("service does not support {task:?}")))
    }

    fn spawn_attribution_fetch(&self) {
        let weak = Arc::downgrade(&self.inner);
        crate::async_runtime::spawn(async move {
            let Some(inner) = weak.upgrade() else { return };
            match inner.metadata.get_or_fetch(inner.http.as_ref()).await {
                Ok(metadata) => {
                    if let Some(text) = metadata.attribution_text() {
                        let attribution = crate::attribution::Attribution::new(text);
                        inner.renderer.set_attribution(&inner.source_id, &attribution);
                    }
                }
                // Attribution is cosmetic; a failed fetch must not surface.
                Err(error) => log::warn!(
                    "failed to fetch attribution for '{}': {error}",
                    inner.source_id
                ),
            }
        });
    }
}

/// Recomputes the descriptor and pushes it to the renderer, ignoring
/// expected style-mutation races.
fn apply_refresh<S: ServiceStrategy>(inner: &AdapterInner<S>) -> Result<(), ArclinkError> {
    if inner.removed.load(Ordering::SeqCst) {
        return Ok(());
    }
    let descriptor = inner.strategy.read().source_descriptor()?;
    match push_descriptor(inner, &descriptor) {
        Err(error) if error.is_race() => {
            log::trace!(
                "ignoring renderer race during refresh of '{}': {error}",
                inner.source_id
            );
            Ok(())
        }
        Err(error) => Err(error.into()),
        Ok(()) => Ok(()),
    }
}

fn push_descriptor<S: ServiceStrategy>(
    inner: &AdapterInner<S>,
    descriptor: &SourceDescriptor,
) -> Result<(), RendererError> {
    match inner.renderer.get_source(&inner.source_id) {
        None => inner.renderer.add_source(&inner.source_id, descriptor),
        Some(current) if current == *descriptor => Ok(()),
        Some(_) => {
            if let Some(tiles) = descriptor.tiles() {
                match refresh_source_tiles(inner.renderer.as_ref(), &inner.source_id, tiles) {
                    Err(RendererError::Unsupported(_)) => {}
                    other => return other,
                }
            }
            // No live tile update available; re-register the source.
            inner.renderer.remove_source(&inner.source_id)?;
            inner.renderer.add_source(&inner.source_id, descriptor)
        }
    }
}
