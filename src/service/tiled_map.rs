//! Adapter for cached (tiled) ArcGIS Map services.
//!
//! Cached services serve pre-rendered tiles from `{url}/tile/{z}/{y}/{x}`, so
//! there is no option state to re-synthesize; the adapter only carries the
//! shared lifecycle and metadata behavior.

use std::sync::Arc;

use crate::error::ArclinkError;
use crate::http::HttpClient;
use crate::renderer::{Renderer, SourceDescriptor};

use super::{normalize_service_url, ServiceAdapter, ServiceStrategy, TaskKind};

/// Options of a [`TiledMapService`].
#[derive(Debug, Clone, PartialEq)]
pub struct TiledMapOptions {
    url: String,
    /// Edge size of one tile in pixels.
    pub tile_size: u32,
    /// Whether the service's copyright text is pushed to the renderer.
    pub attribution_from_service: bool,
}

impl TiledMapOptions {
    /// Creates options for the given cached `MapServer` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tile_size: 256,
            attribution_from_service: true,
        }
    }

    /// Sets the tile size.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Disables the attribution lookup.
    pub fn without_service_attribution(mut self) -> Self {
        self.attribution_from_service = false;
        self
    }
}

/// Descriptor derivation for cached map services.
#[derive(Debug)]
pub struct TiledMapStrategy {
    options: TiledMapOptions,
}

impl TiledMapStrategy {
    /// Validates the options and creates the strategy.
    pub fn new(mut options: TiledMapOptions) -> Result<Self, ArclinkError> {
        options.url = normalize_service_url(&options.url)?;
        Ok(Self { options })
    }
}

impl ServiceStrategy for TiledMapStrategy {
    fn service_url(&self) -> &str {
        &self.options.url
    }

    fn source_descriptor(&self) -> Result<SourceDescriptor, ArclinkError> {
        Ok(SourceDescriptor::Raster {
            tiles: vec![format!("{}/tile/{{z}}/{{y}}/{{x}}", self.options.url)],
            tile_size: self.options.tile_size,
        })
    }

    fn task_url(&self, task: TaskKind) -> Option<String> {
        let endpoint = match task {
            TaskKind::Identify => "identify",
            TaskKind::Legend => "legend",
            TaskKind::Layers => "layers",
            _ => return None,
        };
        Some(format!("{}/{endpoint}", self.options.url))
    }

    fn attribution_from_service(&self) -> bool {
        self.options.attribution_from_service
    }
}

/// Adapter for a cached map service.
pub type TiledMapService = ServiceAdapter<TiledMapStrategy>;

impl TiledMapService {
    /// Creates the adapter and registers its raster source.
    pub fn new(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        options: TiledMapOptions,
    ) -> Result<Self, ArclinkError> {
        Self::from_strategy(source_id, renderer, TiledMapStrategy::new(options)?)
    }

    /// Same as [`TiledMapService::new`] with a custom HTTP client.
    pub fn with_http_client(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        options: TiledMapOptions,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ArclinkError> {
        Self::from_parts(source_id, renderer, TiledMapStrategy::new(options)?, http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_url_uses_zyx_order() {
        let strategy = TiledMapStrategy::new(TiledMapOptions::new("https://x/MapServer/"))
            .expect("valid options");
        let descriptor = strategy.source_descriptor().expect("descriptor");
        assert_eq!(
            descriptor.tiles(),
            Some(&["https://x/MapServer/tile/{z}/{y}/{x}".to_string()][..])
        );
    }
}
