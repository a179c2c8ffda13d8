//! Adapter for ArcGIS Vector Tile services.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ArclinkError;
use crate::http::{fetch_json, HttpClient};
use crate::renderer::{Renderer, SourceDescriptor};

use super::{normalize_service_url, ServiceAdapter, ServiceStrategy, TaskKind};

/// Options of a [`VectorTileService`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorTileOptions {
    url: String,
    /// Whether the service's attribution is pushed to the renderer.
    pub attribution_from_service: bool,
}

impl VectorTileOptions {
    /// Creates options for the given `VectorTileServer` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attribution_from_service: true,
        }
    }

    /// Disables the attribution lookup.
    pub fn without_service_attribution(mut self) -> Self {
        self.attribution_from_service = false;
        self
    }
}

/// Descriptor derivation for vector tile services.
#[derive(Debug)]
pub struct VectorTileStrategy {
    options: VectorTileOptions,
}

impl VectorTileStrategy {
    /// Validates the options and creates the strategy.
    pub fn new(mut options: VectorTileOptions) -> Result<Self, ArclinkError> {
        options.url = normalize_service_url(&options.url)?;
        Ok(Self { options })
    }
}

impl ServiceStrategy for VectorTileStrategy {
    fn service_url(&self) -> &str {
        &self.options.url
    }

    fn source_descriptor(&self) -> Result<SourceDescriptor, ArclinkError> {
        Ok(SourceDescriptor::Vector {
            tiles: vec![format!("{}/tile/{{z}}/{{y}}/{{x}}.pbf", self.options.url)],
        })
    }

    fn task_url(&self, _task: TaskKind) -> Option<String> {
        None
    }

    fn attribution_from_service(&self) -> bool {
        self.options.attribution_from_service
    }
}

/// Adapter for a vector tile service.
pub type VectorTileService = ServiceAdapter<VectorTileStrategy>;

impl VectorTileService {
    /// Creates the adapter and registers its vector source.
    pub fn new(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        options: VectorTileOptions,
    ) -> Result<Self, ArclinkError> {
        Self::from_strategy(source_id, renderer, VectorTileStrategy::new(options)?)
    }

    /// Same as [`VectorTileService::new`] with a custom HTTP client.
    pub fn with_http_client(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        options: VectorTileOptions,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ArclinkError> {
        Self::from_parts(source_id, renderer, VectorTileStrategy::new(options)?, http)
    }

    /// URL of the service's default style root, resolved from metadata.
    pub async fn default_style_url(&self) -> Result<String, ArclinkError> {
        let metadata = self.get_metadata().await?;
        let style_path = metadata
            .default_styles
            .as_deref()
            .ok_or(ArclinkError::NotFound)?;
        let style_path = style_path.trim_matches('/');
        Ok(format!(
            "{}/{style_path}/root.json",
            self.read(|strategy| strategy.service_url().to_string())
        ))
    }

    /// Fetches the service's default style document.
    pub async fn default_style(&self) -> Result<Value, ArclinkError> {
        let url = self.default_style_url().await?;
        fetch_json(self.http().as_ref(), &url).await
    }
}
