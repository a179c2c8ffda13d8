//! Adapter for ArcGIS Image services (`ImageServer` exportImage).

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::error::ArclinkError;
use crate::geometry::{Extent, ScreenSize};
use crate::http::HttpClient;
use crate::params::{time_param, EpochMs, ParamList, TimeExtent};
use crate::renderer::{Renderer, SourceDescriptor};
use crate::tasks::IdentifyParameters;

use super::{normalize_service_url, ServiceAdapter, ServiceStrategy, TaskKind};

/// Options of an [`ImageService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageServiceOptions {
    url: String,
    /// Export image format.
    pub format: String,
    /// Server-side raster function applied to the imagery.
    pub rendering_rule: Option<Value>,
    /// Mosaic rule selecting and ordering rasters.
    pub mosaic_rule: Option<Value>,
    /// Edge size of one exported tile in pixels.
    pub tile_size: u32,
    /// Time range for time-aware services.
    pub time: Option<TimeExtent>,
    /// Whether the service's copyright text is pushed to the renderer.
    pub attribution_from_service: bool,
}

impl ImageServiceOptions {
    /// Creates options for the given `ImageServer` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: "jpgpng".to_string(),
            rendering_rule: None,
            mosaic_rule: None,
            tile_size: 256,
            time: None,
            attribution_from_service: true,
        }
    }

    /// Sets the export image format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Sets the rendering rule.
    pub fn with_rendering_rule(mut self, rule: Value) -> Self {
        self.rendering_rule = Some(rule);
        self
    }

    /// Sets the mosaic rule.
    pub fn with_mosaic_rule(mut self, rule: Value) -> Self {
        self.mosaic_rule = Some(rule);
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

/// Descriptor derivation for image services.
#[derive(Debug)]
pub struct ImageStrategy {
    options: ImageServiceOptions,
}

impl ImageStrategy {
    /// Validates the options and creates the strategy.
    pub fn new(mut options: ImageServiceOptions) -> Result<Self, ArclinkError> {
        options.url = normalize_service_url(&options.url)?;
        Ok(Self { options })
    }

    pub(crate) fn options(&self) -> &ImageServiceOptions {
        &self.options
    }

    pub(crate) fn options_mut(&mut self) -> &mut ImageServiceOptions {
        &mut self.options
    }

    fn push_rules(&self, params: &mut ParamList) -> Result<(), ArclinkError> {
        if let Some(rule) = &self.options.rendering_rule {
            params.push_json("renderingRule", rule)?;
        }
        if let Some(rule) = &self.options.mosaic_rule {
            params.push_json("mosaicRule", rule)?;
        }
        params.push_opt("time", time_param(self.options.time.as_ref()));
        Ok(())
    }

    pub(crate) fn export_tile_url(&self) -> Result<String, ArclinkError> {
        let mut params = ParamList::new();
        params.push_raw("bbox", "{bbox-epsg-3857}");
        params.push("bboxSR", "3857");
        params.push("imageSR", "3857");
        params.push("format", self.options.format.clone());
        params.push("transparent", "true");
        params.push("size", format!("{0},{0}", self.options.tile_size));
        self.push_rules(&mut params)?;
        params.push("f", "image");
        Ok(params.append_to(&format!("{}/exportImage", self.options.url)))
    }
}

impl ServiceStrategy for ImageStrategy {
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
            TaskKind::Export => "exportImage",
            TaskKind::Identify => "identify",
            _ => return None,
        };
        Some(format!("{}/{endpoint}", self.options.url))
    }

    fn attribution_from_service(&self) -> bool {
        self.options.attribution_from_service
    }
}

/// Adapter for an image service.
pub type ImageService = ServiceAdapter<ImageStrategy>;

impl ImageService {
    /// Creates the adapter and registers its raster source.
    pub fn new(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        options: ImageServiceOptions,
    ) -> Result<Self, ArclinkError> {
        Self::from_strategy(source_id, renderer, ImageStrategy::new(options)?)
    }

    /// Same as [`ImageService::new`] with a custom HTTP client.
    pub fn with_http_client(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        options: ImageServiceOptions,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ArclinkError> {
        Self::from_parts(source_id, renderer, ImageStrategy::new(options)?, http)
    }

    /// Sets the rendering rule.
    pub fn set_rendering_rule(&self, rule: Option<Value>) -> Result<(), ArclinkError> {
        self.write_and_refresh(|strategy| strategy.options_mut().rendering_rule = rule)
    }

    /// Sets the mosaic rule.
    pub fn set_mosaic_rule(&self, rule: Option<Value>) -> Result<(), ArclinkError> {
        self.write_and_refresh(|strategy| strategy.options_mut().mosaic_rule = rule)
    }

    /// Sets the time range. No `time` parameter is emitted until `to` is
    /// also given.
    pub fn set_date(&self, from: EpochMs, to: Option<EpochMs>) -> Result<(), ArclinkError> {
        self.write_and_refresh(|strategy| {
            strategy.options_mut().time = Some(TimeExtent { from, to })
        })
    }

    /// Identifies pixel values around a point.
    pub async fn identify(
        &self,
        parameters: &IdentifyParameters,
    ) -> Result<Value, ArclinkError> {
        let mut params = parameters.to_params()?;
        self.read(|strategy| strategy.push_rules(&mut params))?;
        self.task_json(TaskKind::Identify, &params).await
    }

    /// Exports an image for the extent and returns the binary body.
    pub async fn export_image(
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
            strategy.push_rules(&mut params)
        })?;
        params.push("f", "image");
        self.task_bytes(TaskKind::Export, &params).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn export_image_url_carries_rules() {
        let strategy = ImageStrategy::new(
            ImageServiceOptions::new("https://x/ImageServer/")
                .with_rendering_rule(json!({"rasterFunction": "Hillshade"})),
        )
        .expect("valid options");

        let url = strategy.export_tile_url().expect("url");
        assert!(url.starts_with("https://x/ImageServer/exportImage?bbox={bbox-epsg-3857}&"));
        assert!(url.contains("renderingRule="));
        assert!(url.contains("Hillshade"));
        assert!(!url.contains("mosaicRule="));
        assert!(url.contains("f=image"));
    }

    #[test]
    fn image_service_has_no_find_endpoint() {
        let strategy = ImageStrategy::new(ImageServiceOptions::new("https://x/ImageServer"))
            .expect("valid options");
        assert_eq!(strategy.task_url(TaskKind::Find), None);
        assert_eq!(
            strategy.task_url(TaskKind::Identify).as_deref(),
            Some("https://x/ImageServer/identify")
        );
    }
}
