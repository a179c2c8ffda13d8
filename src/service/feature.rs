//! Adapter for ArcGIS Feature services.
//!
//! Feature layers can reach the renderer two ways: as vector tiles, when the
//! service has a sibling `VectorTileServer`, or as a GeoJSON source fed by a
//! `query` URL. The choice is probed once at construction and never
//! re-evaluated; mutations only regenerate the query URL.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ArclinkError;
use crate::geometry::Geometry;
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::params::ParamList;
use crate::renderer::{Renderer, SourceDescriptor};
use crate::tasks::{FeatureQuery, StatisticDefinition};

use super::{normalize_service_url, ServiceAdapter, ServiceStrategy, TaskKind};

/// Options of a [`FeatureService`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureServiceOptions {
    url: String,
    /// Feature filter applied to the source and to queries.
    pub where_clause: String,
    /// Fields returned by the source and by queries. Unset returns all.
    pub out_fields: Option<Vec<String>>,
    /// Spatial filter applied to the source.
    pub geometry: Option<Geometry>,
    /// Whether to prefer a sibling vector tile service over GeoJSON.
    pub use_vector_tiles: bool,
    /// Whether the service's copyright text is pushed to the renderer.
    pub attribution_from_service: bool,
}

impl FeatureServiceOptions {
    /// Creates options for the given `FeatureServer` layer URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            where_clause: "1=1".to_string(),
            out_fields: None,
            geometry: None,
            use_vector_tiles: true,
            attribution_from_service: true,
        }
    }

    /// Sets the feature filter.
    pub fn with_where(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = where_clause.into();
        self
    }

    /// Sets the returned fields.
    pub fn with_out_fields(mut self, fields: Vec<String>) -> Self {
        self.out_fields = Some(fields);
        self
    }

    /// Sets a spatial filter.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Forces the GeoJSON source without probing for vector tiles.
    pub fn without_vector_tiles(mut self) -> Self {
        self.use_vector_tiles = false;
        self
    }

    /// Disables the attribution lookup.
    pub fn without_service_attribution(mut self) -> Self {
        self.attribution_from_service = false;
        self
    }
}

/// How the feature data reaches the renderer. Decided once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureSourceMode {
    /// Vector tiles from the sibling `VectorTileServer`.
    VectorTiles {
        /// Root URL of the vector tile service.
        tile_root: String,
    },
    /// A GeoJSON source backed by the `query` endpoint.
    GeoJson,
}

/// Descriptor derivation for feature services.
#[derive(Debug)]
pub struct FeatureStrategy {
    options: FeatureServiceOptions,
    mode: FeatureSourceMode,
}

impl FeatureStrategy {
    /// Validates the options and creates the strategy with the given source
    /// mode.
    pub fn new(
        mut options: FeatureServiceOptions,
        mode: FeatureSourceMode,
    ) -> Result<Self, ArclinkError> {
        options.url = normalize_service_url(&options.url)?;
        Ok(Self { options, mode })
    }

    pub(crate) fn options(&self) -> &FeatureServiceOptions {
        &self.options
    }

    pub(crate) fn options_mut(&mut self) -> &mut FeatureServiceOptions {
        &mut self.options
    }

    /// The source mode decided at construction.
    pub fn mode(&self) -> &FeatureSourceMode {
        &self.mode
    }

    fn out_fields_value(&self, query_fields: Option<&Vec<String>>) -> String {
        query_fields
            .or(self.options.out_fields.as_ref())
            .map(|fields| fields.join(","))
            .unwrap_or_else(|| "*".to_string())
    }

    /// Appends the geometry-dependent parameters. They are emitted only when
    /// a geometry is present; nothing is defaulted otherwise.
    fn push_geometry(
        params: &mut ParamList,
        geometry: Option<&Geometry>,
    ) -> Result<(), ArclinkError> {
        if let Some(geometry) = geometry {
            params.push_json("geometry", &geometry.to_esri_json())?;
            params.push("geometryType", geometry.esri_type());
            params.push("spatialRel", "esriSpatialRelIntersects");
            params.push("inSR", "4326");
        }
        Ok(())
    }

    /// The `query` URL feeding the GeoJSON source.
    pub(crate) fn geojson_source_url(&self) -> Result<String, ArclinkError> {
        let mut params = ParamList::new();
        params.push("where", self.options.where_clause.clone());
        params.push("outFields", self.out_fields_value(None));
        params.push("returnGeometry", "true");
        Self::push_geometry(&mut params, self.options.geometry.as_ref())?;
        params.push("f", "geojson");
        Ok(params.append_to(&format!("{}/query", self.options.url)))
    }
}

impl ServiceStrategy for FeatureStrategy {
    fn service_url(&self) -> &str {
        &self.options.url
    }

    fn source_descriptor(&self) -> Result<SourceDescriptor, ArclinkError> {
        match &self.mode {
            FeatureSourceMode::VectorTiles { tile_root } => Ok(SourceDescriptor::Vector {
                tiles: vec![format!("{tile_root}/tile/{{z}}/{{y}}/{{x}}.pbf")],
            }),
            FeatureSourceMode::GeoJson => Ok(SourceDescriptor::GeoJson {
                data: self.geojson_source_url()?,
            }),
        }
    }

    fn task_url(&self, task: TaskKind) -> Option<String> {
        match task {
            TaskKind::Query => Some(format!("{}/query", self.options.url)),
            _ => None,
        }
    }

    fn attribution_from_service(&self) -> bool {
        self.options.attribution_from_service
    }
}

/// Derives the sibling vector tile service root from a feature layer URL.
///
/// `https://x/Roads/FeatureServer/2` becomes `https://x/Roads/VectorTileServer`.
/// Returns `None` when the URL has no `FeatureServer` segment to rewrite.
fn vector_tile_root(url: &str) -> Option<String> {
    let base = url.trim_end_matches(|c: char| c.is_ascii_digit());
    let base = base.trim_end_matches('/');
    if base.ends_with("VectorTileServer") {
        Some(base.to_string())
    } else if base.ends_with("FeatureServer") {
        Some(format!(
            "{}VectorTileServer",
            base.strip_suffix("FeatureServer").expect("checked suffix")
        ))
    } else {
        None
    }
}

/// Adapter for a feature service.
pub type FeatureService = ServiceAdapter<FeatureStrategy>;

impl FeatureService {
    /// Probes the service and creates the adapter.
    ///
    /// With `use_vector_tiles` enabled the sibling `VectorTileServer` is
    /// probed with one tile request; if it answers, a vector source is
    /// registered, otherwise the adapter falls back to a GeoJSON source over
    /// the `query` endpoint. The decision is not re-evaluated on mutation.
    pub async fn connect(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        options: FeatureServiceOptions,
    ) -> Result<Self, ArclinkError> {
        Self::connect_with_http_client(source_id, renderer, options, Arc::new(ReqwestHttpClient::new()))
            .await
    }

    /// Same as [`FeatureService::connect`] with a custom HTTP client.
    pub async fn connect_with_http_client(
        source_id: impl Into<String>,
        renderer: Arc<dyn Renderer>,
        options: FeatureServiceOptions,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ArclinkError> {
        let url = normalize_service_url(&options.url)?;
        let mode = if options.use_vector_tiles {
            match vector_tile_root(&url) {
                Some(tile_root) => {
                    let probe = format!("{tile_root}/tile/0/0/0.pbf");
                    match http.get(&probe).await {
                        Ok(_) => FeatureSourceMode::VectorTiles { tile_root },
                        Err(error) => {
                            log::info!(
                                "vector tile probe for '{url}' failed ({error}), using GeoJSON"
                            );
                            FeatureSourceMode::GeoJson
                        }
                    }
                }
                None => FeatureSourceMode::GeoJson,
            }
        } else {
            FeatureSourceMode::GeoJson
        };

        Self::from_parts(source_id, renderer, FeatureStrategy::new(options, mode)?, http)
    }

    /// The source mode decided at construction.
    pub fn source_mode(&self) -> FeatureSourceMode {
        self.read(|strategy| strategy.mode().clone())
    }

    /// Sets the feature filter.
    pub fn set_where(&self, where_clause: impl Into<String>) -> Result<(), ArclinkError> {
        let where_clause = where_clause.into();
        self.write_and_refresh(|strategy| strategy.options_mut().where_clause = where_clause)
    }

    /// Sets the returned fields.
    pub fn set_out_fields(&self, fields: Option<Vec<String>>) -> Result<(), ArclinkError> {
        self.write_and_refresh(|strategy| strategy.options_mut().out_fields = fields)
    }

    /// Sets a spatial filter on the source.
    pub fn set_geometry(&self, geometry: Geometry) -> Result<(), ArclinkError> {
        self.write_and_refresh(|strategy| strategy.options_mut().geometry = Some(geometry))
    }

    /// Clears the spatial filter.
    pub fn clear_geometry(&self) -> Result<(), ArclinkError> {
        self.write_and_refresh(|strategy| strategy.options_mut().geometry = None)
    }

    /// Queries features and parses the response as GeoJSON.
    ///
    /// Query fields left unset fall back to the adapter's options.
    pub async fn query_features(
        &self,
        query: &FeatureQuery,
    ) -> Result<geojson::FeatureCollection, ArclinkError> {
        let params = self.read(|strategy| -> Result<ParamList, ArclinkError> {
            let mut params = ParamList::new();
            params.push(
                "where",
                query
                    .where_clause
                    .clone()
                    .unwrap_or_else(|| strategy.options().where_clause.clone()),
            );
            params.push("outFields", strategy.out_fields_value(query.out_fields.as_ref()));
            params.push("returnGeometry", query.return_geometry.to_string());
            FeatureStrategy::push_geometry(&mut params, query.geometry.as_ref())?;
            if let Some(order_by) = &query.order_by {
                params.push("orderByFields", order_by.clone());
            }
            if let Some(count) = query.result_record_count {
                params.push("resultRecordCount", count.to_string());
            }
            params.push("f", "geojson");
            Ok(params)
        })?;

        let value = self.task_json(TaskKind::Query, &params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Computes server-side statistics over the filtered features.
    pub async fn get_layer_statistics(
        &self,
        statistics: &[StatisticDefinition],
    ) -> Result<Value, ArclinkError> {
        let params = self.read(|strategy| -> Result<ParamList, ArclinkError> {
            let mut params = ParamList::new();
            params.push("where", strategy.options().where_clause.clone());
            params.push_json("outStatistics", &statistics)?;
            params.push("f", "json");
            Ok(params)
        })?;
        self.task_json(TaskKind::Query, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geojson_strategy(options: FeatureServiceOptions) -> FeatureStrategy {
        FeatureStrategy::new(options, FeatureSourceMode::GeoJson).expect("valid options")
    }

    #[test]
    fn vector_tile_root_rewrites_feature_server_urls() {
        assert_eq!(
            vector_tile_root("https://x/Roads/FeatureServer/2").as_deref(),
            Some("https://x/Roads/VectorTileServer")
        );
        assert_eq!(
            vector_tile_root("https://x/Roads/VectorTileServer").as_deref(),
            Some("https://x/Roads/VectorTileServer")
        );
        assert_eq!(vector_tile_root("https://x/Roads/MapServer/0"), None);
    }

    #[test]
    fn geojson_source_url_defaults() {
        let strategy = geojson_strategy(FeatureServiceOptions::new("https://x/FeatureServer/0"));
        let url = strategy.geojson_source_url().expect("url");
        assert!(url.starts_with("https://x/FeatureServer/0/query?"));
        assert!(url.contains("where=1%3D1"));
        assert!(url.contains("outFields=%2A") || url.contains("outFields=*"));
        assert!(url.contains("f=geojson"));
        // No geometry configured, so none of the dependent parameters appear.
        assert!(!url.contains("geometryType="));
        assert!(!url.contains("spatialRel="));
        assert!(!url.contains("inSR="));
    }

    #[test]
    fn geometry_dependent_params_appear_together() {
        let strategy = geojson_strategy(
            FeatureServiceOptions::new("https://x/FeatureServer/0").with_geometry(
                Geometry::Extent(crate::geometry::Extent::new(-96.0, 29.0, -95.0, 30.0)),
            ),
        );
        let url = strategy.geojson_source_url().expect("url");
        assert!(url.contains("geometry="));
        assert!(url.contains("geometryType=esriGeometryEnvelope"));
        assert!(url.contains("spatialRel=esriSpatialRelIntersects"));
        assert!(url.contains("inSR=4326"));
    }

    #[test]
    fn out_fields_join_as_csv() {
        let strategy = geojson_strategy(
            FeatureServiceOptions::new("https://x/FeatureServer/0")
                .with_out_fields(vec!["NAME".into(), "POP".into()]),
        );
        let url = strategy.geojson_source_url().expect("url");
        assert!(url.contains("outFields=NAME%2CPOP"));
    }
}
