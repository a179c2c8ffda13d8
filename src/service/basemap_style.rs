//! ArcGIS vector basemap styles.
//!
//! Basemap styles are complete renderer style documents served by the
//! basemap styles API, not sources, so this adapter does not register
//! anything: it resolves style names (including the legacy colon-separated
//! spelling) to URLs and fetches the style JSON for the host application to
//! apply.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use serde_json::Value;

use crate::error::ArclinkError;
use crate::http::{fetch_json, HttpClient, ReqwestHttpClient};

const BASEMAP_STYLES_ROOT: &str =
    "https://basemaps-api.arcgis.com/arcgis/rest/services/styles";

lazy_static! {
    /// Legacy colon-separated style names and their current path form.
    static ref LEGACY_STYLE_PATHS: HashMap<&'static str, &'static str> = {
        let mut paths = HashMap::new();
        paths.insert("ArcGIS:Streets", "arcgis/streets");
        paths.insert("ArcGIS:StreetsNight", "arcgis/streets-night");
        paths.insert("ArcGIS:StreetsRelief", "arcgis/streets-relief");
        paths.insert("ArcGIS:Navigation", "arcgis/navigation");
        paths.insert("ArcGIS:NavigationNight", "arcgis/navigation-night");
        paths.insert("ArcGIS:Topographic", "arcgis/topographic");
        paths.insert("ArcGIS:Terrain", "arcgis/terrain");
        paths.insert("ArcGIS:Oceans", "arcgis/oceans");
        paths.insert("ArcGIS:LightGray", "arcgis/light-gray");
        paths.insert("ArcGIS:DarkGray", "arcgis/dark-gray");
        paths.insert("ArcGIS:Imagery", "arcgis/imagery");
        paths.insert("ArcGIS:ImageryStandard", "arcgis/imagery/standard");
        paths.insert("ArcGIS:ImageryLabels", "arcgis/imagery/labels");
        paths.insert("ArcGIS:ChartedTerritory", "arcgis/charted-territory");
        paths.insert("ArcGIS:Community", "arcgis/community");
        paths.insert("ArcGIS:Midcentury", "arcgis/midcentury");
        paths.insert("ArcGIS:Newspaper", "arcgis/newspaper");
        paths.insert("ArcGIS:Nova", "arcgis/nova");
        paths.insert("ArcGIS:ModernAntique", "arcgis/modern-antique");
        paths.insert("OSM:Standard", "osm/standard");
        paths.insert("OSM:StandardRelief", "osm/standard-relief");
        paths.insert("OSM:Streets", "osm/streets");
        paths.insert("OSM:StreetsRelief", "osm/streets-relief");
        paths.insert("OSM:LightGray", "osm/light-gray");
        paths.insert("OSM:DarkGray", "osm/dark-gray");
        paths
    };
}

/// Resolves a style name to its path below the basemap styles root.
///
/// Current-form paths (`arcgis/streets`) pass through unchanged. Legacy
/// colon-separated names resolve through the registry; unknown colon names
/// fall back to the mechanical colon-to-slash, lowercase transform.
pub fn resolve_style_path(name: &str) -> String {
    if let Some(path) = LEGACY_STYLE_PATHS.get(name) {
        return (*path).to_string();
    }
    if name.contains(':') {
        return name.replace(':', "/").to_lowercase();
    }
    name.to_string()
}

/// A vector basemap style session.
pub struct VectorBasemapStyle {
    style_url: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for VectorBasemapStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorBasemapStyle")
            .field("style_url", &self.style_url)
            .finish_non_exhaustive()
    }
}

impl VectorBasemapStyle {
    /// Creates a session for the named style.
    pub fn new(style_name: &str, api_key: impl Into<String>) -> Result<Self, ArclinkError> {
        Self::with_http_client(style_name, api_key, Arc::new(ReqwestHttpClient::new()))
    }

    /// Same as [`VectorBasemapStyle::new`] with a custom HTTP client.
    pub fn with_http_client(
        style_name: &str,
        api_key: impl Into<String>,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ArclinkError> {
        let api_key = api_key.into();
        if style_name.trim().is_empty() {
            return Err(ArclinkError::Configuration("style name is required".into()));
        }
        if api_key.trim().is_empty() {
            return Err(ArclinkError::Configuration("API key is required".into()));
        }

        let path = resolve_style_path(style_name.trim());
        let style_url = format!("{BASEMAP_STYLES_ROOT}/{path}?type=style&token={api_key}");
        Ok(Self { style_url, http })
    }

    /// The URL of the style document.
    pub fn style_url(&self) -> &str {
        &self.style_url
    }

    /// Fetches the style document for the host application to apply.
    pub async fn fetch_style(&self) -> Result<Value, ArclinkError> {
        fetch_json(self.http.as_ref(), &self.style_url).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn legacy_names_resolve_through_the_registry() {
        assert_eq!(resolve_style_path("ArcGIS:Streets"), "arcgis/streets");
        assert_eq!(resolve_style_path("ArcGIS:DarkGray"), "arcgis/dark-gray");
        assert_eq!(resolve_style_path("OSM:Standard"), "osm/standard");
    }

    #[test]
    fn unknown_colon_names_fall_back_to_mechanical_mapping() {
        assert_eq!(resolve_style_path("ArcGIS:Outdoor"), "arcgis/outdoor");
    }

    #[test]
    fn current_form_paths_pass_through() {
        assert_eq!(resolve_style_path("arcgis/streets"), "arcgis/streets");
    }

    #[test]
    fn style_url_carries_type_and_token() {
        let style =
            VectorBasemapStyle::new("ArcGIS:Streets", "KEY123").expect("valid style");
        assert_eq!(
            style.style_url(),
            "https://basemaps-api.arcgis.com/arcgis/rest/services/styles/arcgis/streets?type=style&token=KEY123"
        );
    }

    #[test]
    fn blank_key_is_a_configuration_error() {
        assert_matches!(
            VectorBasemapStyle::new("ArcGIS:Streets", " "),
            Err(ArclinkError::Configuration(_))
        );
    }
}
