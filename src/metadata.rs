//! Service-level metadata and its once-per-adapter cache.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::ArclinkError;
use crate::geometry::EsriExtent;
use crate::http::{fetch_json, HttpClient};

/// Summary of one sublayer as listed in service metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerSummary {
    /// Sublayer id.
    pub id: u32,
    /// Sublayer name.
    pub name: String,
    /// Whether the sublayer is visible by default.
    pub default_visibility: bool,
    /// Id of the parent group layer, if any. `-1` on the wire means none.
    pub parent_layer_id: Option<i32>,
}

impl Default for LayerSummary {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            default_visibility: true,
            parent_layer_id: None,
        }
    }
}

/// One attribute field of a sublayer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    /// Field name.
    pub name: String,
    /// Field type, e.g. `esriFieldTypeString`.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Display alias of the field.
    #[serde(default)]
    pub alias: Option<String>,
}

/// Service-level metadata fetched from `{url}?f=json`.
///
/// Fetched at most once per adapter lifetime and immutable afterwards;
/// re-fetching requires a new adapter instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceMetadata {
    /// Server version.
    pub current_version: Option<f64>,
    /// Service name.
    pub name: Option<String>,
    /// Service description.
    pub description: Option<String>,
    /// Copyright string, the usual attribution source for map services.
    pub copyright_text: Option<String>,
    /// Attribution string used by vector tile services.
    pub attribution: Option<String>,
    /// Relative path to the default style of a vector tile service.
    pub default_styles: Option<String>,
    /// Sublayers of the service.
    pub layers: Vec<LayerSummary>,
    /// Full extent of the service data.
    pub full_extent: Option<EsriExtent>,
    /// Everything else the server reported.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ServiceMetadata {
    /// The attribution string to push to the renderer, if the service
    /// provides one.
    pub fn attribution_text(&self) -> Option<&str> {
        self.copyright_text
            .as_deref()
            .or(self.attribution.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}

/// Lazily fetched, memoized service metadata.
///
/// Concurrent callers before the first fetch resolves share the same
/// in-flight future; the service is never asked twice.
#[derive(Debug)]
pub(crate) struct MetadataCache {
    url: String,
    cell: OnceCell<Arc<ServiceMetadata>>,
}

impl MetadataCache {
    /// Creates a cache for the given service root URL.
    pub fn new(service_url: &str) -> Self {
        Self {
            url: format!("{service_url}?f=json"),
            cell: OnceCell::new(),
        }
    }

    /// Returns the metadata, fetching it on first use.
    pub async fn get_or_fetch(
        &self,
        http: &dyn HttpClient,
    ) -> Result<Arc<ServiceMetadata>, ArclinkError> {
        self.cell
            .get_or_try_init(|| async {
                let value = fetch_json(http, &self.url).await?;
                let metadata: ServiceMetadata = serde_json::from_value(value)?;
                Ok(Arc::new(metadata))
            })
            .await
            .cloned()
    }
}
