//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arclink::attribution::Attribution;
use arclink::error::ArclinkError;
use arclink::http::HttpClient;
use arclink::renderer::{LayerSpec, Renderer, RendererError, SourceDescriptor};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;

/// In-memory renderer recording every call the adapters make.
#[derive(Default)]
pub struct TestRenderer {
    pub sources: Mutex<HashMap<String, SourceDescriptor>>,
    pub layers: Mutex<Vec<LayerSpec>>,
    pub attributions: Mutex<Vec<(String, String)>>,
    pub add_source_count: AtomicUsize,
    pub set_tiles_count: AtomicUsize,
    /// Whether the first tier of the tile refresh chain is available.
    pub supports_set_tiles: bool,
}

impl TestRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            supports_set_tiles: true,
            ..Default::default()
        })
    }

    pub fn without_set_tiles() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn source(&self, id: &str) -> Option<SourceDescriptor> {
        self.sources.lock().get(id).cloned()
    }
}

impl Renderer for TestRenderer {
    fn add_source(&self, id: &str, descriptor: &SourceDescriptor) -> Result<(), RendererError> {
        self.add_source_count.fetch_add(1, Ordering::SeqCst);
        self.sources.lock().insert(id.to_string(), descriptor.clone());
        Ok(())
    }

    fn get_source(&self, id: &str) -> Option<SourceDescriptor> {
        self.sources.lock().get(id).cloned()
    }

    fn remove_source(&self, id: &str) -> Result<(), RendererError> {
        self.sources
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RendererError::SourceNotFound(id.to_string()))
    }

    fn add_layer(&self, layer: &LayerSpec, _before_id: Option<&str>) -> Result<(), RendererError> {
        self.layers.lock().push(layer.clone());
        Ok(())
    }

    fn remove_layer(&self, id: &str) -> Result<(), RendererError> {
        let mut layers = self.layers.lock();
        let before = layers.len();
        layers.retain(|layer| layer.id != id);
        if layers.len() == before {
            return Err(RendererError::LayerNotFound(id.to_string()));
        }
        Ok(())
    }

    fn get_layer(&self, id: &str) -> Option<LayerSpec> {
        self.layers.lock().iter().find(|layer| layer.id == id).cloned()
    }

    fn set_paint_property(
        &self,
        _layer_id: &str,
        _property: &str,
        _value: Value,
    ) -> Result<(), RendererError> {
        Ok(())
    }

    fn set_attribution(&self, source_id: &str, attribution: &Attribution) {
        self.attributions
            .lock()
            .push((source_id.to_string(), attribution.text().to_string()));
    }

    fn set_tiles(&self, source_id: &str, tiles: &[String]) -> Result<(), RendererError> {
        if !self.supports_set_tiles {
            return Err(RendererError::Unsupported("set_tiles"));
        }
        self.set_tiles_count.fetch_add(1, Ordering::SeqCst);
        let mut sources = self.sources.lock();
        match sources.get_mut(source_id) {
            Some(SourceDescriptor::Raster { tiles: current, .. })
            | Some(SourceDescriptor::Vector { tiles: current }) => {
                *current = tiles.to_vec();
                Ok(())
            }
            Some(_) => Err(RendererError::Backend("source is not tiled".into())),
            None => Err(RendererError::SourceNotFound(source_id.to_string())),
        }
    }
}

/// HTTP stub serving canned bodies by URL prefix, recording every request.
#[derive(Default)]
pub struct StaticHttpClient {
    routes: Vec<(String, String)>,
    pub requests: Mutex<Vec<String>>,
}

impl StaticHttpClient {
    pub fn new(routes: Vec<(&str, &str)>) -> Arc<Self> {
        Arc::new(Self {
            routes: routes
                .into_iter()
                .map(|(prefix, body)| (prefix.to_string(), body.to_string()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl HttpClient for StaticHttpClient {
    async fn get(&self, url: &str) -> Result<Bytes, ArclinkError> {
        self.requests.lock().push(url.to_string());
        // Small delay so concurrent callers genuinely overlap.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        self.routes
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, body)| Bytes::from(body.clone()))
            .ok_or(ArclinkError::Io)
    }
}
