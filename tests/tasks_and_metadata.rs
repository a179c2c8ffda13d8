//! One-shot task requests, metadata memoization and error surfacing.

mod common;

use arclink::error::ArclinkError;
use arclink::service::{DynamicMapOptions, DynamicMapService};
use arclink::{Extent, IdentifyParameters, LngLat, ScreenSize};
use assert_matches::assert_matches;
use common::{StaticHttpClient, TestRenderer};

fn identify_params() -> IdentifyParameters {
    IdentifyParameters::new(
        LngLat::new(-95.4, 29.7),
        Extent::new(-96.0, 29.0, -95.0, 30.0),
        ScreenSize::new(800, 600),
    )
}

#[tokio::test]
async fn identify_uses_the_visible_prefix_and_fixed_dpi() {
    let renderer = TestRenderer::new();
    let http = StaticHttpClient::new(vec![("https://x/MapServer/identify", r#"{"results": []}"#)]);
    let service = DynamicMapService::with_http_client(
        "census",
        renderer,
        DynamicMapOptions::new("https://x/MapServer")
            .with_layers(vec![0, 2])
            .without_service_attribution(),
        http.clone(),
    )
    .expect("adapter");

    let response = service.identify(&identify_params()).await.expect("identify");
    assert_eq!(response["results"], serde_json::json!([]));

    let request = http.requests.lock().last().cloned().expect("request made");
    assert!(request.starts_with("https://x/MapServer/identify?"));
    // The identify endpoint takes `visible:`, unlike the `show:` prefix of
    // export URLs.
    assert!(request.contains("layers=visible%3A0%2C2"));
    assert!(request.contains("imageDisplay=800%2C600%2C96"));
    assert!(request.contains("sr=4326"));
    assert!(request.contains("f=json"));
}

#[tokio::test]
async fn server_error_envelope_becomes_a_server_error() {
    let renderer = TestRenderer::new();
    let http = StaticHttpClient::new(vec![(
        "https://x/MapServer/identify",
        r#"{"error": {"code": 498, "message": "Invalid token"}}"#,
    )]);
    let service = DynamicMapService::with_http_client(
        "census",
        renderer,
        DynamicMapOptions::new("https://x/MapServer").without_service_attribution(),
        http,
    )
    .expect("adapter");

    let result = service.identify(&identify_params()).await;
    assert_matches!(result, Err(ArclinkError::Server(message)) if message == "Invalid token");
}

#[tokio::test]
async fn transport_failure_propagates_from_task_calls() {
    let renderer = TestRenderer::new();
    let http = StaticHttpClient::new(vec![]);
    let service = DynamicMapService::with_http_client(
        "census",
        renderer,
        DynamicMapOptions::new("https://x/MapServer").without_service_attribution(),
        http,
    )
    .expect("adapter");

    assert_matches!(
        service.identify(&identify_params()).await,
        Err(ArclinkError::Io)
    );
}

#[tokio::test]
async fn concurrent_metadata_calls_share_one_request() {
    let renderer = TestRenderer::new();
    let http = StaticHttpClient::new(vec![(
        "https://x/MapServer?f=json",
        r#"{"copyrightText": "Esri", "layers": [{"id": 0, "name": "Sites"}]}"#,
    )]);
    let service = DynamicMapService::with_http_client(
        "census",
        renderer,
        DynamicMapOptions::new("https://x/MapServer").without_service_attribution(),
        http.clone(),
    )
    .expect("adapter");

    let (first, second, third) = tokio::join!(
        service.get_metadata(),
        service.get_metadata(),
        service.get_metadata()
    );
    let first = first.expect("metadata");
    assert_eq!(first.copyright_text.as_deref(), Some("Esri"));
    assert_eq!(second.expect("metadata").layers.len(), 1);
    assert_eq!(third.expect("metadata").layers[0].name, "Sites");

    assert_eq!(http.request_count("https://x/MapServer?f=json"), 1);

    // Later calls keep hitting the cache.
    service.get_metadata().await.expect("metadata");
    assert_eq!(http.request_count("https://x/MapServer?f=json"), 1);
}

#[tokio::test]
async fn legend_and_layer_discovery_hit_their_endpoints() {
    let renderer = TestRenderer::new();
    let http = StaticHttpClient::new(vec![
        (
            "https://x/MapServer/legend",
            r#"{"layers": [{"layerId": 0, "legend": []}]}"#,
        ),
        (
            "https://x/MapServer/layers",
            r#"{"layers": [{"id": 0, "name": "Sites"}, {"id": 1, "name": "Zones"}]}"#,
        ),
        (
            "https://x/MapServer/1?f=json",
            r#"{
                "id": 1,
                "name": "Zones",
                "fields": [{"name": "OBJECTID", "type": "esriFieldTypeOID"}],
                "extent": {"xmin": -1.0, "ymin": -2.0, "xmax": 3.0, "ymax": 4.0}
            }"#,
        ),
    ]);
    let service = DynamicMapService::with_http_client(
        "census",
        renderer,
        DynamicMapOptions::new("https://x/MapServer").without_service_attribution(),
        http,
    )
    .expect("adapter");

    let legend = service.generate_legend().await.expect("legend");
    assert_eq!(legend["layers"][0]["layerId"], 0);

    let layers = service.discover_layers().await.expect("layers");
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[1].name, "Zones");

    let fields = service.get_layer_fields(1).await.expect("fields");
    assert_eq!(fields[0].name, "OBJECTID");
    assert_eq!(fields[0].field_type, "esriFieldTypeOID");

    let extent = service.get_layer_extent(1).await.expect("extent");
    assert_eq!(extent.xmax, 3.0);
}
