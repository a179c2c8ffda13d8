//! Source-mode selection and queries of the feature service adapter.

mod common;

use arclink::renderer::SourceDescriptor;
use arclink::service::{FeatureService, FeatureServiceOptions, FeatureSourceMode};
use arclink::tasks::FeatureQuery;
use common::{StaticHttpClient, TestRenderer};

const FEATURE_URL: &str = "https://x/Roads/FeatureServer/2";

#[tokio::test]
async fn vector_tiles_are_used_when_the_probe_answers() {
    let renderer = TestRenderer::new();
    let http = StaticHttpClient::new(vec![(
        "https://x/Roads/VectorTileServer/tile/",
        "\u{1a}0",
    )]);

    let service = FeatureService::connect_with_http_client(
        "roads",
        renderer.clone(),
        FeatureServiceOptions::new(FEATURE_URL).without_service_attribution(),
        http.clone(),
    )
    .await
    .expect("adapter");

    assert_eq!(
        service.source_mode(),
        FeatureSourceMode::VectorTiles {
            tile_root: "https://x/Roads/VectorTileServer".to_string()
        }
    );
    match renderer.source("roads").expect("registered") {
        SourceDescriptor::Vector { tiles } => {
            assert_eq!(
                tiles,
                vec!["https://x/Roads/VectorTileServer/tile/{z}/{y}/{x}.pbf".to_string()]
            );
        }
        other => panic!("expected a vector source, got {other:?}"),
    }
}

#[tokio::test]
async fn geojson_fallback_when_the_probe_fails() {
    let renderer = TestRenderer::new();
    let http = StaticHttpClient::new(vec![]);

    let service = FeatureService::connect_with_http_client(
        "roads",
        renderer.clone(),
        FeatureServiceOptions::new(FEATURE_URL).without_service_attribution(),
        http.clone(),
    )
    .await
    .expect("adapter");

    assert_eq!(service.source_mode(), FeatureSourceMode::GeoJson);
    match renderer.source("roads").expect("registered") {
        SourceDescriptor::GeoJson { data } => {
            assert!(data.starts_with("https://x/Roads/FeatureServer/2/query?"));
            assert!(data.contains("f=geojson"));
        }
        other => panic!("expected a geojson source, got {other:?}"),
    }
}

#[tokio::test]
async fn where_mutation_regenerates_the_source_url() {
    let renderer = TestRenderer::new();
    let http = StaticHttpClient::new(vec![]);

    let service = FeatureService::connect_with_http_client(
        "roads",
        renderer.clone(),
        FeatureServiceOptions::new(FEATURE_URL)
            .without_vector_tiles()
            .without_service_attribution(),
        http.clone(),
    )
    .await
    .expect("adapter");

    service.set_where("LANES > 2").expect("mutator");
    service.update().expect("refresh");

    match renderer.source("roads").expect("registered") {
        SourceDescriptor::GeoJson { data } => {
            assert!(data.contains("where=LANES"));
        }
        other => panic!("expected a geojson source, got {other:?}"),
    }
}

#[tokio::test]
async fn query_features_parses_geojson() {
    let renderer = TestRenderer::new();
    let http = StaticHttpClient::new(vec![(
        "https://x/Roads/FeatureServer/2/query",
        r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-95.4, 29.7]},
                "properties": {"NAME": "Main St"}
            }]
        }"#,
    )]);

    let service = FeatureService::connect_with_http_client(
        "roads",
        renderer.clone(),
        FeatureServiceOptions::new(FEATURE_URL)
            .without_vector_tiles()
            .without_service_attribution(),
        http.clone(),
    )
    .await
    .expect("adapter");

    let collection = service
        .query_features(&FeatureQuery::new().with_where("NAME = 'Main St'"))
        .await
        .expect("query");
    assert_eq!(collection.features.len(), 1);

    let request = http.requests.lock().last().cloned().expect("request made");
    assert!(request.contains("where=NAME"));
    assert!(request.contains("f=geojson"));
    assert!(request.contains("returnGeometry=true"));
}
