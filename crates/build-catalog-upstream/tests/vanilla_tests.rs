use build_catalog::{GameVersion, ProviderAdapter, ProviderError, ProviderType};
use build_catalog_upstream::{VanillaConfig, VanillaProvider};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> VanillaProvider {
    VanillaProvider::new(VanillaConfig {
        api_base_url: Some(server.uri()),
        ..VanillaConfig::default()
    })
}

async fn mount_manifest(server: &MockServer) {
    let fixture = include_str!("fixtures/vanilla_manifest.json").replace("{base}", &server.uri());

    Mock::given(method("GET"))
        .and(path("/mc/game/version_manifest_v2.json"))
        .and(header_exists("User-Agent"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(fixture, "application/json"))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, route: &str, fixture: &'static str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(fixture, "application/json"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn list_keeps_releases_at_or_above_minimum() {
    let server = MockServer::start().await;
    mount_manifest(&server).await;

    let candidates = provider_for(&server).list_candidates().await.unwrap();

    let versions: Vec<&str> = candidates.iter().map(|c| c.version.as_str()).collect();
    assert_eq!(versions, vec!["1.21.6", "1.21.5"]);
    assert!(candidates.iter().all(|c| c.stable));
    assert_eq!(
        candidates[0].detail_url,
        format!("{}/v1/packages/b2/1.21.6.json", server.uri())
    );
    assert!(candidates[0].released_at.is_some());
}

#[tokio::test]
async fn list_includes_snapshots_when_unbounded() {
    let server = MockServer::start().await;
    mount_manifest(&server).await;

    let provider = VanillaProvider::new(VanillaConfig {
        api_base_url: Some(server.uri()),
        minimum_version: None,
        include_snapshots: true,
    });
    let candidates = provider.list_candidates().await.unwrap();

    let snapshot = candidates.iter().find(|c| c.version == "25w21a").unwrap();
    assert!(!snapshot.stable);
    assert_eq!(candidates.len(), 4);
}

#[tokio::test]
async fn list_honors_a_raised_minimum() {
    let server = MockServer::start().await;
    mount_manifest(&server).await;

    let provider = VanillaProvider::new(VanillaConfig {
        api_base_url: Some(server.uri()),
        minimum_version: GameVersion::parse("1.21.6"),
        include_snapshots: false,
    });
    let candidates = provider.list_candidates().await.unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].version, "1.21.6");
}

#[tokio::test]
async fn resolve_reads_server_download() {
    let server = MockServer::start().await;
    mount_manifest(&server).await;
    mount_detail(
        &server,
        "/v1/packages/b2/1.21.6.json",
        include_str!("fixtures/vanilla_1.21.6.json"),
    )
    .await;

    let provider = provider_for(&server);
    let candidates = provider.list_candidates().await.unwrap();
    let descriptor = provider.resolve_detail(&candidates[0]).await.unwrap();

    assert_eq!(descriptor.provider_type, ProviderType::Vanilla);
    assert_eq!(descriptor.version, "1.21.6");
    assert!(descriptor.download_url.ends_with("/server.jar"));
    assert!(descriptor.stable);
    assert_eq!(
        descriptor.released_at.map(|t| t.to_rfc3339()),
        Some("2025-06-17T10:03:21+00:00".to_owned())
    );
}

#[tokio::test]
async fn resolve_without_server_download_is_not_found() {
    let server = MockServer::start().await;
    mount_manifest(&server).await;
    mount_detail(
        &server,
        "/v1/packages/c3/1.21.5.json",
        include_str!("fixtures/vanilla_no_server.json"),
    )
    .await;

    let provider = provider_for(&server);
    let candidates = provider.list_candidates().await.unwrap();
    let result = provider.resolve_detail(&candidates[1]).await;

    assert!(matches!(result, Err(ProviderError::NotFound(msg)) if msg.contains("1.21.5")));
}

#[tokio::test]
async fn manifest_server_error_maps_to_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mc/game/version_manifest_v2.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = provider_for(&server).list_candidates().await;

    assert!(matches!(result, Err(ProviderError::Http { status: 503, .. })));
}

#[tokio::test]
async fn malformed_manifest_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mc/game/version_manifest_v2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{\"versions\": 7}", "application/json"))
        .mount(&server)
        .await;

    let result = provider_for(&server).list_candidates().await;

    assert!(matches!(result, Err(ProviderError::Parse(_))));
}
