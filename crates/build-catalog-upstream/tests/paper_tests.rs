use build_catalog::{Candidate, ProviderAdapter, ProviderError, ProviderType};
use build_catalog_upstream::{PaperConfig, PaperProvider};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> PaperProvider {
    PaperProvider::new(PaperConfig {
        api_base_url: Some(server.uri()),
        ..PaperConfig::default()
    })
}

async fn mount(server: &MockServer, route: &str, fixture: &'static str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(fixture, "application/json"))
        .mount(server)
        .await;
}

fn candidate(server: &MockServer, version: &str) -> Candidate {
    Candidate::new(
        version,
        format!("{}/v2/projects/paper/versions/{version}/builds", server.uri()),
    )
}

#[tokio::test]
async fn list_filters_versions_below_minimum() {
    let server = MockServer::start().await;
    mount(&server, "/v2/projects/paper", include_str!("fixtures/paper_project.json")).await;

    let candidates = provider_for(&server).list_candidates().await.unwrap();

    let versions: Vec<&str> = candidates.iter().map(|c| c.version.as_str()).collect();
    assert_eq!(versions, vec!["1.20.6", "1.21.3", "1.21.4"]);
    assert_eq!(candidates[2].detail_url, candidate(&server, "1.21.4").detail_url);
}

#[tokio::test]
async fn resolve_picks_newest_stable_build() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/v2/projects/paper/versions/1.21.4/builds",
        include_str!("fixtures/paper_builds_1.21.4.json"),
    )
    .await;

    let descriptor = provider_for(&server)
        .resolve_detail(&candidate(&server, "1.21.4"))
        .await
        .unwrap();

    assert_eq!(descriptor.provider_type, ProviderType::Paper);
    assert_eq!(descriptor.build_number, Some(232));
    assert!(descriptor.stable);
    assert_eq!(
        descriptor.download_url,
        format!(
            "{}/v2/projects/paper/versions/1.21.4/builds/232/downloads/paper-1.21.4-232.jar",
            server.uri()
        )
    );
    assert!(descriptor.released_at.is_some());
}

#[tokio::test]
async fn resolve_falls_back_to_experimental() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/v2/projects/paper/versions/1.21.3/builds",
        include_str!("fixtures/paper_builds_experimental.json"),
    )
    .await;

    let descriptor = provider_for(&server)
        .resolve_detail(&candidate(&server, "1.21.3"))
        .await
        .unwrap();

    assert_eq!(descriptor.build_number, Some(4));
    assert!(!descriptor.stable);
}

#[tokio::test]
async fn resolve_with_no_builds_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/projects/paper/versions/1.20.6/builds"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"version":"1.20.6","builds":[]}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let result = provider_for(&server)
        .resolve_detail(&candidate(&server, "1.20.6"))
        .await;

    assert!(matches!(result, Err(ProviderError::NotFound(_))));
}

#[tokio::test]
async fn missing_version_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/projects/paper/versions/9.9.9/builds"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = provider_for(&server)
        .resolve_detail(&candidate(&server, "9.9.9"))
        .await;

    assert!(matches!(result, Err(ProviderError::NotFound(url)) if url.contains("9.9.9")));
}
