use build_catalog::version;
use build_catalog::{
    Candidate, GameVersion, ProviderAdapter, ProviderError, ProviderType, VersionDescriptor,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://piston-meta.mojang.com";

/// Configuration for the vanilla server adapter.
#[derive(Debug, Clone)]
pub struct VanillaConfig {
    /// Manifest host; `None` uses the public endpoint.
    pub api_base_url: Option<String>,
    pub minimum_version: Option<GameVersion>,
    pub include_snapshots: bool,
}

impl Default for VanillaConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            minimum_version: crate::default_minimum(),
            include_snapshots: false,
        }
    }
}

/// Vanilla server jars, discovered through the launcher version manifest.
///
/// Listing reads one manifest of every published version; resolution reads
/// the per-version document that carries the server download.
pub struct VanillaProvider {
    config: VanillaConfig,
    client: reqwest::Client,
}

impl VanillaProvider {
    pub fn new(config: VanillaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_base(&self) -> &str {
        http::trim_base(self.config.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))
    }

    fn manifest_url(&self) -> String {
        format!("{}/mc/game/version_manifest_v2.json", self.api_base())
    }

    fn wants(&self, entry: &ManifestEntry) -> bool {
        let kind_ok = match entry.kind.as_str() {
            "release" => true,
            "snapshot" => self.config.include_snapshots,
            _ => false,
        };
        kind_ok && version::meets_minimum(&entry.id, self.config.minimum_version.as_ref())
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for VanillaProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Vanilla
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>, ProviderError> {
        let manifest: Manifest = http::get_json(&self.client, &self.manifest_url()).await?;
        let total = manifest.versions.len();

        let candidates: Vec<Candidate> = manifest
            .versions
            .into_iter()
            .filter(|entry| self.wants(entry))
            .map(|entry| Candidate {
                stable: entry.kind == "release",
                released_at: entry.release_time,
                version: entry.id,
                detail_url: entry.url,
            })
            .collect();

        debug!("vanilla manifest: {} of {} entries kept", candidates.len(), total);
        Ok(candidates)
    }

    async fn resolve_detail(
        &self,
        candidate: &Candidate,
    ) -> Result<VersionDescriptor, ProviderError> {
        let detail: VersionDetail = http::get_json(&self.client, &candidate.detail_url).await?;

        let server = detail
            .downloads
            .and_then(|d| d.server)
            .ok_or_else(|| {
                ProviderError::NotFound(format!("no server download for {}", candidate.version))
            })?;

        Ok(
            VersionDescriptor::resolved(ProviderType::Vanilla, &candidate.version, server.url)
                .with_stable(candidate.stable)
                .with_released_at(detail.release_time.or(candidate.released_at)),
        )
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    versions: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    url: String,
    #[serde(rename = "releaseTime")]
    release_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct VersionDetail {
    downloads: Option<Downloads>,
    #[serde(rename = "releaseTime")]
    release_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Downloads {
    server: Option<Artifact>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    url: String,
}
