use std::collections::BTreeMap;

use build_catalog::version;
use build_catalog::{
    Candidate, GameVersion, ProviderAdapter, ProviderError, ProviderType, VersionDescriptor,
};
use serde::Deserialize;
use tracing::debug;

use crate::http;

pub const DEFAULT_FILES_BASE_URL: &str = "https://files.minecraftforge.net";
pub const DEFAULT_MAVEN_BASE_URL: &str = "https://maven.minecraftforge.net";

const ARTIFACT_PATH: &str = "net/minecraftforge/forge";

/// Configuration for the Forge adapter.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Host serving `promotions_slim.json`.
    pub files_base_url: Option<String>,
    /// Maven repository holding the installer jars.
    pub maven_base_url: Option<String>,
    pub minimum_version: Option<GameVersion>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            files_base_url: None,
            maven_base_url: None,
            minimum_version: crate::default_minimum(),
        }
    }
}

/// Forge installers, one per game version.
///
/// Listing reads the promotions index; resolution confirms the promoted
/// installer exists in the maven repository with a HEAD request.
pub struct ForgeProvider {
    config: ForgeConfig,
    client: reqwest::Client,
}

impl ForgeProvider {
    pub fn new(config: ForgeConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn promotions_url(&self) -> String {
        let base = self
            .config
            .files_base_url
            .as_deref()
            .unwrap_or(DEFAULT_FILES_BASE_URL);
        format!("{}/{ARTIFACT_PATH}/promotions_slim.json", http::trim_base(base))
    }

    fn installer_url(&self, game_version: &str, forge_version: &str) -> String {
        let base = self
            .config
            .maven_base_url
            .as_deref()
            .unwrap_or(DEFAULT_MAVEN_BASE_URL);
        let coordinate = format!("{game_version}-{forge_version}");
        format!(
            "{}/{ARTIFACT_PATH}/{coordinate}/forge-{coordinate}-installer.jar",
            http::trim_base(base)
        )
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for ForgeProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Forge
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>, ProviderError> {
        let promotions: Promotions = http::get_json(&self.client, &self.promotions_url()).await?;
        let promoted = promoted_builds(&promotions.promos);

        let mut candidates: Vec<Candidate> = promoted
            .into_iter()
            .filter(|(mc, _)| version::meets_minimum(mc, self.config.minimum_version.as_ref()))
            .map(|(mc, promo)| {
                let mut candidate = Candidate::new(mc, self.installer_url(mc, promo.forge_version));
                candidate.stable = promo.recommended;
                candidate
            })
            .collect();
        candidates.sort_by(|a, b| version::newest_first(&a.version, &b.version));

        debug!(
            "forge promotions: {} game versions kept from {} entries",
            candidates.len(),
            promotions.promos.len()
        );
        Ok(candidates)
    }

    async fn resolve_detail(
        &self,
        candidate: &Candidate,
    ) -> Result<VersionDescriptor, ProviderError> {
        let response = http::head(&self.client, &candidate.detail_url).await?;

        Ok(VersionDescriptor::resolved(
            ProviderType::Forge,
            &candidate.version,
            &candidate.detail_url,
        )
        .with_stable(candidate.stable)
        .with_released_at(http::last_modified(&response)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Promoted<'a> {
    forge_version: &'a str,
    recommended: bool,
}

/// Collapse `<mc>-recommended` / `<mc>-latest` keys into one build per game
/// version, preferring the recommended promotion.
fn promoted_builds(promos: &BTreeMap<String, String>) -> BTreeMap<&str, Promoted<'_>> {
    let mut builds: BTreeMap<&str, Promoted<'_>> = BTreeMap::new();

    for (key, forge_version) in promos {
        let Some((mc, kind)) = key.rsplit_once('-') else {
            continue;
        };
        let recommended = match kind {
            "recommended" => true,
            "latest" => false,
            _ => continue,
        };

        let promo = Promoted {
            forge_version,
            recommended,
        };
        builds
            .entry(mc)
            .and_modify(|existing| {
                if recommended && !existing.recommended {
                    *existing = promo;
                }
            })
            .or_insert(promo);
    }

    builds
}

#[derive(Debug, Deserialize)]
struct Promotions {
    promos: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promos(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn recommended_wins_over_latest() {
        let promos = promos(&[
            ("1.20.1-latest", "47.4.0"),
            ("1.20.1-recommended", "47.3.0"),
            ("1.21.5-latest", "55.0.9"),
        ]);

        let builds = promoted_builds(&promos);

        assert_eq!(
            builds["1.20.1"],
            Promoted {
                forge_version: "47.3.0",
                recommended: true
            }
        );
        assert_eq!(
            builds["1.21.5"],
            Promoted {
                forge_version: "55.0.9",
                recommended: false
            }
        );
    }

    #[test]
    fn malformed_keys_are_skipped() {
        let promos = promos(&[("homepage", "x"), ("1.12.2-beta", "14.23.0")]);
        assert!(promoted_builds(&promos).is_empty());
    }

    #[test]
    fn installer_url_follows_maven_layout() {
        let provider = ForgeProvider::new(ForgeConfig::default());
        assert_eq!(
            provider.installer_url("1.20.1", "47.3.0"),
            "https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.3.0/forge-1.20.1-47.3.0-installer.jar"
        );
    }
}
