use build_catalog::version;
use build_catalog::{
    Candidate, GameVersion, ProviderAdapter, ProviderError, ProviderType, VersionDescriptor,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://api.papermc.io";

const PROJECT: &str = "paper";
const STABLE_CHANNEL: &str = "default";

/// Configuration for the Paper adapter.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    pub api_base_url: Option<String>,
    pub minimum_version: Option<GameVersion>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            minimum_version: crate::default_minimum(),
        }
    }
}

/// Paper server builds. Each game version has a list of numbered builds;
/// the catalog tracks the newest stable build per version.
pub struct PaperProvider {
    config: PaperConfig,
    client: reqwest::Client,
}

impl PaperProvider {
    pub fn new(config: PaperConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn project_url(&self) -> String {
        let base = self.config.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}/v2/projects/{PROJECT}", http::trim_base(base))
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for PaperProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Paper
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>, ProviderError> {
        let project_url = self.project_url();
        let project: Project = http::get_json(&self.client, &project_url).await?;
        let total = project.versions.len();

        let candidates: Vec<Candidate> = project
            .versions
            .into_iter()
            .filter(|v| version::meets_minimum(v, self.config.minimum_version.as_ref()))
            .map(|v| {
                let builds_url = format!("{project_url}/versions/{v}/builds");
                Candidate::new(v, builds_url)
            })
            .collect();

        debug!("paper project: {} of {} versions kept", candidates.len(), total);
        Ok(candidates)
    }

    async fn resolve_detail(
        &self,
        candidate: &Candidate,
    ) -> Result<VersionDescriptor, ProviderError> {
        let list: BuildList = http::get_json(&self.client, &candidate.detail_url).await?;

        let build = pick_build(&list.builds).ok_or_else(|| {
            ProviderError::NotFound(format!("no builds for paper {}", candidate.version))
        })?;
        let application = build.downloads.application.as_ref().ok_or_else(|| {
            ProviderError::Parse(format!(
                "build {} of paper {} has no application download",
                build.build, candidate.version
            ))
        })?;

        let download_url = format!(
            "{}/versions/{}/builds/{}/downloads/{}",
            self.project_url(),
            candidate.version,
            build.build,
            application.name
        );

        Ok(
            VersionDescriptor::resolved(ProviderType::Paper, &candidate.version, download_url)
                .with_build_number(build.build)
                .with_stable(build.channel == STABLE_CHANNEL)
                .with_released_at(build.time),
        )
    }
}

/// Highest-numbered stable build, else the highest-numbered build of any channel.
fn pick_build(builds: &[Build]) -> Option<&Build> {
    builds
        .iter()
        .filter(|b| b.channel == STABLE_CHANNEL)
        .max_by_key(|b| b.build)
        .or_else(|| builds.iter().max_by_key(|b| b.build))
}

#[derive(Debug, Deserialize)]
struct Project {
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BuildList {
    builds: Vec<Build>,
}

#[derive(Debug, Deserialize)]
struct Build {
    build: u32,
    time: Option<DateTime<Utc>>,
    #[serde(default = "default_channel")]
    channel: String,
    #[serde(default)]
    downloads: BuildDownloads,
}

#[derive(Debug, Default, Deserialize)]
struct BuildDownloads {
    application: Option<Download>,
}

#[derive(Debug, Deserialize)]
struct Download {
    name: String,
}

fn default_channel() -> String {
    STABLE_CHANNEL.to_owned()
}
