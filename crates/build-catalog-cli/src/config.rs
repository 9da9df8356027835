use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use build_catalog::{GameVersion, SyncSettings};
use build_catalog_upstream::{ForgeConfig, PaperConfig, UpstreamConfig, VanillaConfig};
use serde::Deserialize;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// SQLite file; defaults to the user cache directory.
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub vanilla: VanillaEntry,
    #[serde(default)]
    pub paper: PaperEntry,
    #[serde(default)]
    pub forge: ForgeEntry,
}

/// `[providers.vanilla]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VanillaEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Empty string disables the minimum.
    pub minimum_version: Option<String>,
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub include_snapshots: bool,
}

/// `[providers.paper]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaperEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub minimum_version: Option<String>,
    pub api_base_url: Option<String>,
}

/// `[providers.forge]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgeEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub minimum_version: Option<String>,
    pub files_base_url: Option<String>,
    pub maven_base_url: Option<String>,
}

impl Default for VanillaEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            minimum_version: None,
            api_base_url: None,
            include_snapshots: false,
        }
    }
}

impl Default for PaperEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            minimum_version: None,
            api_base_url: None,
        }
    }
}

impl Default for ForgeEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            minimum_version: None,
            files_base_url: None,
            maven_base_url: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `None` keeps the adapter's default minimum, `""` disables it.
fn minimum_override(
    key: &str,
    value: Option<&str>,
    default: Option<GameVersion>,
) -> Result<Option<GameVersion>> {
    match value.map(str::trim) {
        None => Ok(default),
        Some("") => Ok(None),
        Some(raw) => match GameVersion::parse(raw) {
            Some(version) => Ok(Some(version)),
            None => bail!("{key}: {raw:?} is not a game version"),
        },
    }
}

impl AppConfig {
    /// Adapter configuration for every enabled provider type.
    pub fn upstream(&self) -> Result<UpstreamConfig> {
        let ProvidersConfig {
            vanilla,
            paper,
            forge,
        } = &self.providers;

        let vanilla = if vanilla.enabled {
            let defaults = VanillaConfig::default();
            Some(VanillaConfig {
                api_base_url: vanilla.api_base_url.clone(),
                minimum_version: minimum_override(
                    "providers.vanilla.minimum_version",
                    vanilla.minimum_version.as_deref(),
                    defaults.minimum_version,
                )?,
                include_snapshots: vanilla.include_snapshots,
            })
        } else {
            None
        };

        let paper = if paper.enabled {
            let defaults = PaperConfig::default();
            Some(PaperConfig {
                api_base_url: paper.api_base_url.clone(),
                minimum_version: minimum_override(
                    "providers.paper.minimum_version",
                    paper.minimum_version.as_deref(),
                    defaults.minimum_version,
                )?,
            })
        } else {
            None
        };

        let forge = if forge.enabled {
            let defaults = ForgeConfig::default();
            Some(ForgeConfig {
                files_base_url: forge.files_base_url.clone(),
                maven_base_url: forge.maven_base_url.clone(),
                minimum_version: minimum_override(
                    "providers.forge.minimum_version",
                    forge.minimum_version.as_deref(),
                    defaults.minimum_version,
                )?,
            })
        } else {
            None
        };

        Ok(UpstreamConfig {
            vanilla,
            paper,
            forge,
        })
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => default_database_path(),
        }
    }
}

/// Config file path: `~/.config/build-catalog/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("build-catalog").join("config.toml"))
}

fn default_database_path() -> Result<PathBuf> {
    let base = dirs::cache_dir().context("could not determine cache directory")?;
    Ok(base.join("build-catalog").join("catalog.db"))
}

pub fn parse(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents)?;
    // Surface bad provider values now rather than on first sync.
    config.upstream()?;
    Ok(config)
}

/// Load config from `explicit`, or from the default location.
///
/// A missing default file means defaults; a missing explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_path() {
            Some(path) => path,
            None => return Ok(AppConfig::default()),
        },
    };

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if explicit.is_none() && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AppConfig::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read config {}", path.display()));
        }
    };

    parse(&contents).with_context(|| format!("invalid config {}", path.display()))
}
