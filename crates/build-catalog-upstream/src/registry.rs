use std::sync::Arc;

use build_catalog::{ProviderAdapter, ProviderType};

use crate::{ForgeConfig, ForgeProvider, PaperConfig, PaperProvider, VanillaConfig, VanillaProvider};

/// Which upstreams to talk to and how.
///
/// A `None` entry disables that provider type entirely.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub vanilla: Option<VanillaConfig>,
    pub paper: Option<PaperConfig>,
    pub forge: Option<ForgeConfig>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            vanilla: Some(VanillaConfig::default()),
            paper: Some(PaperConfig::default()),
            forge: Some(ForgeConfig::default()),
        }
    }
}

impl UpstreamConfig {
    pub fn enabled(&self) -> Vec<ProviderType> {
        let mut types = Vec::new();
        if self.vanilla.is_some() {
            types.push(ProviderType::Vanilla);
        }
        if self.paper.is_some() {
            types.push(ProviderType::Paper);
        }
        if self.forge.is_some() {
            types.push(ProviderType::Forge);
        }
        types
    }
}

/// Construct one adapter per enabled provider type, in run order.
pub fn build_adapters(config: &UpstreamConfig) -> Vec<Arc<dyn ProviderAdapter>> {
    let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

    if let Some(vanilla) = &config.vanilla {
        adapters.push(Arc::new(VanillaProvider::new(vanilla.clone())));
    }
    if let Some(paper) = &config.paper {
        adapters.push(Arc::new(PaperProvider::new(paper.clone())));
    }
    if let Some(forge) = &config.forge {
        adapters.push(Arc::new(ForgeProvider::new(forge.clone())));
    }

    adapters
}
