pub mod forge;
pub mod http;
pub mod paper;
pub mod registry;
pub mod vanilla;

pub use forge::{ForgeConfig, ForgeProvider};
pub use paper::{PaperConfig, PaperProvider};
pub use registry::{UpstreamConfig, build_adapters};
pub use vanilla::{VanillaConfig, VanillaProvider};

use build_catalog::GameVersion;

/// Minimum game version every adapter applies unless configured otherwise.
pub const DEFAULT_MINIMUM_VERSION: &str = "1.8.0";

pub(crate) fn default_minimum() -> Option<GameVersion> {
    GameVersion::parse(DEFAULT_MINIMUM_VERSION)
}
