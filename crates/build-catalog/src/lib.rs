pub mod catalog;
pub mod descriptor;
pub mod fetch;
pub mod provider;
pub mod run;
pub mod settings;
pub mod version;

pub use catalog::{CatalogError, CatalogReader};
pub use descriptor::{Candidate, ProviderType, UnknownProviderType, VersionDescriptor};
pub use fetch::{
    FetchCoordinator, FetchError, FetchLimits, FetchOutcome, FetchProgress, ItemFailure,
};
pub use provider::{ProviderAdapter, ProviderError};
pub use run::{
    RunCounts, RunRequest, RunResult, RunStatus, RunSummary, SyncRunRecord, TriggerKind,
};
pub use settings::{SettingKey, SettingsError, SyncSettings};
pub use version::GameVersion;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
