use std::sync::{Arc, RwLock};

use build_catalog::{SettingKey, SettingsError, SyncSettings};
use tracing::info;

/// Settings shared by the orchestrator and the scheduler. Writes are
/// validated and seen by the next run or due-check.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<SyncSettings>>,
}

impl SharedSettings {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// A copy of the current values.
    pub fn snapshot(&self) -> SyncSettings {
        self.inner.read().unwrap().clone()
    }

    pub fn update(&self, key: SettingKey, value: u64) -> Result<(), SettingsError> {
        let mut settings = self.inner.write().unwrap();
        let previous = settings.get(key);
        settings.set(key, value)?;
        info!("Setting {} changed from {} to {}", key, previous, value);
        Ok(())
    }
}
