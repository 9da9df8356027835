use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised when writing a setting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("unknown setting: {0}")]
    UnknownKey(String),

    #[error("{key} = {value} is out of range (allowed {min}..={max})")]
    OutOfRange {
        key: SettingKey,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{key} = {value} must be at least {floor_key} = {floor}")]
    BelowFloor {
        key: SettingKey,
        value: u64,
        floor_key: SettingKey,
        floor: u64,
    },
}

/// Name of one tunable synchronization option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    FetchConcurrency,
    BatchSize,
    BatchPauseMs,
    ItemTimeoutSecs,
    TotalTimeoutSecs,
    RunTimeoutSecs,
    StartupGraceSecs,
    UpdateIntervalSecs,
    RetryAttempts,
    RetryBaseDelaySecs,
    PurgeInactiveAfterDays,
}

impl SettingKey {
    pub const ALL: [SettingKey; 11] = [
        Self::FetchConcurrency,
        Self::BatchSize,
        Self::BatchPauseMs,
        Self::ItemTimeoutSecs,
        Self::TotalTimeoutSecs,
        Self::RunTimeoutSecs,
        Self::StartupGraceSecs,
        Self::UpdateIntervalSecs,
        Self::RetryAttempts,
        Self::RetryBaseDelaySecs,
        Self::PurgeInactiveAfterDays,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchConcurrency => "fetch_concurrency",
            Self::BatchSize => "batch_size",
            Self::BatchPauseMs => "batch_pause_ms",
            Self::ItemTimeoutSecs => "item_timeout_secs",
            Self::TotalTimeoutSecs => "total_timeout_secs",
            Self::RunTimeoutSecs => "run_timeout_secs",
            Self::StartupGraceSecs => "startup_grace_secs",
            Self::UpdateIntervalSecs => "update_interval_secs",
            Self::RetryAttempts => "retry_attempts",
            Self::RetryBaseDelaySecs => "retry_base_delay_secs",
            Self::PurgeInactiveAfterDays => "purge_inactive_after_days",
        }
    }

    /// Inclusive bounds accepted on write.
    pub fn bounds(&self) -> (u64, u64) {
        match self {
            Self::FetchConcurrency => (1, 64),
            Self::BatchSize => (1, 500),
            Self::BatchPauseMs => (0, 10_000),
            Self::ItemTimeoutSecs => (1, 300),
            Self::TotalTimeoutSecs => (10, 7_200),
            Self::RunTimeoutSecs => (60, 14_400),
            Self::StartupGraceSecs => (0, 3_600),
            Self::UpdateIntervalSecs => (60, 604_800),
            Self::RetryAttempts => (1, 10),
            Self::RetryBaseDelaySecs => (1, 3_600),
            Self::PurgeInactiveAfterDays => (0, 3_650),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().replace('-', "_");
        Self::ALL.into_iter().find(|key| key.name() == s)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| SettingsError::UnknownKey(s.to_owned()))
    }
}

/// Tunables for fetching, reconciliation and scheduling.
///
/// Fields are only writable through [`SyncSettings::set`], which rejects
/// values outside [`SettingKey::bounds`]. Deserialization goes through the
/// same path, so a config file cannot smuggle in an invalid value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PartialSettings")]
pub struct SyncSettings {
    fetch_concurrency: u64,
    batch_size: u64,
    batch_pause_ms: u64,
    item_timeout_secs: u64,
    total_timeout_secs: u64,
    run_timeout_secs: u64,
    startup_grace_secs: u64,
    update_interval_secs: u64,
    retry_attempts: u64,
    retry_base_delay_secs: u64,
    purge_inactive_after_days: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fetch_concurrency: 8,
            batch_size: 25,
            batch_pause_ms: 250,
            item_timeout_secs: 15,
            total_timeout_secs: 300,
            run_timeout_secs: 1_800,
            startup_grace_secs: 60,
            update_interval_secs: 21_600,
            retry_attempts: 3,
            retry_base_delay_secs: 60,
            purge_inactive_after_days: 0,
        }
    }
}

impl SyncSettings {
    pub fn get(&self, key: SettingKey) -> u64 {
        match key {
            SettingKey::FetchConcurrency => self.fetch_concurrency,
            SettingKey::BatchSize => self.batch_size,
            SettingKey::BatchPauseMs => self.batch_pause_ms,
            SettingKey::ItemTimeoutSecs => self.item_timeout_secs,
            SettingKey::TotalTimeoutSecs => self.total_timeout_secs,
            SettingKey::RunTimeoutSecs => self.run_timeout_secs,
            SettingKey::StartupGraceSecs => self.startup_grace_secs,
            SettingKey::UpdateIntervalSecs => self.update_interval_secs,
            SettingKey::RetryAttempts => self.retry_attempts,
            SettingKey::RetryBaseDelaySecs => self.retry_base_delay_secs,
            SettingKey::PurgeInactiveAfterDays => self.purge_inactive_after_days,
        }
    }

    /// Validated write. The previous value is kept on error.
    ///
    /// Besides the per-key bounds, `run_timeout_secs` may never drop below
    /// `total_timeout_secs`.
    pub fn set(&mut self, key: SettingKey, value: u64) -> Result<(), SettingsError> {
        let previous = self.get(key);
        self.set_in_bounds(key, value)?;
        if let Err(e) = self.check_timeouts() {
            self.assign(key, previous);
            return Err(e);
        }
        Ok(())
    }

    fn check_timeouts(&self) -> Result<(), SettingsError> {
        if self.run_timeout_secs < self.total_timeout_secs {
            return Err(SettingsError::BelowFloor {
                key: SettingKey::RunTimeoutSecs,
                value: self.run_timeout_secs,
                floor_key: SettingKey::TotalTimeoutSecs,
                floor: self.total_timeout_secs,
            });
        }
        Ok(())
    }

    fn set_in_bounds(&mut self, key: SettingKey, value: u64) -> Result<(), SettingsError> {
        let (min, max) = key.bounds();
        if !(min..=max).contains(&value) {
            return Err(SettingsError::OutOfRange {
                key,
                value,
                min,
                max,
            });
        }

        self.assign(key, value);
        Ok(())
    }

    fn assign(&mut self, key: SettingKey, value: u64) {
        let slot = match key {
            SettingKey::FetchConcurrency => &mut self.fetch_concurrency,
            SettingKey::BatchSize => &mut self.batch_size,
            SettingKey::BatchPauseMs => &mut self.batch_pause_ms,
            SettingKey::ItemTimeoutSecs => &mut self.item_timeout_secs,
            SettingKey::TotalTimeoutSecs => &mut self.total_timeout_secs,
            SettingKey::RunTimeoutSecs => &mut self.run_timeout_secs,
            SettingKey::StartupGraceSecs => &mut self.startup_grace_secs,
            SettingKey::UpdateIntervalSecs => &mut self.update_interval_secs,
            SettingKey::RetryAttempts => &mut self.retry_attempts,
            SettingKey::RetryBaseDelaySecs => &mut self.retry_base_delay_secs,
            SettingKey::PurgeInactiveAfterDays => &mut self.purge_inactive_after_days,
        };
        *slot = value;
    }

    /// Chainable form of [`SyncSettings::set`].
    pub fn with(mut self, key: SettingKey, value: u64) -> Result<Self, SettingsError> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn fetch_concurrency(&self) -> usize {
        self.fetch_concurrency as usize
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size as usize
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts as u32
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }

    /// `None` when purging is disabled.
    pub fn purge_inactive_after(&self) -> Option<Duration> {
        match self.purge_inactive_after_days {
            0 => None,
            days => Some(Duration::from_secs(days * 86_400)),
        }
    }
}

/// Wire form used for deserialization; every field is optional and unknown
/// fields are rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialSettings {
    fetch_concurrency: Option<u64>,
    batch_size: Option<u64>,
    batch_pause_ms: Option<u64>,
    item_timeout_secs: Option<u64>,
    total_timeout_secs: Option<u64>,
    run_timeout_secs: Option<u64>,
    startup_grace_secs: Option<u64>,
    update_interval_secs: Option<u64>,
    retry_attempts: Option<u64>,
    retry_base_delay_secs: Option<u64>,
    purge_inactive_after_days: Option<u64>,
}

impl TryFrom<PartialSettings> for SyncSettings {
    type Error = SettingsError;

    fn try_from(partial: PartialSettings) -> Result<Self, Self::Error> {
        let values = [
            (SettingKey::FetchConcurrency, partial.fetch_concurrency),
            (SettingKey::BatchSize, partial.batch_size),
            (SettingKey::BatchPauseMs, partial.batch_pause_ms),
            (SettingKey::ItemTimeoutSecs, partial.item_timeout_secs),
            (SettingKey::TotalTimeoutSecs, partial.total_timeout_secs),
            (SettingKey::RunTimeoutSecs, partial.run_timeout_secs),
            (SettingKey::StartupGraceSecs, partial.startup_grace_secs),
            (SettingKey::UpdateIntervalSecs, partial.update_interval_secs),
            (SettingKey::RetryAttempts, partial.retry_attempts),
            (SettingKey::RetryBaseDelaySecs, partial.retry_base_delay_secs),
            (
                SettingKey::PurgeInactiveAfterDays,
                partial.purge_inactive_after_days,
            ),
        ];

        // Keys are checked one by one, their relations only once all are in.
        let mut settings = SyncSettings::default();
        for (key, value) in values {
            if let Some(value) = value {
                settings.set_in_bounds(key, value)?;
            }
        }
        settings.check_timeouts()?;
        Ok(settings)
    }
}
