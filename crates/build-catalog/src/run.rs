use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::ProviderType;

/// What started a synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Manual,
    Scheduled,
    Startup,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Startup => "startup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "scheduled" => Some(Self::Scheduled),
            "startup" => Some(Self::Startup),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Classify a finished run.
    ///
    /// No errors means success. Otherwise the run is partial only if some
    /// provider type reconciled and the catalog actually changed.
    pub fn classify(errors: &[String], types_succeeded: usize, counts: RunCounts) -> Self {
        if errors.is_empty() {
            Self::Success
        } else if types_succeeded > 0 && counts.total() > 0 {
            Self::Partial
        } else {
            Self::Failed
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog changes made by a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
}

impl RunCounts {
    pub fn new(added: u64, updated: u64, removed: u64) -> Self {
        Self {
            added,
            updated,
            removed,
        }
    }

    pub fn total(&self) -> u64 {
        self.added + self.updated + self.removed
    }
}

impl AddAssign for RunCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.updated += rhs.updated;
        self.removed += rhs.removed;
    }
}

impl fmt::Display for RunCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} removed",
            self.added, self.updated, self.removed
        )
    }
}

/// One row of the append-only run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRunRecord {
    pub id: i64,
    pub trigger: TriggerKind,
    /// `None` means the run covered all provider types.
    pub provider_type: Option<ProviderType>,
    pub counts: RunCounts,
    pub external_calls: u64,
    pub duration: Option<Duration>,
    pub status: RunStatus,
    pub error_text: Option<String>,
    pub actor: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Values written when a run record is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub status: RunStatus,
    pub counts: RunCounts,
    pub external_calls: u64,
    pub duration: Duration,
    pub errors: Vec<String>,
}

impl RunSummary {
    /// Errors joined for storage, or `None` when there were none.
    pub fn error_text(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// Parameters for one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// `None` runs every known provider type.
    pub providers: Option<Vec<ProviderType>>,
    pub force_refresh: bool,
    pub actor: Option<String>,
    pub trigger: TriggerKind,
}

impl RunRequest {
    /// A manual run. Manual runs always force past the single-flight guard.
    pub fn manual(actor: Option<String>) -> Self {
        Self {
            providers: None,
            force_refresh: true,
            actor,
            trigger: TriggerKind::Manual,
        }
    }

    pub fn scheduled() -> Self {
        Self {
            providers: None,
            force_refresh: false,
            actor: None,
            trigger: TriggerKind::Scheduled,
        }
    }

    pub fn startup() -> Self {
        Self {
            trigger: TriggerKind::Startup,
            ..Self::scheduled()
        }
    }

    pub fn with_providers(mut self, providers: Vec<ProviderType>) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Provider types this request covers, deduplicated, in run order.
    pub fn provider_types(&self) -> Vec<ProviderType> {
        match &self.providers {
            None => ProviderType::ALL.to_vec(),
            Some(requested) => {
                let mut types = Vec::with_capacity(requested.len());
                for provider in requested {
                    if !types.contains(provider) {
                        types.push(*provider);
                    }
                }
                types
            }
        }
    }

    /// Scope recorded on the run log: a single type, or `None` for anything wider.
    pub fn scope(&self) -> Option<ProviderType> {
        match self.provider_types().as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }
}

/// What a caller gets back from a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// `None` when the run was rejected before a record was created.
    pub run_id: Option<i64>,
    pub success: bool,
    pub status: Option<RunStatus>,
    pub message: String,
    pub counts: RunCounts,
    pub duration: Duration,
    pub errors: Vec<String>,
}

impl RunResult {
    /// The rejection returned while another run holds the single-flight guard.
    pub fn already_running() -> Self {
        Self {
            run_id: None,
            success: false,
            status: None,
            message: "sync already in progress".to_owned(),
            counts: RunCounts::default(),
            duration: Duration::ZERO,
            errors: vec!["sync already in progress".to_owned()],
        }
    }

    /// A run that could not begin, for example because the run log was unwritable.
    pub fn not_started(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            run_id: None,
            success: false,
            status: Some(RunStatus::Failed),
            message: format!("sync could not start: {reason}"),
            counts: RunCounts::default(),
            duration: Duration::ZERO,
            errors: vec![reason],
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.run_id.is_none() && self.status.is_none()
    }

    pub fn from_summary(run_id: i64, summary: RunSummary) -> Self {
        let success = summary.status != RunStatus::Failed;
        let message = match summary.status {
            RunStatus::Success => format!("sync succeeded: {}", summary.counts),
            RunStatus::Partial => format!(
                "sync partially succeeded: {} ({} error(s))",
                summary.counts,
                summary.errors.len()
            ),
            _ => format!("sync failed ({} error(s))", summary.errors.len()),
        };

        Self {
            run_id: Some(run_id),
            success,
            status: Some(summary.status),
            message,
            counts: summary.counts,
            duration: summary.duration,
            errors: summary.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_success_without_errors() {
        assert_eq!(
            RunStatus::classify(&[], 3, RunCounts::default()),
            RunStatus::Success
        );
    }

    #[test]
    fn classify_partial_needs_a_success_and_a_change() {
        let errors = vec!["paper: down".to_owned()];
        assert_eq!(
            RunStatus::classify(&errors, 1, RunCounts::new(2, 0, 0)),
            RunStatus::Partial
        );
        assert_eq!(
            RunStatus::classify(&errors, 1, RunCounts::default()),
            RunStatus::Failed
        );
        assert_eq!(
            RunStatus::classify(&errors, 0, RunCounts::default()),
            RunStatus::Failed
        );
    }

    #[test]
    fn request_scope_and_dedup() {
        let all = RunRequest::scheduled();
        assert_eq!(all.provider_types(), ProviderType::ALL.to_vec());
        assert_eq!(all.scope(), None);

        let one = RunRequest::manual(None)
            .with_providers(vec![ProviderType::Paper, ProviderType::Paper]);
        assert_eq!(one.provider_types(), vec![ProviderType::Paper]);
        assert_eq!(one.scope(), Some(ProviderType::Paper));
        assert!(one.force_refresh);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            RunStatus::Running,
            RunStatus::Success,
            RunStatus::Partial,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        for trigger in [TriggerKind::Manual, TriggerKind::Scheduled, TriggerKind::Startup] {
            assert_eq!(TriggerKind::parse(trigger.as_str()), Some(trigger));
        }
    }

    #[test]
    fn conflict_result_is_recognizable() {
        let result = RunResult::already_running();
        assert!(result.is_conflict());
        assert!(!result.success);
        assert!(result.message.contains("already in progress"));
    }
}
