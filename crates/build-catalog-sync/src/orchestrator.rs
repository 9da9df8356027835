//! One synchronization run across one or more provider types.
//!
//! Each requested type is fetched through its adapter and reconciled into
//! the store in a single transaction. Types fail independently. Every run
//! that gets past the single-flight guard leaves exactly one finalized run
//! record, whatever happens inside it.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use build_catalog::{
    FetchCoordinator, FetchLimits, FetchProgress, ProviderAdapter, ProviderType, RunCounts, RunRequest,
    RunResult, RunStatus, RunSummary, SyncSettings,
};
use build_catalog_store::{CatalogStore, StoreError};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::scheduler::SyncRunner;
use crate::settings::SharedSettings;

pub struct SyncOrchestrator {
    store: Arc<CatalogStore>,
    adapters: HashMap<ProviderType, Arc<dyn ProviderAdapter>>,
    settings: SharedSettings,
    in_flight: AtomicUsize,
}

/// What the per-type loop has accumulated so far. Survives a run timeout
/// so already reconciled types are still reported.
#[derive(Debug, Default)]
struct Progress {
    counts: RunCounts,
    external_calls: u64,
    errors: Vec<String>,
    types_succeeded: usize,
    /// Candidates listed across all types fetched so far.
    candidates: usize,
    /// Counters of the fetch currently in progress, if any.
    current: Option<FetchProgress>,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<CatalogStore>,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        settings: SharedSettings,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.provider_type(), adapter))
            .collect();

        Self {
            store,
            adapters,
            settings,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &Arc<CatalogStore> {
        &self.store
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    /// Provider types with a registered adapter.
    pub fn provider_types(&self) -> Vec<ProviderType> {
        ProviderType::ALL
            .into_iter()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Fail run records a previous process left in `running`.
    pub fn recover_interrupted_runs(&self) -> Result<u64, StoreError> {
        let count = self.store.mark_stale_runs_failed()?;
        if count > 0 {
            info!("Marked {} interrupted sync runs as failed", count);
        }
        Ok(count)
    }

    /// Execute one run. Never panics and never returns an error; every
    /// outcome is described by the returned [`RunResult`].
    pub async fn run(&self, request: RunRequest) -> RunResult {
        let Some(_guard) = self.admit(request.force_refresh) else {
            warn!("Rejected {} sync: another run is in progress", request.trigger);
            return RunResult::already_running();
        };

        let run_id =
            match self
                .store
                .start_run(request.trigger, request.scope(), request.actor.as_deref())
            {
                Ok(id) => id,
                Err(e) => {
                    error!("Failed to record sync run start: {}", e);
                    return RunResult::not_started(e.to_string());
                }
            };

        // An unscoped run covers the registered types; an explicit request
        // for an unregistered type is reported as that type's error.
        let types = match request.providers {
            Some(_) => request.provider_types(),
            None => self.provider_types(),
        };
        let settings = self.settings.snapshot();
        let run_timeout = settings.run_timeout();
        info!(
            "Starting {} sync run {} for {} (actor: {})",
            request.trigger,
            run_id,
            describe(&types),
            request.actor.as_deref().unwrap_or("-")
        );

        let started = Instant::now();
        let mut progress = Progress::default();
        let outcome = AssertUnwindSafe(tokio::time::timeout(
            run_timeout,
            self.sync_types(&types, &settings, &mut progress),
        ))
        .catch_unwind()
        .await;

        // A fetch cut off mid-flight still made upstream calls.
        if let Some(cut_off) = progress.current.take() {
            progress.external_calls += cut_off.external_calls();
            progress.candidates += cut_off.candidates();
        }

        let status = match outcome {
            Ok(Ok(())) => RunStatus::classify(
                &progress.errors,
                progress.types_succeeded,
                progress.counts,
            ),
            Ok(Err(_)) => {
                let concurrency = settings.fetch_concurrency();
                error!(
                    "Sync run {} exceeded run timeout of {:?} ({} candidates listed, concurrency {})",
                    run_id, run_timeout, progress.candidates, concurrency
                );
                progress.errors.push(format!(
                    "run timed out: exceeded run limit of {:?} with {} candidates listed at concurrency {}",
                    run_timeout, progress.candidates, concurrency
                ));
                RunStatus::Failed
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                error!("Sync run {} aborted by unexpected fault: {}", run_id, message);
                progress.errors.push(format!("run aborted: {message}"));
                RunStatus::Failed
            }
        };

        if status == RunStatus::Success {
            self.purge_inactive(&settings);
        }

        let summary = RunSummary {
            status,
            counts: progress.counts,
            external_calls: progress.external_calls,
            duration: started.elapsed(),
            errors: progress.errors,
        };

        if let Err(e) = self.store.finish_run(run_id, &summary) {
            error!("Failed to finalize sync run {}: {}", run_id, e);
        }

        info!(
            "Sync run {} finished: {} ({}, {} external calls, {:?})",
            run_id, summary.status, summary.counts, summary.external_calls, summary.duration
        );
        RunResult::from_summary(run_id, summary)
    }

    fn admit(&self, force: bool) -> Option<InFlightGuard<'_>> {
        if force {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
        } else if self
            .in_flight
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        Some(InFlightGuard(&self.in_flight))
    }

    async fn sync_types(
        &self,
        types: &[ProviderType],
        settings: &SyncSettings,
        progress: &mut Progress,
    ) {
        let coordinator = FetchCoordinator::new(FetchLimits::from_settings(settings));

        for &provider_type in types {
            let Some(adapter) = self.adapters.get(&provider_type) else {
                warn!("No adapter registered for {}", provider_type);
                progress
                    .errors
                    .push(format!("{provider_type}: no adapter configured"));
                continue;
            };

            let tracker = progress.current.insert(FetchProgress::default());
            let fetched = coordinator
                .fetch_tracked(Arc::clone(adapter), tracker)
                .await;
            let tracker = progress.current.take().unwrap_or_default();
            progress.external_calls += tracker.external_calls();
            progress.candidates += tracker.candidates();

            let outcome = match fetched {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Fetching {} failed: {}", provider_type, e);
                    progress.errors.push(format!("{provider_type}: {e}"));
                    continue;
                }
            };

            for failure in &outcome.failures {
                progress.errors.push(format!(
                    "{provider_type} {}: {}",
                    failure.version, failure.reason
                ));
            }

            let complete = outcome.is_complete();
            if !complete {
                warn!(
                    "{} fetch incomplete ({} of {} failed); keeping unresolved versions active",
                    provider_type,
                    outcome.failures.len(),
                    outcome.candidate_count
                );
            }

            match self
                .store
                .reconcile(provider_type, &outcome.descriptors, complete)
            {
                Ok(counts) => {
                    info!("Reconciled {}: {}", provider_type, counts);
                    progress.counts += counts;
                    progress.types_succeeded += 1;
                }
                Err(e) => {
                    error!("Reconciling {} failed: {}", provider_type, e);
                    progress.errors.push(format!("{provider_type}: {e}"));
                }
            }
        }
    }

    fn purge_inactive(&self, settings: &SyncSettings) {
        let Some(age) = settings.purge_inactive_after() else {
            return;
        };
        match self.store.purge_inactive_older_than(age) {
            Ok(0) => debug!("No inactive versions older than {:?}", age),
            Ok(count) => info!("Purged {} versions inactive for over {:?}", count, age),
            Err(e) => warn!("Purging inactive versions failed: {}", e),
        }
    }
}

#[async_trait::async_trait]
impl SyncRunner for SyncOrchestrator {
    async fn run(&self, request: RunRequest) -> RunResult {
        SyncOrchestrator::run(self, request).await
    }

    fn is_running(&self) -> bool {
        SyncOrchestrator::is_running(self)
    }
}

fn describe(types: &[ProviderType]) -> String {
    types
        .iter()
        .map(ProviderType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

