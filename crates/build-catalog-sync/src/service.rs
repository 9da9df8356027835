use std::sync::Arc;

use build_catalog::{
    CatalogError, CatalogReader, ProviderType, RunRequest, RunResult, SyncRunRecord,
    VersionDescriptor,
};
use build_catalog_store::{CatalogStore, StoreError};
use tracing::{debug, warn};

use crate::orchestrator::SyncOrchestrator;
use crate::scheduler::{Scheduler, SchedulerHandle, SchedulerStatus};

/// The operations collaborators use: catalog reads, sync triggers,
/// scheduler status and run history.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<CatalogStore>,
    scheduler: SchedulerHandle,
}

impl CatalogService {
    pub fn new(store: Arc<CatalogStore>, scheduler: SchedulerHandle) -> Self {
        Self { store, scheduler }
    }

    /// Wire a store and orchestrator to a new (stopped) scheduler, which
    /// resumes from the last recorded successful run.
    pub fn assemble(orchestrator: Arc<SyncOrchestrator>) -> (Self, Scheduler) {
        let store = Arc::clone(orchestrator.store());
        let settings = orchestrator.settings().clone();
        let scheduler = Scheduler::new(orchestrator, settings);

        match store.latest_success() {
            Ok(Some(record)) => {
                let at = record.completed_at.unwrap_or(record.started_at);
                debug!("Last successful sync was run {} at {}", record.id, at);
                scheduler.seed_last_success(at);
            }
            Ok(None) => {}
            Err(e) => warn!("Could not read the last successful sync: {}", e),
        }

        let service = Self::new(store, scheduler.handle());
        (service, scheduler)
    }

    pub async fn get_active_versions(
        &self,
        provider_type: Option<ProviderType>,
    ) -> Result<Vec<VersionDescriptor>, CatalogError> {
        self.store.active_versions(provider_type).await
    }

    pub async fn get_version(
        &self,
        provider_type: ProviderType,
        version: &str,
    ) -> Result<Option<VersionDescriptor>, CatalogError> {
        self.store.version(provider_type, version).await
    }

    /// Manual run, bypassing the scheduler's due-check.
    pub async fn trigger_sync(
        &self,
        providers: Option<Vec<ProviderType>>,
        force_refresh: bool,
        actor: Option<String>,
    ) -> RunResult {
        let mut request = RunRequest::manual(actor).with_force_refresh(force_refresh);
        if let Some(providers) = providers {
            request = request.with_providers(providers);
        }
        self.scheduler.trigger(request).await
    }

    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub fn sync_history(
        &self,
        limit: usize,
        provider_type: Option<ProviderType>,
    ) -> Result<Vec<SyncRunRecord>, StoreError> {
        self.store.history(limit, provider_type)
    }
}
