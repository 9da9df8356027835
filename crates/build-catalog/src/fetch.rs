//! Bounded, batched detail resolution for one provider.
//!
//! Candidates are split into fixed-size batches. Inside a batch every
//! resolution is spawned at once but only `concurrency` of them may hold a
//! permit on the shared gate. Each resolution has its own timeout; a timeout,
//! error or panic becomes an [`ItemFailure`] and never aborts the batch. The
//! whole operation runs under one outer budget sized above the worst-case
//! serialized time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::descriptor::{Candidate, ProviderType, VersionDescriptor};
use crate::provider::{ProviderAdapter, ProviderError};
use crate::settings::SyncSettings;
use crate::version;

/// Headroom added on top of the worst-case serialized fetch time.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// Concurrency and time limits for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub concurrency: usize,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub item_timeout: Duration,
    /// Floor for the outer budget; the effective budget may be larger.
    pub total_timeout: Duration,
}

impl FetchLimits {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            concurrency: settings.fetch_concurrency(),
            batch_size: settings.batch_size(),
            batch_pause: settings.batch_pause(),
            item_timeout: settings.item_timeout(),
            total_timeout: settings.total_timeout(),
        }
    }

    /// Outer budget for `candidates` items: the configured total, raised to
    /// the worst case where every wave of `concurrency` calls hits its item
    /// timeout, plus inter-batch pauses and [`SAFETY_MARGIN`].
    pub fn effective_total_timeout(&self, candidates: usize) -> Duration {
        let concurrency = self.concurrency.max(1);
        let batch_size = self.batch_size.max(1);

        let full_batches = candidates / batch_size;
        let remainder = candidates % batch_size;
        let waves = full_batches * batch_size.div_ceil(concurrency) + remainder.div_ceil(concurrency);
        let pauses = candidates.div_ceil(batch_size).saturating_sub(1);

        let worst_case = self
            .item_timeout
            .saturating_mul(u32::try_from(waves).unwrap_or(u32::MAX))
            .saturating_add(
                self.batch_pause
                    .saturating_mul(u32::try_from(pauses).unwrap_or(u32::MAX)),
            )
            .saturating_add(SAFETY_MARGIN);

        worst_case.max(self.total_timeout)
    }
}

/// A candidate that could not be resolved this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub version: String,
    pub reason: String,
}

/// Everything one provider fetch produced.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Resolved descriptors, newest version first.
    pub descriptors: Vec<VersionDescriptor>,
    pub failures: Vec<ItemFailure>,
    pub candidate_count: usize,
    /// One listing call plus one per attempted resolution.
    pub external_calls: u64,
}

impl FetchOutcome {
    /// True when every candidate resolved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Failures that stop a provider fetch from producing any result.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("listing candidates failed: {0}")]
    Listing(#[from] ProviderError),

    #[error("listing candidates timed out after {0:?}")]
    ListingTimeout(Duration),

    #[error(
        "fetch aborted: exceeded total timeout of {limit:?} resolving {candidates} candidates at concurrency {concurrency}"
    )]
    TotalTimeout {
        limit: Duration,
        concurrency: usize,
        candidates: usize,
    },
}

/// Live counters for one fetch, readable even after the fetch future was
/// dropped (for example by a caller's own timeout).
#[derive(Debug, Default)]
pub struct FetchProgress {
    calls: AtomicU64,
    candidates: AtomicUsize,
}

impl FetchProgress {
    /// Upstream calls issued so far, the listing included.
    pub fn external_calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Candidates returned by the listing; zero until it completes.
    pub fn candidates(&self) -> usize {
        self.candidates.load(Ordering::Relaxed)
    }
}

/// Drives listing and detail resolution for one adapter under [`FetchLimits`].
#[derive(Debug, Clone)]
pub struct FetchCoordinator {
    limits: FetchLimits,
}

impl FetchCoordinator {
    pub fn new(limits: FetchLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &FetchLimits {
        &self.limits
    }

    pub async fn fetch(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Result<FetchOutcome, FetchError> {
        self.fetch_tracked(adapter, &FetchProgress::default()).await
    }

    /// [`fetch`](Self::fetch), reporting listing size and calls into `progress`
    /// as they happen.
    pub async fn fetch_tracked(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        progress: &FetchProgress,
    ) -> Result<FetchOutcome, FetchError> {
        progress.calls.fetch_add(1, Ordering::Relaxed);
        let listing = tokio::time::timeout(self.limits.item_timeout, adapter.list_candidates());
        let candidates = match listing.await {
            Ok(listed) => listed?,
            Err(_) => return Err(FetchError::ListingTimeout(self.limits.item_timeout)),
        };
        progress.candidates.store(candidates.len(), Ordering::Relaxed);

        let limit = self.limits.effective_total_timeout(candidates.len());
        self.fetch_within(adapter, candidates, limit, progress).await
    }

    async fn fetch_within(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        candidates: Vec<Candidate>,
        limit: Duration,
        progress: &FetchProgress,
    ) -> Result<FetchOutcome, FetchError> {
        let provider = adapter.provider_type();
        let candidate_count = candidates.len();
        let calls = &progress.calls;

        info!(
            "Resolving {} {} candidates (concurrency {}, batch size {}, budget {:?})",
            candidate_count, provider, self.limits.concurrency, self.limits.batch_size, limit
        );

        let resolved =
            tokio::time::timeout(limit, self.resolve_batches(&adapter, candidates, calls)).await;

        match resolved {
            Ok((mut descriptors, mut failures)) => {
                descriptors.sort_by(|a, b| version::newest_first(&a.version, &b.version));
                failures.sort_by(|a, b| version::newest_first(&a.version, &b.version));
                info!(
                    "Resolved {}/{} {} candidates ({} failed)",
                    descriptors.len(),
                    candidate_count,
                    provider,
                    failures.len()
                );
                Ok(FetchOutcome {
                    descriptors,
                    failures,
                    candidate_count,
                    external_calls: calls.load(Ordering::Relaxed),
                })
            }
            Err(_) => {
                error!(
                    "{} fetch exceeded {:?} with {} candidates at concurrency {}",
                    provider, limit, candidate_count, self.limits.concurrency
                );
                Err(FetchError::TotalTimeout {
                    limit,
                    concurrency: self.limits.concurrency,
                    candidates: candidate_count,
                })
            }
        }
    }

    async fn resolve_batches(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        candidates: Vec<Candidate>,
        calls: &AtomicU64,
    ) -> (Vec<VersionDescriptor>, Vec<ItemFailure>) {
        let provider = adapter.provider_type();
        let batch_size = self.limits.batch_size.max(1);
        let batch_count = candidates.len().div_ceil(batch_size);
        let gate = Arc::new(Semaphore::new(self.limits.concurrency.max(1)));

        let mut descriptors = Vec::with_capacity(candidates.len());
        let mut failures = Vec::new();

        for (index, batch) in candidates.chunks(batch_size).enumerate() {
            if index > 0 && !self.limits.batch_pause.is_zero() {
                tokio::time::sleep(self.limits.batch_pause).await;
            }

            let mut set = JoinSet::new();
            for candidate in batch.iter().cloned() {
                set.spawn(resolve_one(
                    Arc::clone(adapter),
                    Arc::clone(&gate),
                    candidate,
                    self.limits.item_timeout,
                ));
            }
            calls.fetch_add(batch.len() as u64, Ordering::Relaxed);

            let (mut succeeded, mut failed) = (0usize, 0usize);
            while let Some(joined) = set.join_next().await {
                let (version, result) = joined.unwrap_or_else(|e| {
                    ("<unknown>".to_owned(), Err(format!("worker task failed: {e}")))
                });

                match result {
                    Ok(descriptor) => {
                        succeeded += 1;
                        descriptors.push(descriptor);
                    }
                    Err(reason) => {
                        warn!("Failed to resolve {} {}: {}", provider, version, reason);
                        failed += 1;
                        failures.push(ItemFailure { version, reason });
                    }
                }
            }

            debug!(
                "{} batch {}/{}: {} resolved, {} failed",
                provider,
                index + 1,
                batch_count,
                succeeded,
                failed
            );
        }

        (descriptors, failures)
    }
}

async fn resolve_one(
    adapter: Arc<dyn ProviderAdapter>,
    gate: Arc<Semaphore>,
    candidate: Candidate,
    item_timeout: Duration,
) -> (String, Result<VersionDescriptor, String>) {
    let Ok(_permit) = gate.acquire_owned().await else {
        return (candidate.version, Err("worker pool closed".to_owned()));
    };

    let attempt = AssertUnwindSafe(tokio::time::timeout(
        item_timeout,
        adapter.resolve_detail(&candidate),
    ))
    .catch_unwind()
    .await;

    let result = match attempt {
        Ok(Ok(Ok(descriptor))) => check_identity(adapter.provider_type(), &candidate, descriptor),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(_)) => Err(format!("timed out after {item_timeout:?}")),
        Err(panic) => Err(format!("resolver panicked: {}", panic_message(&*panic))),
    };

    (candidate.version, result)
}

// A descriptor must carry the identity it was asked for, otherwise the
// deactivation set for the provider would be wrong.
fn check_identity(
    provider: ProviderType,
    candidate: &Candidate,
    descriptor: VersionDescriptor,
) -> Result<VersionDescriptor, String> {
    if descriptor.provider_type != provider || descriptor.version != candidate.version {
        return Err(format!(
            "adapter returned {} {} for candidate {} {}",
            descriptor.provider_type, descriptor.version, provider, candidate.version
        ));
    }
    if descriptor.download_url.is_empty() {
        return Err("adapter returned an empty download URL".to_owned());
    }
    Ok(descriptor)
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
