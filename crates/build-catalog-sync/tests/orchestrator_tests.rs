use std::sync::Arc;
use std::time::Duration;

use build_catalog::test_support::ScriptedProvider;
use build_catalog::{
    ProviderAdapter, ProviderError, ProviderType, RunCounts, RunRequest, RunStatus, SettingKey,
    SyncSettings, TriggerKind,
};
use build_catalog_store::CatalogStore;
use build_catalog_sync::{CatalogService, SharedSettings, SyncOrchestrator};
use chrono::Utc;

fn active(store: &CatalogStore, provider_type: ProviderType) -> Vec<String> {
    store
        .list_active(Some(provider_type))
        .unwrap()
        .into_iter()
        .map(|d| d.version)
        .collect()
}

fn orchestrator(providers: &[Arc<ScriptedProvider>]) -> (SyncOrchestrator, Arc<CatalogStore>) {
    orchestrator_with(providers, SyncSettings::default())
}

fn orchestrator_with(
    providers: &[Arc<ScriptedProvider>],
    settings: SyncSettings,
) -> (SyncOrchestrator, Arc<CatalogStore>) {
    let store = Arc::new(CatalogStore::open_in_memory().unwrap());
    let adapters: Vec<Arc<dyn ProviderAdapter>> = providers
        .iter()
        .map(|p| Arc::clone(p) as Arc<dyn ProviderAdapter>)
        .collect();
    let orchestrator =
        SyncOrchestrator::new(Arc::clone(&store), adapters, SharedSettings::new(settings));
    (orchestrator, store)
}

/// Run limit of 60s with item calls allowed to outlast it.
fn short_run_limit() -> SyncSettings {
    SyncSettings::default()
        .with(SettingKey::ItemTimeoutSecs, 300)
        .unwrap()
        .with(SettingKey::TotalTimeoutSecs, 10)
        .unwrap()
        .with(SettingKey::RunTimeoutSecs, 60)
        .unwrap()
}

fn vanilla(versions: &[&str]) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::new(ProviderType::Vanilla).with_versions(versions))
}

#[tokio::test(start_paused = true)]
async fn second_identical_run_changes_nothing() {
    let provider = vanilla(&["1.21.6", "1.21.5"]);
    let (orchestrator, _store) = orchestrator(&[provider]);

    let first = orchestrator.run(RunRequest::scheduled()).await;
    let second = orchestrator.run(RunRequest::scheduled()).await;

    assert_eq!(first.counts, RunCounts::new(2, 0, 0));
    assert_eq!(second.counts, RunCounts::default());
    assert_eq!(second.status, Some(RunStatus::Success));
}

#[tokio::test(start_paused = true)]
async fn active_rows_track_the_latest_complete_fetch() {
    let provider = vanilla(&["1.21.6", "1.21.5"]);
    let (orchestrator, store) = orchestrator(&[Arc::clone(&provider)]);
    orchestrator.run(RunRequest::scheduled()).await;

    provider.set_versions(&["1.21.6"]);
    let result = orchestrator.run(RunRequest::scheduled()).await;

    assert_eq!(result.counts, RunCounts::new(0, 0, 1));
    assert_eq!(active(&store, ProviderType::Vanilla), vec!["1.21.6"]);
    let retired = store.get(ProviderType::Vanilla, "1.21.5").unwrap().unwrap();
    assert!(!retired.active);
}

#[tokio::test(start_paused = true)]
async fn failed_item_is_reported_and_others_are_kept() {
    let provider = vanilla(&["1.21.6", "1.21.5", "1.21.4"]);
    provider.fail("1.21.5", ProviderError::Network("connection reset".into()));
    let (orchestrator, store) = orchestrator(&[Arc::clone(&provider)]);

    let result = orchestrator.run(RunRequest::scheduled()).await;

    assert_eq!(result.status, Some(RunStatus::Partial));
    assert!(result.success);
    assert_eq!(result.counts, RunCounts::new(2, 0, 0));
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("vanilla 1.21.5: "));
    assert_eq!(active(&store, ProviderType::Vanilla), vec!["1.21.6", "1.21.4"]);
}

#[tokio::test(start_paused = true)]
async fn incomplete_fetch_does_not_deactivate() {
    let provider = vanilla(&["1.21.6", "1.21.5"]);
    let (orchestrator, store) = orchestrator(&[Arc::clone(&provider)]);
    orchestrator.run(RunRequest::scheduled()).await;

    provider.fail("1.21.5", ProviderError::Http {
        status: 502,
        url: "https://upstream.test/1.21.5".into(),
    });
    let result = orchestrator.run(RunRequest::scheduled()).await;

    assert_eq!(result.counts, RunCounts::default());
    assert_eq!(result.status, Some(RunStatus::Failed));
    assert_eq!(active(&store, ProviderType::Vanilla), vec!["1.21.6", "1.21.5"]);
}

#[tokio::test(start_paused = true)]
async fn deactivated_version_comes_back_under_same_identity() {
    let provider = vanilla(&["1.21.6", "1.21.5"]);
    let (orchestrator, store) = orchestrator(&[Arc::clone(&provider)]);
    orchestrator.run(RunRequest::scheduled()).await;

    provider.set_versions(&["1.21.6"]);
    orchestrator.run(RunRequest::scheduled()).await;

    provider.set_versions(&["1.21.6", "1.21.5"]);
    let result = orchestrator.run(RunRequest::scheduled()).await;

    assert_eq!(result.counts, RunCounts::new(0, 1, 0));
    assert_eq!(store.list_all(Some(ProviderType::Vanilla)).unwrap().len(), 2);
    assert_eq!(active(&store, ProviderType::Vanilla), vec!["1.21.6", "1.21.5"]);
}

#[tokio::test(start_paused = true)]
async fn provider_failure_does_not_stop_other_types() {
    let vanilla = vanilla(&["1.21.6"]);
    let paper = Arc::new(ScriptedProvider::new(ProviderType::Paper).with_versions(&["1.21.4"]));
    paper.fail_listing(ProviderError::Http {
        status: 503,
        url: "https://api.test/v2/projects/paper".into(),
    });
    let (orchestrator, store) = orchestrator(&[vanilla, paper]);

    let result = orchestrator.run(RunRequest::scheduled()).await;

    assert_eq!(result.status, Some(RunStatus::Partial));
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("paper: "));
    assert!(result.errors[0].contains("503"));
    assert_eq!(active(&store, ProviderType::Vanilla), vec!["1.21.6"]);
}

#[tokio::test(start_paused = true)]
async fn nothing_succeeding_is_a_failed_run() {
    let provider = vanilla(&["1.21.6"]);
    provider.fail_listing(ProviderError::Network("dns failure".into()));
    let (orchestrator, store) = orchestrator(&[provider]);

    let result = orchestrator.run(RunRequest::scheduled()).await;

    assert!(!result.success);
    assert_eq!(result.status, Some(RunStatus::Failed));
    let record = store.run(result.run_id.unwrap()).unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error_text.unwrap().contains("dns failure"));
}

#[tokio::test(start_paused = true)]
async fn unregistered_type_is_a_per_type_error() {
    let (orchestrator, _store) = orchestrator(&[vanilla(&["1.21.6"])]);

    let request = RunRequest::manual(None)
        .with_providers(vec![ProviderType::Vanilla, ProviderType::Forge]);
    let result = orchestrator.run(request).await;

    assert_eq!(result.status, Some(RunStatus::Partial));
    assert_eq!(result.errors, vec!["forge: no adapter configured".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_are_single_flight() {
    let provider = vanilla(&["1.21.6", "1.21.5"]);
    provider.delay_all(Duration::from_secs(2));
    let (orchestrator, store) = orchestrator(&[provider]);

    let (a, b) = tokio::join!(
        orchestrator.run(RunRequest::scheduled()),
        orchestrator.run(RunRequest::scheduled()),
    );

    let conflicts = [&a, &b].iter().filter(|r| r.is_conflict()).count();
    assert_eq!(conflicts, 1);
    let rejected = if a.is_conflict() { &a } else { &b };
    assert!(rejected.message.contains("already in progress"));
    assert_eq!(store.history(10, None).unwrap().len(), 1);
    assert!(!orchestrator.is_running());
}

#[tokio::test(start_paused = true)]
async fn forced_run_is_admitted_while_another_runs() {
    let provider = vanilla(&["1.21.6"]);
    provider.delay_all(Duration::from_secs(2));
    let (orchestrator, store) = orchestrator(&[provider]);

    let (a, b) = tokio::join!(
        orchestrator.run(RunRequest::scheduled()),
        orchestrator.run(RunRequest::manual(Some("ops".into()))),
    );

    assert!(!a.is_conflict());
    assert!(!b.is_conflict());
    assert_eq!(store.history(10, None).unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn run_timeout_fails_the_run_and_releases_the_guard() {
    let provider = vanilla(&["1.21.6"]);
    provider.delay("1.21.6", Duration::from_secs(120));
    let (orchestrator, store) = orchestrator_with(&[provider], short_run_limit());

    let result = orchestrator.run(RunRequest::scheduled()).await;

    assert_eq!(result.status, Some(RunStatus::Failed));
    let timeout = result
        .errors
        .iter()
        .find(|e| e.contains("run timed out"))
        .expect("timeout error");
    assert!(timeout.contains("run limit of 60s"), "{timeout}");
    assert!(timeout.contains("1 candidates listed"), "{timeout}");
    assert!(timeout.contains("concurrency 8"), "{timeout}");
    assert!(!orchestrator.is_running());
    assert!(store.list_all(None).unwrap().is_empty());
    let record = store.run(result.run_id.unwrap()).unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn run_timeout_keeps_types_finished_before_the_cutoff() {
    let vanilla = vanilla(&["1.21.6"]);
    let paper = Arc::new(
        ScriptedProvider::new(ProviderType::Paper).with_versions(&["1.21.4", "1.21.3"]),
    );
    paper.delay_all(Duration::from_secs(120));
    let (orchestrator, store) = orchestrator_with(&[vanilla, paper], short_run_limit());

    let result = orchestrator.run(RunRequest::scheduled()).await;

    assert_eq!(result.status, Some(RunStatus::Failed));
    assert_eq!(active(&store, ProviderType::Vanilla), vec!["1.21.6"]);
    assert!(store.list_all(Some(ProviderType::Paper)).unwrap().is_empty());
    assert!(
        result.errors[0].contains("3 candidates listed"),
        "{:?}",
        result.errors
    );

    // Listing and both started paper resolutions count even though cut off.
    let record = store.run(result.run_id.unwrap()).unwrap().unwrap();
    assert_eq!(record.external_calls, 5);
}

#[tokio::test(start_paused = true)]
async fn purge_runs_only_after_a_fully_successful_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    let store = Arc::new(CatalogStore::open(&path).unwrap());
    let provider = vanilla(&["1.21.6", "1.21.5"]);
    let settings = SyncSettings::default()
        .with(SettingKey::PurgeInactiveAfterDays, 30)
        .unwrap();
    let orchestrator = SyncOrchestrator::new(
        Arc::clone(&store),
        vec![Arc::clone(&provider) as Arc<dyn ProviderAdapter>],
        SharedSettings::new(settings),
    );

    orchestrator.run(RunRequest::scheduled()).await;
    provider.set_versions(&["1.21.6"]);
    orchestrator.run(RunRequest::scheduled()).await;

    let long_ago = (Utc::now() - chrono::Duration::days(60)).timestamp_millis();
    rusqlite::Connection::open(&path)
        .unwrap()
        .execute(
            "UPDATE versions SET updated_at = ?1 WHERE version = '1.21.5'",
            [long_ago],
        )
        .unwrap();

    provider.set_versions(&["1.21.8", "1.21.7", "1.21.6"]);
    provider.fail("1.21.8", ProviderError::Network("connection reset".into()));
    let partial = orchestrator.run(RunRequest::scheduled()).await;
    assert_eq!(partial.status, Some(RunStatus::Partial));
    assert!(store.get(ProviderType::Vanilla, "1.21.5").unwrap().is_some());

    provider.reset_behaviors();
    let success = orchestrator.run(RunRequest::scheduled()).await;
    assert_eq!(success.status, Some(RunStatus::Success));
    assert!(store.get(ProviderType::Vanilla, "1.21.5").unwrap().is_none());
    assert_eq!(active(&store, ProviderType::Vanilla), vec!["1.21.8", "1.21.7", "1.21.6"]);
}

#[tokio::test(start_paused = true)]
async fn panicking_adapter_leaves_a_finalized_failed_record() {
    let provider = vanilla(&["1.21.6"]);
    provider.panic_on("1.21.6");
    let (orchestrator, store) = orchestrator(&[provider]);

    let result = orchestrator.run(RunRequest::scheduled()).await;

    assert!(!result.success);
    assert!(result.errors[0].contains("panicked"));
    assert!(!orchestrator.is_running());
    let record = store.run(result.run_id.unwrap()).unwrap().unwrap();
    assert_ne!(record.status, RunStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn run_record_captures_trigger_scope_and_calls() {
    let provider = vanilla(&["1.21.6", "1.21.5"]);
    let (orchestrator, store) = orchestrator(&[provider]);

    let request = RunRequest::manual(Some("alice".into())).with_providers(vec![ProviderType::Vanilla]);
    let result = orchestrator.run(request).await;

    let record = store.run(result.run_id.unwrap()).unwrap().unwrap();
    assert_eq!(record.trigger, TriggerKind::Manual);
    assert_eq!(record.provider_type, Some(ProviderType::Vanilla));
    assert_eq!(record.actor.as_deref(), Some("alice"));
    assert_eq!(record.external_calls, 3);
    assert_eq!(record.status, RunStatus::Success);
    assert!(record.completed_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn interrupted_runs_are_recovered() {
    let (orchestrator, store) = orchestrator(&[vanilla(&["1.21.6"])]);
    let stale = store.start_run(TriggerKind::Scheduled, None, None).unwrap();

    assert_eq!(orchestrator.recover_interrupted_runs().unwrap(), 1);
    assert_eq!(store.run(stale).unwrap().unwrap().status, RunStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn assembled_scheduler_resumes_from_the_recorded_success() {
    let provider = vanilla(&["1.21.6"]);
    let settings = SyncSettings::default()
        .with(SettingKey::StartupGraceSecs, 0)
        .unwrap();
    let (orchestrator, store) = orchestrator_with(&[Arc::clone(&provider)], settings);
    let first = orchestrator.run(RunRequest::scheduled()).await;
    let recorded = store.run(first.run_id.unwrap()).unwrap().unwrap();

    let (service, mut scheduler) = CatalogService::assemble(Arc::new(orchestrator));
    assert_eq!(service.scheduler_status().last_success, recorded.completed_at);

    scheduler.start();
    tokio::time::sleep(Duration::from_secs(60)).await;
    scheduler.stop().await;

    assert_eq!(provider.resolve_calls(), 1);
    assert_eq!(store.history(10, None).unwrap().len(), 1);
}
