use std::sync::{Arc, Mutex};
use std::time::Duration;

use build_catalog::{
    RunRequest, RunResult, SettingKey, SettingsError, SyncSettings, TriggerKind,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::settings::SharedSettings;

/// Upper bound on one idle sleep, so setting changes are picked up promptly.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Something that can execute a synchronization run.
#[async_trait::async_trait]
pub trait SyncRunner: Send + Sync {
    async fn run(&self, request: RunRequest) -> RunResult;

    /// Whether a run is executing right now.
    fn is_running(&self) -> bool;
}

#[async_trait::async_trait]
impl<T: SyncRunner + ?Sized> SyncRunner for Arc<T> {
    async fn run(&self, request: RunRequest) -> RunResult {
        (**self).run(request).await
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}

/// `base × 2^(attempt − 1)`, saturating.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

/// Point-in-time view of the scheduler for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub sync_in_progress: bool,
    pub interval: Duration,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// `None` while the scheduler is stopped.
    pub next_due: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    running: bool,
    started_at: Option<Instant>,
    startup_run_done: bool,
    last_success: Option<DateTime<Utc>>,
    last_success_at: Option<Instant>,
    last_error: Option<String>,
    /// When the last retry cycle gave up.
    exhausted_at: Option<Instant>,
}

/// How a due cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleEnd {
    Finished,
    /// Another run held the single-flight slot; nothing was attempted.
    Busy,
}

impl SchedulerState {
    /// Earliest instant the next scheduled cycle may start.
    fn due_at(&self, settings: &SyncSettings) -> Option<Instant> {
        let started_at = self.started_at?;
        let grace_over = started_at + settings.startup_grace();

        let anchor = match (self.last_success_at, self.exhausted_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        Some(match anchor {
            Some(anchor) => grace_over.max(anchor + settings.update_interval()),
            None => grace_over,
        })
    }

    fn record(&mut self, result: &RunResult) {
        if result.success {
            self.last_success = Some(Utc::now());
            self.last_success_at = Some(Instant::now());
            self.exhausted_at = None;
            self.last_error = if result.errors.is_empty() {
                None
            } else {
                Some(result.errors.join("; "))
            };
        } else {
            self.last_error = Some(if result.errors.is_empty() {
                result.message.clone()
            } else {
                result.errors.join("; ")
            });
        }
    }
}

struct Shared {
    runner: Arc<dyn SyncRunner>,
    settings: SharedSettings,
    state: Mutex<SchedulerState>,
}

impl Shared {
    fn due_at(&self) -> Option<Instant> {
        let settings = self.settings.snapshot();
        self.state.lock().unwrap().due_at(&settings)
    }

    fn next_request(&self) -> RunRequest {
        let mut state = self.state.lock().unwrap();
        if state.startup_run_done {
            RunRequest::scheduled()
        } else {
            state.startup_run_done = true;
            RunRequest::startup()
        }
    }

    /// A rejected conflicting run leaves the state untouched.
    async fn run_and_record(&self, request: RunRequest) -> RunResult {
        let result = self.runner.run(request).await;
        if !result.is_conflict() {
            self.state.lock().unwrap().record(&result);
        }
        result
    }

    /// One due cycle: try up to `retry_attempts` times with exponential
    /// backoff. Returns early if cancelled while waiting, or without retrying
    /// if another run is already in progress.
    async fn run_cycle(&self, token: &CancellationToken) -> CycleEnd {
        let settings = self.settings.snapshot();
        let attempts = settings.retry_attempts();
        let base = settings.retry_base_delay();

        for attempt in 1..=attempts {
            let request = self.next_request();
            let trigger = request.trigger;
            let result = self.run_and_record(request).await;

            if result.is_conflict() {
                info!("{} sync skipped: another run is in progress", trigger);
                if trigger == TriggerKind::Startup {
                    self.state.lock().unwrap().startup_run_done = false;
                }
                return CycleEnd::Busy;
            }

            if result.success {
                debug!("{} sync succeeded on attempt {}/{}", trigger, attempt, attempts);
                return CycleEnd::Finished;
            }

            if attempt == attempts {
                break;
            }

            let delay = backoff_delay(base, attempt);
            warn!(
                "{} sync attempt {}/{} failed: {}; retrying in {:?}",
                trigger, attempt, attempts, result.message, delay
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => {
                    info!("Scheduler stopped during retry backoff");
                    return CycleEnd::Finished;
                }
            }
        }

        error!(
            "Sync failed after {} attempts; waiting for the next interval",
            attempts
        );
        self.state.lock().unwrap().exhausted_at = Some(Instant::now());
        CycleEnd::Finished
    }
}

/// Background loop that keeps the catalog fresh.
pub struct Scheduler {
    shared: Arc<Shared>,
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn SyncRunner>, settings: SharedSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                runner,
                settings,
                state: Mutex::new(SchedulerState::default()),
            }),
            token: None,
            task: None,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Spawn the loop. Returns false if it is already running.
    pub fn start(&mut self) -> bool {
        if self.task.is_some() {
            return false;
        }

        {
            let mut state = self.shared.state.lock().unwrap();
            state.running = true;
            state.started_at = Some(Instant::now());
            state.startup_run_done = false;
        }

        let token = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        self.task = Some(tokio::spawn(run_loop(shared, token.clone())));
        self.token = Some(token);
        true
    }

    /// Treat `at` as the most recent successful run, such as one recorded
    /// before a restart. The next cycle is then due one interval after `at`.
    pub fn seed_last_success(&self, at: DateTime<Utc>) {
        let age = (Utc::now() - at).to_std().unwrap_or_default();
        let mut state = self.shared.state.lock().unwrap();
        state.last_success = Some(at);
        // Older than the monotonic clock can express means long overdue.
        state.last_success_at = Instant::now().checked_sub(age);
    }

    /// Cancel the loop and wait for it to exit. A run already in progress
    /// is allowed to finish first.
    pub async fn stop(&mut self) {
        let (Some(token), Some(task)) = (self.token.take(), self.task.take()) else {
            return;
        };

        token.cancel();
        if let Err(e) = task.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
        self.shared.state.lock().unwrap().running = false;
    }
}

async fn run_loop(shared: Arc<Shared>, token: CancellationToken) {
    let settings = shared.settings.snapshot();
    info!(
        "Scheduler started (interval {:?}, startup grace {:?})",
        settings.update_interval(),
        settings.startup_grace()
    );

    loop {
        if token.is_cancelled() {
            break;
        }

        let now = Instant::now();
        let due_at = shared.due_at().unwrap_or(now);
        if due_at <= now {
            if shared.run_cycle(&token).await == CycleEnd::Busy {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = token.cancelled() => break,
                }
            }
            continue;
        }

        let wait = (due_at - now).min(POLL_INTERVAL);
        debug!("Next sync due in {:?}", due_at - now);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = token.cancelled() => break,
        }
    }

    info!("Scheduler stopped");
}

/// Cloneable access to a scheduler's state and controls.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Run immediately, outside the due-check. Updates the same
    /// last-success and last-error state the loop consults.
    pub async fn trigger(&self, request: RunRequest) -> RunResult {
        info!(
            "Manual {} sync requested (force: {})",
            request.trigger, request.force_refresh
        );
        self.shared.run_and_record(request).await
    }

    pub fn status(&self) -> SchedulerStatus {
        let settings = self.shared.settings.snapshot();
        let state = self.shared.state.lock().unwrap();

        let next_due = if state.running {
            state.due_at(&settings).map(|due| {
                let remaining = due.saturating_duration_since(Instant::now());
                Utc::now() + chrono::Duration::from_std(remaining).unwrap_or_default()
            })
        } else {
            None
        };

        SchedulerStatus {
            running: state.running,
            sync_in_progress: self.shared.runner.is_running(),
            interval: settings.update_interval(),
            last_success: state.last_success,
            last_error: state.last_error.clone(),
            next_due,
        }
    }

    pub fn settings(&self) -> SyncSettings {
        self.shared.settings.snapshot()
    }

    pub fn update_setting(&self, key: SettingKey, value: u64) -> Result<(), SettingsError> {
        self.shared.settings.update(key, value)
    }
}
