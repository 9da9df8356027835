use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use build_catalog::version;
use build_catalog::{
    CatalogError, CatalogReader, ProviderType, RunCounts, RunStatus, RunSummary, SyncRunRecord,
    TriggerKind, VersionDescriptor,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::schema;

const VERSION_COLUMNS: &str = "provider_type, version, download_url, released_at, stable,
     build_number, active, created_at, updated_at";

const RUN_COLUMNS: &str = "id, trigger_kind, provider_type, added, updated, removed,
     external_calls, duration_ms, status, error_text, actor, started_at, completed_at";

/// Result of writing one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Metadata drifted or the row was reactivated.
    Updated,
    Unchanged,
}

/// A SQLite-backed catalog of version descriptors plus the sync run log.
pub struct CatalogStore {
    conn: Mutex<Connection>,
}

impl CatalogStore {
    /// Open a store backed by a file on disk.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&mut self) -> Result<(), StoreError> {
        let conn = self.conn.get_mut().unwrap();
        schema::migrations()
            .to_latest(conn)
            .map_err(|e| StoreError::Migration(e.to_string()))
    }

    /// Point lookup by identity. Inactive rows are returned too.
    pub fn get(
        &self,
        provider_type: ProviderType,
        version: &str,
    ) -> Result<Option<VersionDescriptor>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(get_in(&conn, provider_type, version)?)
    }

    /// Active descriptors, newest version first, optionally for one type.
    pub fn list_active(
        &self,
        provider_type: Option<ProviderType>,
    ) -> Result<Vec<VersionDescriptor>, StoreError> {
        self.list(provider_type, true)
    }

    /// Every descriptor including inactive ones, newest version first.
    pub fn list_all(
        &self,
        provider_type: Option<ProviderType>,
    ) -> Result<Vec<VersionDescriptor>, StoreError> {
        self.list(provider_type, false)
    }

    fn list(
        &self,
        provider_type: Option<ProviderType>,
        active_only: bool,
    ) -> Result<Vec<VersionDescriptor>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let active_clause = if active_only { "active = 1" } else { "1 = 1" };
        let mut descriptors = match provider_type {
            Some(provider_type) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {VERSION_COLUMNS} FROM versions
                     WHERE provider_type = ?1 AND {active_clause}"
                ))?;
                let rows = stmt.query_map([provider_type.as_str()], row_to_descriptor)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {VERSION_COLUMNS} FROM versions WHERE {active_clause}"
                ))?;
                let rows = stmt.query_map([], row_to_descriptor)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };

        descriptors.sort_by(|a, b| {
            a.provider_type
                .cmp(&b.provider_type)
                .then_with(|| version::newest_first(&a.version, &b.version))
        });
        Ok(descriptors)
    }

    /// Insert a new row, or refresh an existing one and force it active.
    pub fn upsert(&self, descriptor: &VersionDescriptor) -> Result<UpsertOutcome, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(upsert_in(&conn, descriptor, Utc::now())?)
    }

    /// Deactivate every active row of `provider_type` whose version is not in
    /// `keep`. Other provider types are untouched. Returns the affected count.
    pub fn deactivate_not_in(
        &self,
        provider_type: ProviderType,
        keep: &HashSet<String>,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let removed = deactivate_in(&tx, provider_type, keep, Utc::now())?;
        tx.commit()?;
        Ok(removed)
    }

    /// Apply one provider's fetch result atomically: upsert every descriptor,
    /// then (if `deactivate_missing`) deactivate active rows not among them.
    pub fn reconcile(
        &self,
        provider_type: ProviderType,
        descriptors: &[VersionDescriptor],
        deactivate_missing: bool,
    ) -> Result<RunCounts, StoreError> {
        if let Some(foreign) = descriptors.iter().find(|d| d.provider_type != provider_type) {
            return Err(StoreError::ProviderMismatch {
                expected: provider_type,
                found: foreign.provider_type,
            });
        }

        let now = Utc::now();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut counts = RunCounts::default();
        for descriptor in descriptors {
            match upsert_in(&tx, descriptor, now)? {
                UpsertOutcome::Inserted => counts.added += 1,
                UpsertOutcome::Updated => counts.updated += 1,
                UpsertOutcome::Unchanged => {}
            }
        }

        if deactivate_missing {
            let keep: HashSet<String> = descriptors.iter().map(|d| d.version.clone()).collect();
            counts.removed = deactivate_in(&tx, provider_type, &keep, now)?;
        }

        tx.commit()?;
        debug!("Reconciled {}: {}", provider_type, counts);
        Ok(counts)
    }

    /// Hard-delete inactive rows last touched more than `age` ago.
    pub fn purge_inactive_older_than(&self, age: Duration) -> Result<u64, StoreError> {
        let age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.purge_inactive_before(cutoff)
    }

    /// Hard-delete inactive rows whose last update is before `cutoff`.
    pub fn purge_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM versions WHERE active = 0 AND updated_at < ?1",
            [cutoff.timestamp_millis()],
        )?;
        if deleted > 0 {
            info!("Purged {} long-inactive versions", deleted);
        }
        Ok(deleted as u64)
    }

    /// Create a run record in `running` state and return its id.
    pub fn start_run(
        &self,
        trigger: TriggerKind,
        scope: Option<ProviderType>,
        actor: Option<&str>,
    ) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_runs (trigger_kind, provider_type, status, actor, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                trigger.as_str(),
                scope.map(|p| p.as_str()),
                RunStatus::Running.as_str(),
                actor,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Finalize a running record. A record can only be finalized once.
    pub fn finish_run(&self, run_id: i64, summary: &RunSummary) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE sync_runs
             SET added = ?1, updated = ?2, removed = ?3, external_calls = ?4,
                 duration_ms = ?5, status = ?6, error_text = ?7, completed_at = ?8
             WHERE id = ?9 AND status = ?10",
            params![
                summary.counts.added as i64,
                summary.counts.updated as i64,
                summary.counts.removed as i64,
                summary.external_calls as i64,
                summary.duration.as_millis() as i64,
                summary.status.as_str(),
                summary.error_text(),
                Utc::now().timestamp_millis(),
                run_id,
                RunStatus::Running.as_str(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::RunNotRunning(run_id));
        }
        Ok(())
    }

    pub fn run(&self, run_id: i64) -> Result<Option<SyncRunRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM sync_runs WHERE id = ?1"),
                [run_id],
                row_to_run,
            )
            .optional()?;
        Ok(record)
    }

    /// Most recent runs first. Filtering by type also matches runs that
    /// covered every type.
    pub fn history(
        &self,
        limit: usize,
        provider_type: Option<ProviderType>,
    ) -> Result<Vec<SyncRunRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let limit = limit as i64;

        let records = match provider_type {
            Some(provider_type) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RUN_COLUMNS} FROM sync_runs
                     WHERE provider_type = ?1 OR provider_type IS NULL
                     ORDER BY started_at DESC, id DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![provider_type.as_str(), limit], row_to_run)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RUN_COLUMNS} FROM sync_runs
                     ORDER BY started_at DESC, id DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map([limit], row_to_run)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(records)
    }

    /// The newest run that finished as success or partial.
    pub fn latest_success(&self) -> Result<Option<SyncRunRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM sync_runs
                     WHERE status IN (?1, ?2)
                     ORDER BY completed_at DESC, id DESC LIMIT 1"
                ),
                params![RunStatus::Success.as_str(), RunStatus::Partial.as_str()],
                row_to_run,
            )
            .optional()?;
        Ok(record)
    }

    /// Fail runs left in `running` by a process that died mid-run.
    /// Call once at startup, before any new run begins.
    pub fn mark_stale_runs_failed(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE sync_runs SET status = ?1, completed_at = ?2, error_text = ?3
             WHERE status = ?4",
            params![
                RunStatus::Failed.as_str(),
                Utc::now().timestamp_millis(),
                "run was interrupted (process restart)",
                RunStatus::Running.as_str(),
            ],
        )?;
        Ok(count as u64)
    }
}

#[async_trait::async_trait]
impl CatalogReader for CatalogStore {
    async fn active_versions(
        &self,
        provider_type: Option<ProviderType>,
    ) -> Result<Vec<VersionDescriptor>, CatalogError> {
        self.list_active(provider_type)
            .map_err(|e| CatalogError::Unavailable(e.to_string()))
    }

    async fn version(
        &self,
        provider_type: ProviderType,
        version: &str,
    ) -> Result<Option<VersionDescriptor>, CatalogError> {
        self.get(provider_type, version)
            .map_err(|e| CatalogError::Unavailable(e.to_string()))
    }
}

fn get_in(
    conn: &Connection,
    provider_type: ProviderType,
    version: &str,
) -> rusqlite::Result<Option<VersionDescriptor>> {
    conn.query_row(
        &format!(
            "SELECT {VERSION_COLUMNS} FROM versions WHERE provider_type = ?1 AND version = ?2"
        ),
        params![provider_type.as_str(), version],
        row_to_descriptor,
    )
    .optional()
}

fn upsert_in(
    conn: &Connection,
    descriptor: &VersionDescriptor,
    now: DateTime<Utc>,
) -> rusqlite::Result<UpsertOutcome> {
    let existing = get_in(conn, descriptor.provider_type, &descriptor.version)?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO versions
                    (provider_type, version, download_url, released_at, stable,
                     build_number, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
                params![
                    descriptor.provider_type.as_str(),
                    descriptor.version,
                    descriptor.download_url,
                    descriptor.released_at.map(|t| t.timestamp_millis()),
                    descriptor.stable,
                    descriptor.build_number,
                    now.timestamp_millis(),
                ],
            )?;
            Ok(UpsertOutcome::Inserted)
        }
        Some(row) if row.active && !row.metadata_differs(descriptor) => {
            Ok(UpsertOutcome::Unchanged)
        }
        Some(_) => {
            conn.execute(
                "UPDATE versions
                 SET download_url = ?1, released_at = ?2, stable = ?3, build_number = ?4,
                     active = 1, updated_at = ?5
                 WHERE provider_type = ?6 AND version = ?7",
                params![
                    descriptor.download_url,
                    descriptor.released_at.map(|t| t.timestamp_millis()),
                    descriptor.stable,
                    descriptor.build_number,
                    now.timestamp_millis(),
                    descriptor.provider_type.as_str(),
                    descriptor.version,
                ],
            )?;
            Ok(UpsertOutcome::Updated)
        }
    }
}

fn deactivate_in(
    conn: &Connection,
    provider_type: ProviderType,
    keep: &HashSet<String>,
    now: DateTime<Utc>,
) -> rusqlite::Result<u64> {
    let active: Vec<String> = {
        let mut stmt =
            conn.prepare("SELECT version FROM versions WHERE provider_type = ?1 AND active = 1")?;
        let rows = stmt.query_map([provider_type.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let mut stmt = conn.prepare(
        "UPDATE versions SET active = 0, updated_at = ?1
         WHERE provider_type = ?2 AND version = ?3",
    )?;

    let mut removed = 0u64;
    for version in active.iter().filter(|v| !keep.contains(*v)) {
        removed += stmt.execute(params![
            now.timestamp_millis(),
            provider_type.as_str(),
            version
        ])? as u64;
    }
    Ok(removed)
}

fn row_to_descriptor(row: &rusqlite::Row) -> rusqlite::Result<VersionDescriptor> {
    let provider_str: String = row.get(0)?;
    let provider_type = ProviderType::parse(&provider_str)
        .ok_or_else(|| invalid_text(0, &provider_str))?;
    let released_at: Option<i64> = row.get(3)?;

    Ok(VersionDescriptor {
        provider_type,
        version: row.get(1)?,
        download_url: row.get(2)?,
        released_at: released_at.map(from_millis),
        stable: row.get(4)?,
        build_number: row.get(5)?,
        active: row.get(6)?,
        created_at: from_millis(row.get(7)?),
        updated_at: from_millis(row.get(8)?),
    })
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<SyncRunRecord> {
    let trigger_str: String = row.get(1)?;
    let provider_str: Option<String> = row.get(2)?;
    let status_str: String = row.get(8)?;
    let duration_ms: Option<i64> = row.get(7)?;
    let completed_at: Option<i64> = row.get(12)?;

    let trigger = TriggerKind::parse(&trigger_str).ok_or_else(|| invalid_text(1, &trigger_str))?;
    let status = RunStatus::parse(&status_str).ok_or_else(|| invalid_text(8, &status_str))?;
    let provider_type = match provider_str {
        Some(s) => Some(ProviderType::parse(&s).ok_or_else(|| invalid_text(2, &s))?),
        None => None,
    };

    Ok(SyncRunRecord {
        id: row.get(0)?,
        trigger,
        provider_type,
        counts: RunCounts::new(
            row.get::<_, i64>(3)? as u64,
            row.get::<_, i64>(4)? as u64,
            row.get::<_, i64>(5)? as u64,
        ),
        external_calls: row.get::<_, i64>(6)? as u64,
        duration: duration_ms.map(|ms| Duration::from_millis(ms.max(0) as u64)),
        status,
        error_text: row.get(9)?,
        actor: row.get(10)?,
        started_at: from_millis(row.get(11)?),
        completed_at: completed_at.map(from_millis),
    })
}

fn invalid_text(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unexpected value: {value}").into(),
    )
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Errors specific to store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("run {0} is not running")]
    RunNotRunning(i64),

    #[error("descriptor for {found} passed to {expected} reconciliation")]
    ProviderMismatch {
        expected: ProviderType,
        found: ProviderType,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
