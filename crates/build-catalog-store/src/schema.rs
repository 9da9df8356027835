use rusqlite_migration::{M, Migrations};

pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "CREATE TABLE versions (
                provider_type   TEXT NOT NULL,
                version         TEXT NOT NULL,
                download_url    TEXT NOT NULL,
                released_at     INTEGER,
                stable          INTEGER NOT NULL DEFAULT 1,
                build_number    INTEGER,
                active          INTEGER NOT NULL DEFAULT 1,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL,
                PRIMARY KEY (provider_type, version)
            );

            CREATE INDEX idx_versions_active ON versions(provider_type, active);
            CREATE INDEX idx_versions_inactive_age ON versions(active, updated_at);",
        ),
        M::up(
            "CREATE TABLE sync_runs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                trigger_kind    TEXT NOT NULL,
                provider_type   TEXT,
                added           INTEGER NOT NULL DEFAULT 0,
                updated         INTEGER NOT NULL DEFAULT 0,
                removed         INTEGER NOT NULL DEFAULT 0,
                external_calls  INTEGER NOT NULL DEFAULT 0,
                duration_ms     INTEGER,
                status          TEXT NOT NULL,
                error_text      TEXT,
                actor           TEXT,
                started_at      INTEGER NOT NULL,
                completed_at    INTEGER
            );

            CREATE INDEX idx_sync_runs_started ON sync_runs(started_at);
            CREATE INDEX idx_sync_runs_status ON sync_runs(status);",
        ),
    ])
}
