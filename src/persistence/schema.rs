//! Raw SQL schema for the SQLite persistence layer.

pub const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS ledger_entries (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id   TEXT NOT NULL,
    model       TEXT NOT NULL,
    cost_usd    REAL NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_entries_tenant_time
    ON ledger_entries (tenant_id, recorded_at);

CREATE TABLE IF NOT EXISTS ledger_month_sums (
    tenant_id          TEXT NOT NULL,
    month              TEXT NOT NULL,
    total_usd          REAL NOT NULL DEFAULT 0,
    alerted_threshold  INTEGER NOT NULL DEFAULT 0,
    alerted_exceeded   INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (tenant_id, month)
);

CREATE TABLE IF NOT EXISTS task_history (
    id             TEXT PRIMARY KEY,
    agent_type     TEXT NOT NULL,
    platform       TEXT NOT NULL,
    success        INTEGER NOT NULL,
    execution_ms   INTEGER NOT NULL,
    cost_usd       REAL NOT NULL,
    temperature    REAL NOT NULL,
    content        TEXT NOT NULL DEFAULT '',
    completed_at   TEXT NOT NULL,
    feedback_json  TEXT,
    learning_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_task_history_agent_time
    ON task_history (agent_type, completed_at);

CREATE TABLE IF NOT EXISTS scheduled_jobs (
    id            TEXT PRIMARY KEY,
    business_key  TEXT NOT NULL UNIQUE,
    state         TEXT NOT NULL,
    attempts      INTEGER NOT NULL DEFAULT 0,
    next_run_at   TEXT NOT NULL,
    leased_at     TEXT
);

CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_state_next_run
    ON scheduled_jobs (state, next_run_at);
"#;
