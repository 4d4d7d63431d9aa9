//! SQLite persistence layer backing the ledger, task history, and scheduler.
//!
//! In-process state (`CostLedger`, `TaskHistory`, `Scheduler`) is the source
//! of truth for request-path reads; this layer exists so that state
//! survives a process restart and so monitoring/history queries can run
//! over data older than what's held in memory.

mod schema;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

pub use schema::SCHEMA;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntryRow {
    pub id: i64,
    pub tenant_id: String,
    pub model: String,
    pub cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskHistoryRow {
    pub id: String,
    pub agent_type: String,
    pub platform: String,
    pub success: bool,
    pub execution_ms: i64,
    pub cost_usd: f64,
    pub temperature: f64,
    pub content: String,
    pub completed_at: DateTime<Utc>,
    pub feedback_json: Option<String>,
    pub learning_json: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ScheduledJobRow {
    pub id: String,
    pub business_key: String,
    pub state: String,
    pub attempts: i64,
    pub next_run_at: DateTime<Utc>,
    pub leased_at: Option<DateTime<Utc>>,
}

pub struct PersistenceLayer {
    pool: SqlitePool,
}

impl PersistenceLayer {
    pub async fn connect(database_url: &str) -> PersistenceResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(8).connect_with(options).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn record_ledger_entry(
        &self,
        tenant_id: &str,
        model: &str,
        cost_usd: f64,
        recorded_at: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        sqlx::query("INSERT INTO ledger_entries (tenant_id, model, cost_usd, recorded_at) VALUES (?, ?, ?, ?)")
            .bind(tenant_id)
            .bind(model)
            .bind(cost_usd)
            .bind(recorded_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn ledger_entries_for_tenant(&self, tenant_id: &str) -> PersistenceResult<Vec<LedgerEntryRow>> {
        let rows = sqlx::query_as::<_, LedgerEntryRow>(
            "SELECT id, tenant_id, model, cost_usd, recorded_at FROM ledger_entries WHERE tenant_id = ? ORDER BY recorded_at",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn record_task_history(&self, row: &TaskHistoryRow) -> PersistenceResult<()> {
        sqlx::query(
            "INSERT INTO task_history (id, agent_type, platform, success, execution_ms, cost_usd, temperature, content, completed_at, feedback_json, learning_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.agent_type)
        .bind(&row.platform)
        .bind(row.success)
        .bind(row.execution_ms)
        .bind(row.cost_usd)
        .bind(row.temperature)
        .bind(&row.content)
        .bind(row.completed_at)
        .bind(&row.feedback_json)
        .bind(&row.learning_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_scheduled_job(&self, job: &ScheduledJobRow) -> PersistenceResult<()> {
        sqlx::query(
            "INSERT INTO scheduled_jobs (id, business_key, state, attempts, next_run_at, leased_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(business_key) DO UPDATE SET
                state = excluded.state,
                attempts = excluded.attempts,
                next_run_at = excluded.next_run_at,
                leased_at = excluded.leased_at",
        )
        .bind(&job.id)
        .bind(&job.business_key)
        .bind(&job.state)
        .bind(job.attempts)
        .bind(job.next_run_at)
        .bind(job.leased_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn due_scheduled_jobs(&self, now: DateTime<Utc>) -> PersistenceResult<Vec<ScheduledJobRow>> {
        let rows = sqlx::query_as::<_, ScheduledJobRow>(
            "SELECT id, business_key, state, attempts, next_run_at, leased_at FROM scheduled_jobs
             WHERE state = 'Pending' AND next_run_at <= ?",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_applies_schema_and_round_trips_a_ledger_entry() {
        let layer = PersistenceLayer::connect("sqlite::memory:").await.unwrap();
        layer
            .record_ledger_entry("tenant-a", "claude-haiku-4", 0.01, Utc::now())
            .await
            .unwrap();
        let entries = layer.ledger_entries_for_tenant("tenant-a").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].model, "claude-haiku-4");
    }

    #[tokio::test]
    async fn scheduled_job_upsert_is_keyed_by_business_key() {
        let layer = PersistenceLayer::connect("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let job = ScheduledJobRow {
            id: "job-1".to_string(),
            business_key: "publish:post-42".to_string(),
            state: "Pending".to_string(),
            attempts: 0,
            next_run_at: now,
            leased_at: None,
        };
        layer.upsert_scheduled_job(&job).await.unwrap();

        let mut retried = job.clone();
        retried.id = "job-2".to_string();
        retried.attempts = 1;
        layer.upsert_scheduled_job(&retried).await.unwrap();

        let due = layer.due_scheduled_jobs(now + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
    }
}
