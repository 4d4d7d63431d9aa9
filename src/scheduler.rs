//! Scheduler (C11).
//!
//! Jobs are keyed by a caller-supplied business key so re-scheduling the
//! same logical job (e.g. "publish post 42") is a no-op rather than a
//! duplicate. A background sweep runs every `sweep_interval` and picks up
//! jobs whose `next_run_at` is due or whose `running` lease is older than
//! `sweep_overdue` (the crash-recovery path: a worker that died mid-run
//! leaves a job `Running` forever without the sweep).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc, Weekday};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::persistence::{PersistenceLayer, ScheduledJobRow};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECONDS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub business_key: String,
    pub state: JobState,
    pub attempts: u32,
    pub next_run_at: DateTime<Utc>,
    pub leased_at: Option<DateTime<Utc>>,
}

pub struct SchedulerConfig {
    pub sweep_interval: Duration,
    pub sweep_overdue: Duration,
}

struct Store {
    jobs: HashMap<String, ScheduledJob>,
    by_business_key: HashMap<String, String>,
}

pub struct Scheduler {
    store: Mutex<Store>,
    config: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
    workers: RwLock<Vec<JoinHandle<()>>>,
    persistence: Option<Arc<PersistenceLayer>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            store: Mutex::new(Store {
                jobs: HashMap::new(),
                by_business_key: HashMap::new(),
            }),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: RwLock::new(Vec::new()),
            persistence: None,
        }
    }

    /// Attaches a durable store: job state transitions are mirrored to
    /// SQLite in the background, best-effort, so a restarted process can
    /// reload due jobs via `due_scheduled_jobs`.
    pub fn with_persistence(mut self, persistence: Arc<PersistenceLayer>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    fn persist_job(&self, job: &ScheduledJob) {
        let Some(persistence) = self.persistence.clone() else {
            return;
        };
        let row = ScheduledJobRow {
            id: job.id.clone(),
            business_key: job.business_key.clone(),
            state: format!("{:?}", job.state),
            attempts: job.attempts as i64,
            next_run_at: job.next_run_at,
            leased_at: job.leased_at,
        };
        tokio::spawn(async move {
            if let Err(err) = persistence.upsert_scheduled_job(&row).await {
                tracing::warn!(%err, "failed to persist scheduled job");
            }
        });
    }

    /// Schedules a job for `business_key`. If a job with the same key
    /// already exists and hasn't terminated, this is a no-op that returns
    /// the existing job's id.
    pub fn schedule(&self, business_key: &str, id: String, run_at: DateTime<Utc>) -> String {
        let mut store = self.store.lock();
        if let Some(existing_id) = store.by_business_key.get(business_key) {
            if let Some(existing) = store.jobs.get(existing_id) {
                if !matches!(existing.state, JobState::Succeeded | JobState::Failed) {
                    return existing_id.clone();
                }
            }
        }

        let job = ScheduledJob {
            id: id.clone(),
            business_key: business_key.to_string(),
            state: JobState::Pending,
            attempts: 0,
            next_run_at: run_at,
            leased_at: None,
        };
        self.persist_job(&job);
        store.jobs.insert(id.clone(), job);
        store.by_business_key.insert(business_key.to_string(), id.clone());
        id
    }

    pub fn cancel(&self, id: &str) -> bool {
        self.store.lock().jobs.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<ScheduledJob> {
        self.store.lock().jobs.get(id).cloned()
    }

    /// One sweep pass: claims every job that's due or whose lease looks
    /// abandoned, marking it `Running`. Returns the claimed jobs for the
    /// caller to actually execute.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        let mut store = self.store.lock();
        let overdue = chrono::Duration::from_std(self.config.sweep_overdue).unwrap_or_default();
        let mut claimed = Vec::new();

        for job in store.jobs.values_mut() {
            let lease_abandoned = matches!(job.state, JobState::Running)
                && job.leased_at.map(|leased| now - leased > overdue).unwrap_or(false);
            let due = matches!(job.state, JobState::Pending) && job.next_run_at <= now;

            if due || lease_abandoned {
                if lease_abandoned {
                    warn!(job_id = %job.id, "reclaiming job with abandoned lease");
                }
                job.state = JobState::Running;
                job.leased_at = Some(now);
                claimed.push(job.clone());
            }
        }
        if !claimed.is_empty() {
            info!(claimed = claimed.len(), "sweep claimed jobs");
        }
        for job in &claimed {
            self.persist_job(job);
        }
        claimed
    }

    /// Records the outcome of a claimed job. On failure, reschedules with
    /// exponential backoff up to `MAX_ATTEMPTS`, after which the job is
    /// marked terminally `Failed`.
    pub fn complete(&self, id: &str, success: bool, now: DateTime<Utc>) {
        let mut store = self.store.lock();
        let Some(job) = store.jobs.get_mut(id) else {
            return;
        };

        if success {
            job.state = JobState::Succeeded;
            job.leased_at = None;
            self.persist_job(job);
            return;
        }

        job.attempts += 1;
        if job.attempts >= MAX_ATTEMPTS {
            job.state = JobState::Failed;
            job.leased_at = None;
            self.persist_job(job);
            return;
        }

        let delay = backoff_delay(job.attempts);
        job.state = JobState::Pending;
        job.next_run_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
        job.leased_at = None;
        self.persist_job(job);
    }

    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let mut workers = self.workers.write().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// `base * 2^(attempt-1)` seconds, plus up to 1 second of jitter so retries
/// across many jobs don't all land on the same tick.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_SECONDS * 2u64.pow(attempt.saturating_sub(1));
    let jitter_ms = rand::thread_rng().gen_range(0..1000);
    Duration::from_secs(base) + Duration::from_millis(jitter_ms)
}

/// Evergreen rotation priority: content freshly published is held back,
/// content that has aged without a repost rises towards the front of the
/// rotation, and posts reposted often are penalized so the same evergreen
/// piece doesn't dominate every cycle.
///
/// `priority = 100 - min(50, max(0, 50 - days_since_last_publish)) - min(30, 3 * publish_count)`
pub fn evergreen_priority(days_since_last_publish: f64, publish_count: u32) -> f64 {
    let freshness_penalty = (50.0 - days_since_last_publish).max(0.0).min(50.0);
    let repetition_penalty = (3.0 * publish_count as f64).min(30.0);
    (100.0 - freshness_penalty - repetition_penalty).clamp(0.0, 100.0)
}

pub fn hour_bucket(at: DateTime<Utc>) -> u32 {
    at.hour()
}

/// `(day_of_week, hour)` bucket for a timestamp, the key the optimal-time
/// scorer groups historical engagement by.
pub fn day_hour_bucket(at: DateTime<Utc>) -> (Weekday, u32) {
    (at.weekday(), at.hour())
}

/// A scored posting slot: a day-of-week/hour pair and its relative
/// engagement score on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSlot {
    pub day_of_week: Weekday,
    pub hour: u32,
    pub score: f64,
}

/// Scores every `(day_of_week, hour)` bucket with recorded history as
/// `100 * avg_engagement / max_avg_engagement` and returns the top 20,
/// highest score first. With no history at all, falls back to a fixed
/// sequence known to perform well across platforms: Tuesday/Wednesday/
/// Thursday at 10:00 and 14:00, plus Monday and Friday at 10:00.
pub fn optimal_time_slots(history: &HashMap<(Weekday, u32), f64>) -> Vec<TimeSlot> {
    let max_avg = history.values().cloned().fold(0.0_f64, f64::max);
    if history.is_empty() || max_avg <= 0.0 {
        return default_time_slots();
    }

    let mut slots: Vec<TimeSlot> = history
        .iter()
        .map(|(&(day_of_week, hour), &avg_engagement)| TimeSlot {
            day_of_week,
            hour,
            score: 100.0 * avg_engagement / max_avg,
        })
        .collect();
    slots.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    slots.truncate(20);
    slots
}

fn default_time_slots() -> Vec<TimeSlot> {
    use Weekday::*;
    [(Tue, 10), (Tue, 14), (Wed, 10), (Wed, 14), (Thu, 10), (Thu, 14), (Mon, 10), (Fri, 10)]
        .into_iter()
        .map(|(day_of_week, hour)| TimeSlot {
            day_of_week,
            hour,
            score: 100.0,
        })
        .collect()
}
