//! Task History & Learning (C8).
//!
//! Stores one record per completed agent task along with caller-supplied
//! feedback, then mines the accumulated records for learning insights and
//! performance trends. Feedback is idempotent per `(task_id, feedback_hash)`
//! pair so a retried feedback submission never double-counts.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentType;
use crate::error::{CoreError, CoreResult};
use crate::persistence::{PersistenceLayer, TaskHistoryRow};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub agent_type: AgentType,
    pub platform: String,
    pub success: bool,
    pub execution_ms: u64,
    pub cost_usd: f64,
    pub temperature: f32,
    /// Short excerpt of the generated content, mined for content-pattern
    /// heuristics (question hooks, length, storytelling cues).
    pub content: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerfMetrics {
    pub engagement_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub task_id: String,
    /// 1 (poor) through 5 (excellent).
    pub rating: u8,
    pub useful: bool,
    pub perf_metrics: Option<PerfMetrics>,
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Feedback {
    fn validate(&self) -> CoreResult<()> {
        if !(1..=5).contains(&self.rating) {
            return Err(CoreError::Validation(format!(
                "feedback rating must be in 1..=5, got {}",
                self.rating
            )));
        }
        Ok(())
    }
}

fn feedback_hash(feedback: &Feedback) -> u64 {
    let mut hasher = DefaultHasher::new();
    feedback.task_id.hash(&mut hasher);
    feedback.rating.hash(&mut hasher);
    feedback.useful.hash(&mut hasher);
    feedback.comment.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Default, Serialize)]
pub struct LearningInsights {
    pub best_practices: Vec<String>,
    pub common_mistakes: Vec<String>,
    pub optimal_settings: HashMap<String, f32>,
    pub content_patterns: Vec<String>,
    pub platform_specific: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Serialize)]
pub struct PerformanceTrend {
    pub direction: TrendDirection,
    pub first_third_mean_rating: f64,
    pub last_third_mean_rating: f64,
    pub mean_execution_ms: f64,
    pub success_rate: f64,
}

#[derive(Default)]
struct Store {
    records: Vec<TaskRecord>,
    feedback: Vec<Feedback>,
    seen_feedback: HashSet<(String, u64)>,
}

pub struct TaskHistory {
    store: Mutex<Store>,
    persistence: Option<Arc<PersistenceLayer>>,
}

impl Default for TaskHistory {
    fn default() -> Self {
        Self::new()
    }
}

const MIN_PHRASE_OCCURRENCES: u32 = 2;
const TOP_PHRASES: usize = 5;
const LONG_FORM_CHARS: usize = 280;
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "it", "is", "to", "of", "in", "for", "on", "with", "was", "this",
    "that", "but", "be", "as", "at", "by", "we", "our", "i",
];
const STORYTELLING_CUES: &[&str] = &["once upon", "imagine", "picture this", "story", "journey"];

impl TaskHistory {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            persistence: None,
        }
    }

    /// Attaches a durable store: every `record_task()` call afterwards also
    /// writes its row to SQLite in the background, best-effort.
    pub fn with_persistence(mut self, persistence: Arc<PersistenceLayer>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn record_task(&self, record: TaskRecord) {
        if let Some(persistence) = self.persistence.clone() {
            let row = TaskHistoryRow {
                id: record.task_id.clone(),
                agent_type: format!("{:?}", record.agent_type),
                platform: record.platform.clone(),
                success: record.success,
                execution_ms: record.execution_ms as i64,
                cost_usd: record.cost_usd,
                temperature: record.temperature as f64,
                content: record.content.clone(),
                completed_at: record.completed_at,
                feedback_json: None,
                learning_json: None,
            };
            tokio::spawn(async move {
                if let Err(err) = persistence.record_task_history(&row).await {
                    tracing::warn!(%err, "failed to persist task history row");
                }
            });
        }
        self.store.lock().unwrap().records.push(record);
    }

    /// Returns `true` if the feedback was new, `false` if it was a duplicate
    /// of a prior submission for the same task. Errors if `rating` is out of
    /// the valid 1..=5 range.
    pub fn add_feedback(&self, feedback: Feedback) -> CoreResult<bool> {
        feedback.validate()?;
        let key = (feedback.task_id.clone(), feedback_hash(&feedback));
        let mut store = self.store.lock().unwrap();
        if store.seen_feedback.contains(&key) {
            return Ok(false);
        }
        store.seen_feedback.insert(key);
        store.feedback.push(feedback);
        Ok(true)
    }

    /// Derives insights from accumulated feedback and task records. O(n) over
    /// both collections.
    pub fn learning_insights(&self) -> LearningInsights {
        let store = self.store.lock().unwrap();
        let mut insights = LearningInsights::default();

        let by_task: HashMap<&str, &TaskRecord> =
            store.records.iter().map(|r| (r.task_id.as_str(), r)).collect();

        let high_rated: Vec<&Feedback> = store.feedback.iter().filter(|f| f.rating >= 4).collect();
        let low_rated: Vec<&Feedback> = store.feedback.iter().filter(|f| f.rating <= 2).collect();

        let praise_comments: Vec<&str> = high_rated.iter().filter_map(|f| f.comment.as_deref()).collect();
        let complaint_comments: Vec<&str> = low_rated.iter().filter_map(|f| f.comment.as_deref()).collect();
        insights.best_practices = mine_frequent_phrases(&praise_comments);
        insights.common_mistakes = mine_frequent_phrases(&complaint_comments);

        let mut temps_by_agent: HashMap<AgentType, Vec<f32>> = HashMap::new();
        for fb in &high_rated {
            if let Some(record) = by_task.get(fb.task_id.as_str()) {
                if record.success {
                    temps_by_agent.entry(record.agent_type).or_default().push(record.temperature);
                }
            }
        }
        for (agent_type, mut temps) in temps_by_agent {
            insights
                .optimal_settings
                .insert(format!("{agent_type:?}"), median(&mut temps));
        }

        let mut platform_notes: HashMap<String, Vec<String>> = HashMap::new();
        for fb in &high_rated {
            if let Some(record) = by_task.get(fb.task_id.as_str()) {
                platform_notes
                    .entry(record.platform.clone())
                    .or_default()
                    .push(format!("{:?} rated {} on {}", record.agent_type, fb.rating, record.platform));
            }
        }
        insights.platform_specific = platform_notes;

        insights.content_patterns = content_pattern_insights(&store.records, &store.feedback);

        insights
    }

    /// Day-bucketed mean rating (joined from feedback to the task it rates),
    /// compared first-third vs last-third with a +-5% band treated as
    /// stable, alongside overall mean execution time and success rate.
    pub fn performance_trend(&self) -> Option<PerformanceTrend> {
        let store = self.store.lock().unwrap();
        if store.records.is_empty() {
            return None;
        }

        let total = store.records.len() as f64;
        let succeeded = store.records.iter().filter(|r| r.success).count() as f64;
        let success_rate = succeeded / total;
        let mean_execution_ms = store.records.iter().map(|r| r.execution_ms as f64).sum::<f64>() / total;

        let by_task: HashMap<&str, &TaskRecord> =
            store.records.iter().map(|r| (r.task_id.as_str(), r)).collect();

        let mut by_day: HashMap<(i32, u32, u32), Vec<f64>> = HashMap::new();
        for fb in &store.feedback {
            if let Some(record) = by_task.get(fb.task_id.as_str()) {
                let date = record.completed_at.date_naive();
                by_day
                    .entry((date.year(), date.month(), date.day()))
                    .or_default()
                    .push(fb.rating as f64);
            }
        }

        if by_day.is_empty() {
            return Some(PerformanceTrend {
                direction: TrendDirection::Stable,
                first_third_mean_rating: 0.0,
                last_third_mean_rating: 0.0,
                mean_execution_ms,
                success_rate,
            });
        }

        let mut days: Vec<(i32, u32, u32)> = by_day.keys().copied().collect();
        days.sort();
        let daily_avgs: Vec<f64> = days
            .iter()
            .map(|day| {
                let ratings = &by_day[day];
                ratings.iter().sum::<f64>() / ratings.len() as f64
            })
            .collect();

        if daily_avgs.len() < 3 {
            let avg = average(&daily_avgs);
            return Some(PerformanceTrend {
                direction: TrendDirection::Stable,
                first_third_mean_rating: avg,
                last_third_mean_rating: avg,
                mean_execution_ms,
                success_rate,
            });
        }

        let third = daily_avgs.len() / 3;
        let first_third_mean_rating = average(&daily_avgs[..third]);
        let last_third_mean_rating = average(&daily_avgs[daily_avgs.len() - third..]);

        let direction = if first_third_mean_rating == 0.0 {
            TrendDirection::Stable
        } else {
            let change = (last_third_mean_rating - first_third_mean_rating) / first_third_mean_rating;
            if change > 0.05 {
                TrendDirection::Improving
            } else if change < -0.05 {
                TrendDirection::Declining
            } else {
                TrendDirection::Stable
            }
        };

        Some(PerformanceTrend {
            direction,
            first_third_mean_rating,
            last_third_mean_rating,
            mean_execution_ms,
            success_rate,
        })
    }
}

/// Aggregated request volume, error count, mean execution time, and spend
/// for one agent type, used by the performance monitor (C12).
#[derive(Debug, Clone, Copy)]
pub struct AgentStats {
    pub agent_type: AgentType,
    pub requests: u64,
    pub errors: u64,
    pub avg_execution_ms: f64,
    pub total_cost_usd: f64,
}

impl AgentStats {
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.requests as f64
        }
    }
}

impl TaskHistory {
    /// Per-agent-type rollup over every recorded task, regardless of
    /// tenant or feedback.
    pub fn agent_stats(&self) -> Vec<AgentStats> {
        let store = self.store.lock().unwrap();
        let mut by_agent: HashMap<AgentType, (u64, u64, u64, f64)> = HashMap::new();
        for record in &store.records {
            let entry = by_agent.entry(record.agent_type).or_insert((0, 0, 0, 0.0));
            entry.0 += 1;
            if !record.success {
                entry.1 += 1;
            }
            entry.2 += record.execution_ms;
            entry.3 += record.cost_usd;
        }
        by_agent
            .into_iter()
            .map(|(agent_type, (requests, errors, execution_ms_sum, total_cost_usd))| AgentStats {
                agent_type,
                requests,
                errors,
                avg_execution_ms: execution_ms_sum as f64 / requests as f64,
                total_cost_usd,
            })
            .collect()
    }
}

fn average(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Ranks single tokens and bigrams by frequency across `comments`, dropping
/// stopwords and anything seen fewer than `MIN_PHRASE_OCCURRENCES` times.
fn mine_frequent_phrases(comments: &[&str]) -> Vec<String> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for comment in comments {
        let tokens = tokenize(comment);
        for token in &tokens {
            if STOPWORDS.contains(&token.as_str()) {
                continue;
            }
            *counts.entry(token.clone()).or_insert(0) += 1;
        }
        for pair in tokens.windows(2) {
            if STOPWORDS.contains(&pair[0].as_str()) || STOPWORDS.contains(&pair[1].as_str()) {
                continue;
            }
            *counts.entry(format!("{} {}", pair[0], pair[1])).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, u32)> = counts.into_iter().filter(|(_, c)| *c >= MIN_PHRASE_OCCURRENCES).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(TOP_PHRASES)
        .map(|(phrase, count)| format!("\"{phrase}\" ({count}x)"))
        .collect()
}

enum ContentPattern {
    QuestionHook,
    LongForm,
    Storytelling,
}

impl ContentPattern {
    fn label(&self) -> &'static str {
        match self {
            ContentPattern::QuestionHook => "question hook",
            ContentPattern::LongForm => "long-form",
            ContentPattern::Storytelling => "storytelling",
        }
    }

    fn classify(content: &str) -> Vec<ContentPattern> {
        let mut patterns = Vec::new();
        if content.trim_end().ends_with('?') {
            patterns.push(ContentPattern::QuestionHook);
        }
        if content.chars().count() > LONG_FORM_CHARS {
            patterns.push(ContentPattern::LongForm);
        }
        let lowered = content.to_lowercase();
        if STORYTELLING_CUES.iter().any(|cue| lowered.contains(cue)) {
            patterns.push(ContentPattern::Storytelling);
        }
        patterns
    }
}

/// For each heuristic content pattern found across records with feedback,
/// reports the mean rating and mean engagement score of samples exhibiting
/// it.
fn content_pattern_insights(records: &[TaskRecord], feedback: &[Feedback]) -> Vec<String> {
    let mut by_task: HashMap<&str, Vec<&Feedback>> = HashMap::new();
    for fb in feedback {
        by_task.entry(fb.task_id.as_str()).or_default().push(fb);
    }

    let mut ratings_by_pattern: HashMap<&'static str, Vec<f64>> = HashMap::new();
    let mut engagement_by_pattern: HashMap<&'static str, Vec<f64>> = HashMap::new();

    for record in records {
        let Some(fbs) = by_task.get(record.task_id.as_str()) else {
            continue;
        };
        let patterns = ContentPattern::classify(&record.content);
        for pattern in &patterns {
            for fb in fbs {
                ratings_by_pattern.entry(pattern.label()).or_default().push(fb.rating as f64);
                if let Some(metrics) = fb.perf_metrics {
                    engagement_by_pattern.entry(pattern.label()).or_default().push(metrics.engagement_score);
                }
            }
        }
    }

    let mut labels: Vec<&'static str> = ratings_by_pattern.keys().copied().collect();
    labels.sort();

    labels
        .into_iter()
        .map(|label| {
            let ratings = &ratings_by_pattern[label];
            let mean_rating = average(ratings);
            let engagement = engagement_by_pattern.get(label).map(|e| average(e));
            match engagement {
                Some(avg_engagement) => format!(
                    "{label}: avg rating {mean_rating:.2}, avg engagement {avg_engagement:.2} ({} samples)",
                    ratings.len()
                ),
                None => format!("{label}: avg rating {mean_rating:.2} ({} samples)", ratings.len()),
            }
        })
        .collect()
}
