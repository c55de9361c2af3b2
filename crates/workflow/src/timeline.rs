//! Merged, deduplicated, keyset-paginated event feed per task (§4.6). Each
//! source reads its own table directly, mirroring the teacher's
//! `TaskEvent::find_by_task_id_with_names` adapter-per-table idiom — no SQL
//! UNION, just plain in-memory concatenation, dedup, and sort.

use chrono::{DateTime, Utc};
use db::models::{
    activity_log::ActivityLogEntry, agent_run::AgentRun, pending_prompt::PendingPrompt,
    task_artifact::TaskArtifact, task_event::TaskEvent, transition_history::TransitionHistory,
};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::TimelineError;

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub source: &'static str,
    pub severity: String,
    pub title: String,
    pub data: Option<Value>,
}

impl TimelineEntry {
    /// The dedup key used when no `id` is available: a hash of
    /// `(timestamp, source, title)`. Deterministic across runs, per §8 —
    /// a plain tuple comparison rather than pointer identity.
    fn dedup_key(&self) -> (i64, &'static str, String) {
        (self.timestamp.timestamp_micros(), self.source, self.title.clone())
    }
}

async fn task_events_source(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<TimelineEntry>, TimelineError> {
    Ok(TaskEvent::find_by_task(pool, task_id)
        .await?
        .into_iter()
        .map(|e| TimelineEntry {
            id: Some(e.id),
            timestamp: e.created_at,
            source: "task_events",
            severity: e.severity,
            title: e.message,
            data: e.data.and_then(|d| serde_json::from_str(&d).ok()),
        })
        .collect())
}

async fn activity_log_source(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<TimelineEntry>, TimelineError> {
    Ok(ActivityLogEntry::find_by_entity(pool, "task", task_id)
        .await?
        .into_iter()
        .map(|e| TimelineEntry {
            id: Some(e.id),
            timestamp: e.created_at,
            source: "activity_log",
            severity: "info".to_string(),
            title: e.summary,
            data: e.data.and_then(|d| serde_json::from_str(&d).ok()),
        })
        .collect())
}

async fn transition_history_source(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<TimelineEntry>, TimelineError> {
    Ok(TransitionHistory::find_by_task(pool, task_id)
        .await?
        .into_iter()
        .map(|t| TimelineEntry {
            id: Some(t.id),
            timestamp: t.created_at,
            source: "transition_history",
            severity: "info".to_string(),
            title: format!("{} -> {} ({})", t.from_status, t.to_status, t.trigger),
            data: serde_json::to_value(&t.guard_results.0).ok(),
        })
        .collect())
}

async fn agent_runs_source(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<TimelineEntry>, TimelineError> {
    Ok(AgentRun::find_by_task(pool, task_id)
        .await?
        .into_iter()
        .map(|r| TimelineEntry {
            id: Some(r.id),
            timestamp: r.completed_at.unwrap_or(r.started_at),
            source: "agent_runs",
            severity: if r.status == "failed" || r.status == "timed_out" { "warning".into() } else { "info".into() },
            title: format!("{} run ({}) {}", r.agent_type, r.mode, r.status),
            data: r.outcome.map(|o| Value::String(o)),
        })
        .collect())
}

async fn task_phases_source(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<TimelineEntry>, TimelineError> {
    let task = db::models::task::Task::find_by_id(pool, task_id).await?;
    Ok(task
        .map(|t| {
            t.phases
                .0
                .into_iter()
                .map(|p| TimelineEntry {
                    id: None,
                    timestamp: p.completed_at.or(p.started_at).unwrap_or_else(Utc::now),
                    source: "task_phases",
                    severity: if p.status == "failed" { "warning".into() } else { "info".into() },
                    title: format!("phase {} {}", p.name, p.status),
                    data: p.agent_run_id.map(|id| Value::String(id.to_string())),
                })
                .collect()
        })
        .unwrap_or_default())
}

async fn task_artifacts_source(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<TimelineEntry>, TimelineError> {
    Ok(TaskArtifact::find_by_task(pool, task_id)
        .await?
        .into_iter()
        .map(|a| TimelineEntry {
            id: Some(a.id),
            timestamp: a.created_at,
            source: "task_artifacts",
            severity: "info".to_string(),
            title: format!("artifact: {}", a.artifact_type),
            data: serde_json::from_str(&a.data).ok(),
        })
        .collect())
}

async fn pending_prompts_source(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<TimelineEntry>, TimelineError> {
    Ok(PendingPrompt::find_by_task(pool, task_id)
        .await?
        .into_iter()
        .map(|p| TimelineEntry {
            id: Some(p.id),
            timestamp: p.answered_at.unwrap_or(p.created_at),
            source: "pending_prompts",
            severity: "info".to_string(),
            title: format!("prompt {} {}", p.prompt_type, p.status),
            data: serde_json::from_str(&p.payload).ok(),
        })
        .collect())
}

/// Synthesized from `task_events` whose `category` is `git` or `github`
/// rather than a distinct table, per §4.6.
async fn scm_sublog_source(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<TimelineEntry>, TimelineError> {
    Ok(TaskEvent::find_by_task(pool, task_id)
        .await?
        .into_iter()
        .filter(|e| e.category == "git" || e.category == "github")
        .map(|e| TimelineEntry {
            id: Some(e.id),
            timestamp: e.created_at,
            source: "scm",
            severity: e.severity,
            title: e.message,
            data: e.data.and_then(|d| serde_json::from_str(&d).ok()),
        })
        .collect())
}

/// Merges all eight sources, deduplicates, sorts time-descending, applies a
/// keyset cursor, and truncates to `limit`.
pub async fn timeline_for_task(
    pool: &SqlitePool,
    task_id: Uuid,
    cursor: Option<DateTime<Utc>>,
    limit: usize,
) -> Result<Vec<TimelineEntry>, TimelineError> {
    let mut entries = Vec::new();
    entries.extend(task_events_source(pool, task_id).await?);
    entries.extend(activity_log_source(pool, task_id).await?);
    entries.extend(transition_history_source(pool, task_id).await?);
    entries.extend(agent_runs_source(pool, task_id).await?);
    entries.extend(task_phases_source(pool, task_id).await?);
    entries.extend(task_artifacts_source(pool, task_id).await?);
    entries.extend(pending_prompts_source(pool, task_id).await?);
    entries.extend(scm_sublog_source(pool, task_id).await?);

    let mut seen = std::collections::HashSet::new();
    entries.retain(|e| {
        let key = e.id.map(|id| (id.as_u128() as i64, e.source, String::new())).unwrap_or_else(|| e.dedup_key());
        seen.insert(key)
    });

    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    if let Some(cursor) = cursor {
        entries.retain(|e| e.timestamp < cursor);
    }
    entries.truncate(limit);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use db::models::{
        pipeline::{CreatePipeline, Pipeline},
        project::{CreateProject, Project, ProjectConfig},
        task::{CreateTask, Task},
        task_event::{TaskEventCategory, TaskEventSeverity},
    };

    use super::*;

    async fn setup() -> (SqlitePool, Uuid) {
        let db = db::DBService::new_in_memory().await.unwrap();
        let project = Project::create(
            &db.pool,
            &CreateProject { name: "p".into(), path: "/tmp/p".into(), description: None, config: ProjectConfig::default() },
        )
        .await
        .unwrap();
        let pipeline = Pipeline::create(&db.pool, &engine::seeds::simple()).await.unwrap();
        let task = Task::create(
            &db.pool,
            &CreateTask {
                project_id: project.id,
                pipeline_id: pipeline.id,
                title: "t".into(),
                description: None,
                priority: Default::default(),
                tags: vec![],
                parent_task_id: None,
                assignee: None,
            },
            pipeline.initial_status().unwrap(),
        )
        .await
        .unwrap();
        (db.pool, task.id)
    }

    #[tokio::test]
    async fn merges_and_sorts_sources_descending() {
        let (pool, task_id) = setup().await;
        TaskEvent::record(&pool, task_id, TaskEventCategory::System, TaskEventSeverity::Info, "first", None).await.unwrap();
        TaskEvent::record(&pool, task_id, TaskEventCategory::System, TaskEventSeverity::Info, "second", None).await.unwrap();

        let entries = timeline_for_task(&pool, task_id, None, 10).await.unwrap();
        assert!(entries.len() >= 2);
        for pair in entries.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn respects_limit_truncation() {
        let (pool, task_id) = setup().await;
        for i in 0..5 {
            TaskEvent::record(&pool, task_id, TaskEventCategory::System, TaskEventSeverity::Info, &format!("e{i}"), None)
                .await
                .unwrap();
        }
        let entries = timeline_for_task(&pool, task_id, None, 2).await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}
