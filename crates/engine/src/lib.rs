pub mod builtins;
pub mod error;
pub mod guard;
pub mod hook;
pub mod ports;
pub mod seeds;

use std::{collections::HashMap, sync::Arc};

use db::models::{
    pipeline::{Pipeline, PipelineTransition, TransitionTrigger},
    task::Task,
    task_event::{TaskEventCategory, TaskEventSeverity},
    transition_history::{GuardResult, TransitionHistory},
};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use uuid::Uuid;

pub use error::EngineError;
use guard::{Guard, GuardContext};
use hook::{Hook, HookContext};

/// What triggered a transition attempt — surfaced to guards/hooks and
/// recorded on the transition_history row.
#[derive(Debug, Clone)]
pub enum TransitionRequest {
    Manual { to: String, actor: Option<String> },
    Agent { outcome: String },
}

impl TransitionRequest {
    fn trigger_name(&self) -> &'static str {
        match self {
            TransitionRequest::Manual { .. } => "manual",
            TransitionRequest::Agent { .. } => "agent",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionCandidate {
    pub transition: PipelineTransition,
    pub allowed: bool,
    pub blocked_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutedTransition {
    pub task: Task,
    pub history_id: Uuid,
    pub hook_failures: Vec<HookFailure>,
}

/// A non-fatal hook failure recorded after a transition already committed
/// (§9: "resist the temptation to make the transition fail on `required`").
#[derive(Debug, Clone, Serialize)]
pub struct HookFailure {
    pub hook: String,
    pub error: String,
    pub policy: String,
}

/// Central home of transition evaluation and commit logic (§4.1). Holds
/// mutable guard/hook registries behind an `RwLock` so callers can
/// `register_guard`/`register_hook` custom behavior at runtime, the way the
/// teacher's container registers services once at startup.
pub struct PipelineEngine {
    pool: SqlitePool,
    guards: RwLock<HashMap<String, Arc<dyn Guard>>>,
    hooks: RwLock<HashMap<String, Arc<dyn Hook>>>,
}

impl PipelineEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, guards: RwLock::new(HashMap::new()), hooks: RwLock::new(HashMap::new()) }
    }

    pub async fn register_guard(&self, name: impl Into<String>, guard: Arc<dyn Guard>) {
        self.guards.write().await.insert(name.into(), guard);
    }

    pub async fn register_hook(&self, name: impl Into<String>, hook: Arc<dyn Hook>) {
        self.hooks.write().await.insert(name.into(), hook);
    }

    /// Registers the four builtin guards under their §9 names.
    pub async fn register_builtin_guards(&self) {
        self.register_guard("has_pr", Arc::new(builtins::guards::HasPr)).await;
        self.register_guard("dependencies_resolved", Arc::new(builtins::guards::DependenciesResolved)).await;
        self.register_guard("no_running_agent", Arc::new(builtins::guards::NoRunningAgent)).await;
        self.register_guard("max_retries", Arc::new(builtins::guards::MaxRetries)).await;
    }

    /// Registers the five builtin hooks, wired to the ports a caller
    /// (the `workflow` crate's composition root) provides.
    pub async fn register_builtin_hooks(
        &self,
        launcher: Arc<dyn ports::AgentLauncher>,
        scm: Arc<dyn ports::ScmOps>,
        notifier: Arc<dyn ports::Notifier>,
        prompt_sink: Arc<dyn ports::PromptSink>,
    ) {
        self.register_hook("start_agent", Arc::new(builtins::hooks::StartAgent { launcher })).await;
        self.register_hook("push_and_create_pr", Arc::new(builtins::hooks::PushAndCreatePr { scm: scm.clone() })).await;
        self.register_hook("merge_pr", Arc::new(builtins::hooks::MergePr { scm })).await;
        self.register_hook("notify", Arc::new(builtins::hooks::NotifyHook { notifier })).await;
        self.register_hook("create_prompt", Arc::new(builtins::hooks::CreatePromptHook { sink: prompt_sink })).await;
    }

    async fn load(&self, task_id: Uuid) -> Result<(Task, Pipeline), EngineError> {
        let task = Task::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))?;
        let pipeline = Pipeline::find_by_id(&self.pool, task.pipeline_id)
            .await?
            .ok_or(EngineError::PipelineNotFound(task.pipeline_id))?;
        Ok((task, pipeline))
    }

    async fn evaluate_guards(
        &self,
        task: &Task,
        pipeline: &Pipeline,
        transition: &PipelineTransition,
    ) -> Result<(bool, Vec<GuardResult>), EngineError> {
        let registry = self.guards.read().await;
        let ctx = GuardContext { pool: &self.pool, task, pipeline };
        let mut all_passed = true;
        let mut results = Vec::with_capacity(transition.guards.len());
        for guard_ref in &transition.guards {
            let guard = registry
                .get(&guard_ref.name)
                .ok_or_else(|| EngineError::UnknownGuard(guard_ref.name.clone()))?;
            let outcome = guard.check(&ctx, &guard_ref.params).await?;
            if !outcome.passed {
                all_passed = false;
            }
            results.push(GuardResult { guard: guard_ref.name.clone(), passed: outcome.passed, reason: outcome.reason });
        }
        Ok((all_passed, results))
    }

    /// All transitions declared for the task's current status, each
    /// annotated with whether its guards currently pass. Read-only — unlike
    /// [`Self::execute_transition`] this never commits anything.
    pub async fn get_valid_transitions(&self, task_id: Uuid) -> Result<Vec<TransitionCandidate>, EngineError> {
        let (task, pipeline) = self.load(task_id).await?;
        let mut out = Vec::new();
        for transition in &pipeline.transitions.0 {
            if transition.from != task.status {
                continue;
            }
            let (allowed, results) = self.evaluate_guards(&task, &pipeline, transition).await?;
            let blocked_by = results.into_iter().filter(|r| !r.passed).map(|r| r.guard).collect();
            out.push(TransitionCandidate { transition: transition.clone(), allowed, blocked_by });
        }
        Ok(out)
    }

    /// Resolves which declared transition, if any, satisfies `request` from
    /// the task's current status. Agent-triggered requests require an exact
    /// `agentOutcome` match — no match means no transition (§4.2 step 4).
    fn resolve(
        pipeline: &Pipeline,
        from_status: &str,
        request: &TransitionRequest,
    ) -> Option<PipelineTransition> {
        let candidates: Vec<&PipelineTransition> =
            pipeline.transitions.0.iter().filter(|t| t.from == from_status).collect();

        match request {
            TransitionRequest::Manual { to, .. } => candidates
                .into_iter()
                .find(|t| matches!(t.trigger, TransitionTrigger::Manual) && &t.to == to)
                .cloned(),
            TransitionRequest::Agent { outcome } => candidates
                .into_iter()
                .find(|t| {
                    matches!(t.trigger, TransitionTrigger::Agent)
                        && t.agent_outcome.as_deref() == Some(outcome.as_str())
                })
                .cloned(),
        }
    }

    /// Evaluates guards, and if they all pass, atomically commits the
    /// status update, a transition_history row and a task_events row in a
    /// single DB transaction (§5). Hooks run after commit, per the
    /// transition's declared policy — a `required` hook's failure surfaces
    /// as an error even though the transition itself already committed.
    pub async fn execute_transition(
        &self,
        task_id: Uuid,
        request: TransitionRequest,
    ) -> Result<ExecutedTransition, EngineError> {
        let (task, pipeline) = self.load(task_id).await?;

        let transition = Self::resolve(&pipeline, &task.status, &request).ok_or_else(|| {
            EngineError::NoMatchingTransition { from: task.status.clone(), trigger: request.trigger_name().into() }
        })?;

        let (allowed, guard_results) = self.evaluate_guards(&task, &pipeline, &transition).await?;
        if !allowed {
            let failed = guard_results.iter().find(|r| !r.passed).expect("allowed is false");
            return Err(EngineError::GuardFailed {
                from: transition.from.clone(),
                to: transition.to.clone(),
                guard: failed.guard.clone(),
                reason: failed.reason.clone().unwrap_or_default(),
            });
        }

        let actor = match &request {
            TransitionRequest::Manual { actor, .. } => actor.clone(),
            TransitionRequest::Agent { .. } => None,
        };

        let mut tx = self.pool.begin().await?;
        Task::set_status(&mut *tx, task_id, &transition.to).await?;
        let history_id = TransitionHistory::record(
            &mut *tx,
            task_id,
            &transition.from,
            &transition.to,
            request.trigger_name(),
            actor.as_deref(),
            &guard_results,
        )
        .await?;
        db::models::task_event::TaskEvent::record(
            &mut *tx,
            task_id,
            TaskEventCategory::StatusChange,
            TaskEventSeverity::Info,
            &format!("{} -> {}", transition.from, transition.to),
            None,
        )
        .await?;
        tx.commit().await?;

        let updated_task = Task::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))?;

        let hook_failures = self.run_hooks(&updated_task, &pipeline, &transition).await?;

        Ok(ExecutedTransition { task: updated_task, history_id, hook_failures })
    }

    /// Runs every hook declared on `transition` in order. An unregistered
    /// hook name is silently skipped, not an error (§4.1/§9: unknown hook
    /// names are forward-compatibility placeholders in pipeline JSON). A
    /// hook failure never fails the call — the transition already committed
    /// — it is instead recorded as a `task_events` row and returned in the
    /// failures list, regardless of policy.
    async fn run_hooks(
        &self,
        task: &Task,
        pipeline: &Pipeline,
        transition: &PipelineTransition,
    ) -> Result<Vec<HookFailure>, EngineError> {
        use db::models::pipeline::HookPolicy;

        let registry = self.hooks.read().await;
        let ctx = HookContext {
            pool: &self.pool,
            task,
            pipeline,
            from_status: &transition.from,
            to_status: &transition.to,
        };

        let mut failures = Vec::new();
        for hook_ref in &transition.hooks {
            let hook = match registry.get(&hook_ref.name) {
                Some(h) => h.clone(),
                None => {
                    tracing::warn!(hook = %hook_ref.name, "skipping unregistered hook");
                    continue;
                }
            };

            if let Err(e) = hook.run(&ctx, &hook_ref.params).await {
                let policy_name = match hook_ref.policy {
                    HookPolicy::Required => "required",
                    HookPolicy::BestEffort => "best_effort",
                    HookPolicy::FireAndForget => "fire_and_forget",
                };
                let severity = match hook_ref.policy {
                    HookPolicy::Required => TaskEventSeverity::Error,
                    HookPolicy::BestEffort | HookPolicy::FireAndForget => TaskEventSeverity::Warning,
                };
                tracing::warn!(hook = %hook_ref.name, policy = policy_name, error = %e, "hook failed");
                let data = serde_json::json!({ "hook": hook_ref.name, "policy": policy_name });
                db::models::task_event::TaskEvent::record(
                    &self.pool,
                    task.id,
                    TaskEventCategory::System,
                    severity,
                    &format!("hook '{}' failed: {e}", hook_ref.name),
                    Some(&data),
                )
                .await?;
                failures.push(HookFailure { hook: hook_ref.name.clone(), error: e.to_string(), policy: policy_name.into() });
            }
        }
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::{
        pipeline::Pipeline,
        project::{CreateProject, Project, ProjectConfig},
        task::{CreateTask, Task, TaskPriority},
    };

    async fn setup() -> (db::DBService, PipelineEngine, Pipeline, Task) {
        let db_service = db::DBService::new_in_memory().await.unwrap();
        let pipeline = Pipeline::create(&db_service.pool, &seeds::simple()).await.unwrap();
        let project = Project::create(
            &db_service.pool,
            &CreateProject { name: "demo".into(), path: "/tmp/demo".into(), description: None, config: ProjectConfig::default() },
        )
        .await
        .unwrap();
        let task = Task::create(
            &db_service.pool,
            &CreateTask {
                project_id: project.id,
                pipeline_id: pipeline.id,
                title: "t".into(),
                description: None,
                priority: TaskPriority::Medium,
                tags: vec![],
                parent_task_id: None,
                assignee: None,
            },
            pipeline.initial_status().unwrap(),
        )
        .await
        .unwrap();

        let engine = PipelineEngine::new(db_service.pool.clone());
        engine.register_builtin_guards().await;
        (db_service, engine, pipeline, task)
    }

    #[tokio::test]
    async fn unguarded_manual_transition_commits() {
        let (_db, engine, _pipeline, task) = setup().await;
        let result = engine
            .execute_transition(task.id, TransitionRequest::Manual { to: "in_progress".into(), actor: Some("alice".into()) })
            .await
            .unwrap();
        assert_eq!(result.task.status, "in_progress");
    }

    #[tokio::test]
    async fn unknown_transition_is_rejected() {
        let (_db, engine, _pipeline, task) = setup().await;
        let err = engine
            .execute_transition(task.id, TransitionRequest::Manual { to: "done".into(), actor: None })
            .await;
        assert!(matches!(err, Err(EngineError::NoMatchingTransition { .. })));
    }

    #[tokio::test]
    async fn guard_blocks_transition_until_dependency_resolves() {
        use db::models::pipeline::{CreatePipeline, PipelineStatus, PipelineTransition, TransitionTrigger, GuardRef};

        let db_service = db::DBService::new_in_memory().await.unwrap();
        let pipeline = Pipeline::create(
            &db_service.pool,
            &CreatePipeline {
                name: "Gated".into(),
                task_type: "gated".into(),
                statuses: vec![
                    PipelineStatus { name: "open".into(), label: "Open".into(), color: None, is_final: false },
                    PipelineStatus { name: "in_progress".into(), label: "In Progress".into(), color: None, is_final: false },
                ],
                transitions: vec![PipelineTransition {
                    from: "open".into(),
                    to: "in_progress".into(),
                    trigger: TransitionTrigger::Manual,
                    agent_outcome: None,
                    label: None,
                    guards: vec![GuardRef { name: "dependencies_resolved".into(), params: serde_json::Value::Null }],
                    hooks: vec![],
                }],
            },
        )
        .await
        .unwrap();
        let project = Project::create(
            &db_service.pool,
            &CreateProject { name: "demo".into(), path: "/tmp/demo2".into(), description: None, config: ProjectConfig::default() },
        )
        .await
        .unwrap();

        let blocker = Task::create(
            &db_service.pool,
            &CreateTask {
                project_id: project.id,
                pipeline_id: pipeline.id,
                title: "blocker".into(),
                description: None,
                priority: TaskPriority::Medium,
                tags: vec![],
                parent_task_id: None,
                assignee: None,
            },
            "open",
        )
        .await
        .unwrap();

        let task = Task::create(
            &db_service.pool,
            &CreateTask {
                project_id: project.id,
                pipeline_id: pipeline.id,
                title: "dependent".into(),
                description: None,
                priority: TaskPriority::Medium,
                tags: vec![],
                parent_task_id: None,
                assignee: None,
            },
            "open",
        )
        .await
        .unwrap();

        db::models::task_dependency::TaskDependency::create(
            &db_service.pool,
            &db::models::task_dependency::CreateTaskDependency { task_id: task.id, depends_on_task_id: blocker.id },
        )
        .await
        .unwrap();

        let engine = PipelineEngine::new(db_service.pool.clone());
        engine.register_builtin_guards().await;

        let blocked = engine
            .execute_transition(task.id, TransitionRequest::Manual { to: "in_progress".into(), actor: None })
            .await;
        assert!(matches!(blocked, Err(EngineError::GuardFailed { .. })));

        engine
            .execute_transition(blocker.id, TransitionRequest::Manual { to: "in_progress".into(), actor: None })
            .await
            .unwrap();

        let unblocked = engine
            .execute_transition(task.id, TransitionRequest::Manual { to: "in_progress".into(), actor: None })
            .await
            .unwrap();
        assert_eq!(unblocked.task.status, "in_progress");
    }

    async fn setup_agent_pipeline_task(initial_status: &str) -> (db::DBService, PipelineEngine, Task) {
        use db::models::project::ProjectConfig;

        let db_service = db::DBService::new_in_memory().await.unwrap();
        let pipeline = Pipeline::create(&db_service.pool, &seeds::agent()).await.unwrap();
        let project = Project::create(
            &db_service.pool,
            &CreateProject { name: "demo".into(), path: format!("/tmp/demo-agent-{initial_status}"), description: None, config: ProjectConfig::default() },
        )
        .await
        .unwrap();
        let task = Task::create(
            &db_service.pool,
            &CreateTask {
                project_id: project.id,
                pipeline_id: pipeline.id,
                title: "t".into(),
                description: None,
                priority: TaskPriority::Medium,
                tags: vec![],
                parent_task_id: None,
                assignee: None,
            },
            initial_status,
        )
        .await
        .unwrap();

        let engine = PipelineEngine::new(db_service.pool.clone());
        engine.register_builtin_guards().await;
        (db_service, engine, task)
    }

    /// §8 scenario 1: a `plan_complete` outcome from `planning` advances the
    /// task to `plan_review` in a single recorded transition.
    #[tokio::test]
    async fn agent_pipeline_plan_complete_advances_to_plan_review() {
        let (db_service, engine, task) = setup_agent_pipeline_task("planning").await;

        let result = engine.execute_transition(task.id, TransitionRequest::Agent { outcome: "plan_complete".into() }).await.unwrap();
        assert_eq!(result.task.status, "plan_review");

        let history = TransitionHistory::find_by_task(&db_service.pool, task.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, "planning");
        assert_eq!(history[0].to_status, "plan_review");
        assert_eq!(history[0].trigger, "agent");
    }

    /// §8 scenario 2: two consecutive `failed` outcomes self-loop on
    /// `planning`; the third is blocked by `max_retries(3)` with no further
    /// history row, and the task stays in `planning`.
    #[tokio::test]
    async fn agent_pipeline_blocks_third_consecutive_retry_in_planning() {
        let (db_service, engine, task) = setup_agent_pipeline_task("planning").await;

        engine.execute_transition(task.id, TransitionRequest::Agent { outcome: "failed".into() }).await.unwrap();
        engine.execute_transition(task.id, TransitionRequest::Agent { outcome: "failed".into() }).await.unwrap();
        let third = engine.execute_transition(task.id, TransitionRequest::Agent { outcome: "failed".into() }).await;
        assert!(matches!(third, Err(EngineError::GuardFailed { .. })));

        let history = TransitionHistory::find_by_task(&db_service.pool, task.id).await.unwrap();
        assert_eq!(history.len(), 2);

        let reloaded = Task::find_by_id(&db_service.pool, task.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, "planning");
    }
}
