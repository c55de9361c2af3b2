//! The four pipelines seeded into a fresh database (§6): `simple`, `feature`,
//! `bug` and `agent`. Each is a [`CreatePipeline`] a caller inserts via
//! [`db::models::pipeline::Pipeline::create`] during first-run bootstrap.

use db::models::pipeline::{
    CreatePipeline, GuardRef, HookPolicy, HookRef, PipelineStatus, PipelineTransition, TransitionTrigger,
};

fn status(name: &str, label: &str, is_final: bool) -> PipelineStatus {
    PipelineStatus { name: name.into(), label: label.into(), color: None, is_final }
}

fn manual(from: &str, to: &str, label: &str, guards: Vec<GuardRef>) -> PipelineTransition {
    PipelineTransition {
        from: from.into(),
        to: to.into(),
        trigger: TransitionTrigger::Manual,
        agent_outcome: None,
        label: Some(label.into()),
        guards,
        hooks: vec![],
    }
}

fn guard(name: &str) -> GuardRef {
    GuardRef { name: name.into(), params: serde_json::Value::Null }
}

fn hook(name: &str, policy: HookPolicy) -> HookRef {
    HookRef { name: name.into(), params: serde_json::Value::Null, policy }
}

fn hook_with_params(name: &str, params: serde_json::Value, policy: HookPolicy) -> HookRef {
    HookRef { name: name.into(), params, policy }
}

fn agent_transition(from: &str, to: &str, outcome: &str, label: &str, guards: Vec<GuardRef>, hooks: Vec<HookRef>) -> PipelineTransition {
    PipelineTransition {
        from: from.into(),
        to: to.into(),
        trigger: TransitionTrigger::Agent,
        agent_outcome: Some(outcome.into()),
        label: Some(label.into()),
        guards,
        hooks,
    }
}

/// Two manual statuses plus a done state. No agents, no guards — the
/// baseline pipeline for tasks tracked entirely by hand.
pub fn simple() -> CreatePipeline {
    CreatePipeline {
        name: "Simple".into(),
        task_type: "simple".into(),
        statuses: vec![
            status("open", "Open", false),
            status("in_progress", "In Progress", false),
            status("done", "Done", true),
        ],
        transitions: vec![
            manual("open", "in_progress", "Start", vec![]),
            manual("in_progress", "done", "Complete", vec![]),
        ],
    }
}

/// Open -> in_progress kicks off a coding agent. The agent's `success`
/// outcome advances to in_review (opening a PR along the way); `failure`
/// sends it back to in_progress for another attempt, guarded by max_retries.
/// in_review -> done merges the PR.
pub fn feature() -> CreatePipeline {
    CreatePipeline {
        name: "Feature".into(),
        task_type: "feature".into(),
        statuses: vec![
            status("open", "Open", false),
            status("in_progress", "In Progress", false),
            status("in_review", "In Review", false),
            status("done", "Done", true),
        ],
        transitions: vec![
            PipelineTransition {
                from: "open".into(),
                to: "in_progress".into(),
                trigger: TransitionTrigger::Manual,
                agent_outcome: None,
                label: Some("Start".into()),
                guards: vec![guard("dependencies_resolved")],
                hooks: vec![hook("start_agent", HookPolicy::Required)],
            },
            PipelineTransition {
                from: "in_progress".into(),
                to: "in_review".into(),
                trigger: TransitionTrigger::Agent,
                agent_outcome: Some("success".into()),
                label: Some("Agent succeeded".into()),
                guards: vec![guard("has_pr")],
                hooks: vec![hook("push_and_create_pr", HookPolicy::Required)],
            },
            PipelineTransition {
                from: "in_progress".into(),
                to: "in_progress".into(),
                trigger: TransitionTrigger::Agent,
                agent_outcome: Some("failure".into()),
                label: Some("Retry".into()),
                guards: vec![guard("max_retries")],
                hooks: vec![hook("notify", HookPolicy::BestEffort)],
            },
            manual("in_review", "done", "Merge", vec![guard("has_pr")]),
        ],
    }
}

/// `triage → investigate → fix → verify → done`. An agent investigates
/// first: `reproduced` carries the task into `fix`, `cannot_reproduce` closes
/// it without ever starting a fix. `fix` pushes a branch and opens a PR on
/// `pr_ready`; `verify` is a human merge gated on having one.
pub fn bug() -> CreatePipeline {
    CreatePipeline {
        name: "Bug".into(),
        task_type: "bug".into(),
        statuses: vec![
            status("triage", "Triage", false),
            status("investigate", "Investigate", false),
            status("fix", "Fix", false),
            status("verify", "Verify", false),
            status("done", "Done", true),
        ],
        transitions: vec![
            PipelineTransition {
                from: "triage".into(),
                to: "investigate".into(),
                trigger: TransitionTrigger::Manual,
                agent_outcome: None,
                label: Some("Start investigating".into()),
                guards: vec![guard("dependencies_resolved"), guard("no_running_agent")],
                hooks: vec![hook_with_params(
                    "start_agent",
                    serde_json::json!({ "mode": "investigate" }),
                    HookPolicy::Required,
                )],
            },
            agent_transition("investigate", "investigate", "failed", "Retry investigation", vec![guard("max_retries")], vec![hook("notify", HookPolicy::BestEffort)]),
            agent_transition(
                "investigate",
                "fix",
                "reproduced",
                "Reproduced, start fixing",
                vec![guard("no_running_agent")],
                vec![hook_with_params("start_agent", serde_json::json!({ "mode": "fix" }), HookPolicy::Required)],
            ),
            agent_transition("investigate", "done", "cannot_reproduce", "Could not reproduce", vec![], vec![hook("notify", HookPolicy::BestEffort)]),
            agent_transition("fix", "fix", "failed", "Retry fix", vec![guard("max_retries")], vec![hook("notify", HookPolicy::BestEffort)]),
            agent_transition("fix", "verify", "pr_ready", "Fix ready for review", vec![], vec![hook("push_and_create_pr", HookPolicy::Required)]),
            PipelineTransition {
                from: "verify".into(),
                to: "done".into(),
                trigger: TransitionTrigger::Manual,
                agent_outcome: None,
                label: Some("Merge fix".into()),
                guards: vec![guard("has_pr")],
                hooks: vec![hook("merge_pr", HookPolicy::Required)],
            },
        ],
    }
}

/// `open → planning → plan_review → implementing → pr_review → done`, with
/// `needs_info` a side-state either phase can drop into (§6). The two
/// `needs_info → *` transitions both declare `agentOutcome: 'info_provided'`
/// — `planning` is declared first and so always wins regardless of which
/// phase raised the question (§9's documented first-declared tie-break).
pub fn agent() -> CreatePipeline {
    CreatePipeline {
        name: "Agent".into(),
        task_type: "agent".into(),
        statuses: vec![
            status("open", "Open", false),
            status("planning", "Planning", false),
            status("plan_review", "Plan Review", false),
            status("implementing", "Implementing", false),
            status("pr_review", "PR Review", false),
            status("needs_info", "Needs Info", false),
            status("done", "Done", true),
        ],
        transitions: vec![
            PipelineTransition {
                from: "open".into(),
                to: "planning".into(),
                trigger: TransitionTrigger::Manual,
                agent_outcome: None,
                label: Some("Start planning".into()),
                guards: vec![guard("dependencies_resolved"), guard("no_running_agent")],
                hooks: vec![hook_with_params("start_agent", serde_json::json!({ "mode": "planning" }), HookPolicy::Required)],
            },
            agent_transition("planning", "planning", "failed", "Retry planning", vec![guard("max_retries")], vec![hook("notify", HookPolicy::BestEffort)]),
            agent_transition("planning", "plan_review", "plan_complete", "Plan ready for review", vec![], vec![]),
            agent_transition(
                "planning",
                "needs_info",
                "needs_info",
                "Agent has questions",
                vec![],
                vec![hook_with_params(
                    "create_prompt",
                    serde_json::json!({ "promptType": "needs_info", "resumeOutcome": "info_provided" }),
                    HookPolicy::Required,
                )],
            ),
            PipelineTransition {
                from: "plan_review".into(),
                to: "implementing".into(),
                trigger: TransitionTrigger::Manual,
                agent_outcome: None,
                label: Some("Approve plan".into()),
                guards: vec![guard("no_running_agent")],
                hooks: vec![hook_with_params("start_agent", serde_json::json!({ "mode": "implementing" }), HookPolicy::Required)],
            },
            agent_transition("implementing", "implementing", "failed", "Retry implementation", vec![guard("max_retries")], vec![hook("notify", HookPolicy::BestEffort)]),
            agent_transition(
                "implementing",
                "needs_info",
                "needs_info",
                "Agent has questions",
                vec![],
                vec![hook_with_params(
                    "create_prompt",
                    serde_json::json!({ "promptType": "needs_info", "resumeOutcome": "info_provided" }),
                    HookPolicy::Required,
                )],
            ),
            agent_transition("implementing", "pr_review", "pr_ready", "Implementation ready for review", vec![], vec![hook("push_and_create_pr", HookPolicy::Required)]),
            // First-declared wins: an `info_provided` outcome raised from
            // either phase resumes into `planning`.
            agent_transition("needs_info", "planning", "info_provided", "Resume planning", vec![], vec![]),
            agent_transition("needs_info", "implementing", "info_provided", "Resume implementing", vec![], vec![]),
            PipelineTransition {
                from: "pr_review".into(),
                to: "done".into(),
                trigger: TransitionTrigger::Manual,
                agent_outcome: None,
                label: Some("Merge".into()),
                guards: vec![guard("has_pr")],
                hooks: vec![hook("merge_pr", HookPolicy::Required)],
            },
        ],
    }
}

pub fn all() -> Vec<CreatePipeline> {
    vec![simple(), feature(), bug(), agent()]
}
