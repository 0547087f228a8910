use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use weave_types::{
    ExecutionMode, ExecutionPlan, ExecutionTask, PlanMetadata, Platform, ReplanPolicy,
    RequirementStrategy, RouteDecision, SessionMode, TaskPhase,
};

use crate::{build_dependency_checklist, build_ui_blueprint, RequirementAnalyzer};

pub const INVALID_TECH_STACK: &str = "INVALID_TECH_STACK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanError {
    pub code: &'static str,
    pub detail: String,
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

impl std::error::Error for PlanError {}

#[derive(Debug, Clone)]
pub struct PlanInput {
    pub user_message: String,
    pub agent_id: String,
    pub mode: SessionMode,
    pub platform: Platform,
    pub project_type: String,
    pub tech_stack: Vec<Value>,
    pub ui_library: Option<String>,
}

#[derive(Clone)]
pub struct PlanGenerator {
    analyzer: Arc<dyn RequirementAnalyzer>,
}

impl PlanGenerator {
    pub fn new(analyzer: Arc<dyn RequirementAnalyzer>) -> Self {
        Self { analyzer }
    }

    pub fn generate(&self, input: &PlanInput) -> Result<ExecutionPlan, PlanError> {
        let tech_stack = validate_tech_stack(&input.tech_stack)?;

        let repair_intent = self.analyzer.detects_repair_intent(&input.user_message);
        let detail = self.analyzer.detail_score(&input.user_message);
        let strategy = if repair_intent {
            RequirementStrategy::Direct
        } else if detail <= 1 || (input.mode == SessionMode::Creator && detail <= 2) {
            RequirementStrategy::Brainstorm
        } else {
            RequirementStrategy::Direct
        };

        let max_iterations = if repair_intent {
            2
        } else if strategy == RequirementStrategy::Brainstorm {
            6
        } else {
            5
        };

        let id = plan_id(
            &input.user_message,
            &input.agent_id,
            input.mode,
            input.platform,
            &input.project_type,
        );

        let checklist =
            build_dependency_checklist(&input.project_type, &tech_stack, input.ui_library.as_deref());

        let (tasks, blueprint) = if repair_intent {
            (repair_tasks(), None)
        } else {
            let blueprint = build_ui_blueprint(&input.user_message, input.platform, strategy);
            let tasks = generation_tasks(
                strategy,
                input.ui_library.is_some(),
                &checklist,
                &blueprint,
            );
            (tasks, Some(blueprint))
        };

        Ok(ExecutionPlan {
            id,
            created_at: Utc::now(),
            user_message: input.user_message.clone(),
            route: RouteDecision {
                mode: input.mode,
                platform: input.platform,
            },
            max_iterations,
            tasks,
            replan: ReplanPolicy::default(),
            metadata: PlanMetadata {
                platform: input.platform,
                tech_stack,
                project_type: input.project_type.clone(),
                requirement_strategy: strategy,
                ui_blueprint: blueprint,
                dependency_checklist: checklist,
            },
        })
    }
}

fn validate_tech_stack(raw: &[Value]) -> Result<Vec<String>, PlanError> {
    raw.iter()
        .map(|entry| {
            entry
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| PlanError {
                    code: INVALID_TECH_STACK,
                    detail: format!("tech stack entry `{entry}` is not a string"),
                })
        })
        .collect()
}

/// Stable for identical input modulo timestamps: first 8 hex chars of a
/// SHA-256 digest over the joined plan key.
pub fn plan_id(
    user_message: &str,
    agent_id: &str,
    mode: SessionMode,
    platform: Platform,
    project_type: &str,
) -> String {
    let normalized = user_message.split_whitespace().collect::<Vec<_>>().join(" ");
    let mode = match mode {
        SessionMode::Creator => "creator",
        SessionMode::Implementer => "implementer",
    };
    let platform = match platform {
        Platform::Web => "web",
        Platform::Desktop => "desktop",
        Platform::Mobile => "mobile",
        Platform::Miniprogram => "miniprogram",
    };
    let key = format!("{normalized}|{agent_id}|{mode}|{platform}|{project_type}");
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("plan-{}", &digest[..8])
}

fn task(
    phase: TaskPhase,
    agent: &str,
    mode: ExecutionMode,
    depends_on: &[&str],
    priority: i32,
    timeout_ms: u64,
    description: &str,
) -> ExecutionTask {
    ExecutionTask {
        id: format!("task-{}", phase.as_str()),
        phase,
        agent: agent.to_string(),
        mode,
        depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        priority,
        timeout_ms,
        max_retries: 1,
        description: description.to_string(),
        metadata: Value::Null,
    }
}

fn repair_tasks() -> Vec<ExecutionTask> {
    vec![
        task(
            TaskPhase::Repair,
            "frontend-repair",
            ExecutionMode::Serial,
            &[],
            0,
            180_000,
            "Reproduce the reported defect and apply a targeted fix",
        ),
        task(
            TaskPhase::Quality,
            "frontend-quality",
            ExecutionMode::Serial,
            &["task-repair"],
            0,
            120_000,
            "Verify the fix and sweep for regressions",
        ),
    ]
}

fn generation_tasks(
    strategy: RequirementStrategy,
    with_shared_components: bool,
    checklist: &[weave_types::DependencyRequirement],
    blueprint: &weave_types::UiBlueprint,
) -> Vec<ExecutionTask> {
    let mut tasks = Vec::new();

    tasks.push(task(
        TaskPhase::DesignSystem,
        "frontend-designer",
        ExecutionMode::Serial,
        &[],
        0,
        120_000,
        "Establish tokens, typography, and shared visual language",
    ));
    tasks.push(task(
        TaskPhase::Skeleton,
        "frontend-architect",
        ExecutionMode::Serial,
        &["task-design-system"],
        0,
        180_000,
        "Lay down the project skeleton, routing, and shared contracts",
    ));

    let mut gate_deps = vec!["task-skeleton"];
    if with_shared_components {
        tasks.push(task(
            TaskPhase::SharedComponents,
            "frontend-components",
            ExecutionMode::Serial,
            &["task-design-system"],
            0,
            150_000,
            "Build the shared component layer over the design system",
        ));
        gate_deps.push("task-shared-components");
    }

    tasks.push(task(
        TaskPhase::SkeletonL1Gate,
        "frontend-gatekeeper",
        ExecutionMode::Serial,
        &gate_deps,
        0,
        90_000,
        "Type-check the skeleton before contracts freeze",
    ));
    tasks.push(task(
        TaskPhase::ContractFreeze,
        "frontend-contracts",
        ExecutionMode::Serial,
        &["task-skeleton-l1-gate"],
        0,
        90_000,
        "Freeze types, stores, and shared UI contracts",
    ));

    let research_description = match strategy {
        RequirementStrategy::Brainstorm => {
            "Run requirement-brainstorm pass first, then resolve the dependency checklist and confirm the UI blueprint"
        }
        RequirementStrategy::Direct => {
            "Resolve the dependency checklist and confirm the UI blueprint"
        }
    };
    let mut research = task(
        TaskPhase::Research,
        "frontend-researcher",
        ExecutionMode::Serial,
        &["task-contract-freeze"],
        0,
        120_000,
        research_description,
    );
    research.metadata = json!({
        "dependencyChecklist": checklist,
        "requirementStrategy": strategy,
        "uiBlueprint": blueprint,
    });
    tasks.push(research);

    tasks.push(task(
        TaskPhase::Pages,
        "frontend-pages",
        ExecutionMode::Parallel,
        &["task-research"],
        3,
        180_000,
        "Implement every blueprint route as a working page",
    ));
    tasks.push(task(
        TaskPhase::Interactions,
        "frontend-interactions",
        ExecutionMode::Parallel,
        &["task-research"],
        2,
        180_000,
        "Wire the mandatory interactions across pages",
    ));
    tasks.push(task(
        TaskPhase::States,
        "frontend-states",
        ExecutionMode::Parallel,
        &["task-research"],
        1,
        180_000,
        "Cover loading, empty, and error states for every surface",
    ));
    tasks.push(task(
        TaskPhase::Quality,
        "frontend-quality",
        ExecutionMode::Serial,
        &["task-pages", "task-interactions", "task-states"],
        0,
        120_000,
        "Review the assembled project against the acceptance gates",
    ));

    tasks
}
