use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Platform, SessionMode, UiBlueprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPhase {
    DesignSystem,
    Skeleton,
    SkeletonL1Gate,
    ContractFreeze,
    Research,
    SharedComponents,
    Pages,
    Interactions,
    States,
    Quality,
    Repair,
}

impl TaskPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPhase::DesignSystem => "design-system",
            TaskPhase::Skeleton => "skeleton",
            TaskPhase::SkeletonL1Gate => "skeleton-l1-gate",
            TaskPhase::ContractFreeze => "contract-freeze",
            TaskPhase::Research => "research",
            TaskPhase::SharedComponents => "shared-components",
            TaskPhase::Pages => "pages",
            TaskPhase::Interactions => "interactions",
            TaskPhase::States => "states",
            TaskPhase::Quality => "quality",
            TaskPhase::Repair => "repair",
        }
    }

    pub fn is_critical(self) -> bool {
        matches!(
            self,
            TaskPhase::Pages | TaskPhase::Interactions | TaskPhase::States | TaskPhase::Quality
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Serial,
    Parallel,
    Pipeline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTask {
    pub id: String,
    pub phase: TaskPhase,
    pub agent: String,
    pub mode: ExecutionMode,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl ExecutionTask {
    pub fn new(id: impl Into<String>, phase: TaskPhase, agent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phase,
            agent: agent.into(),
            mode: ExecutionMode::Serial,
            depends_on: Vec::new(),
            priority: 0,
            timeout_ms: 120_000,
            max_retries: 1,
            description: String::new(),
            metadata: Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementStrategy {
    Direct,
    Brainstorm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub mode: SessionMode,
    pub platform: Platform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRequirement {
    pub package: String,
    pub dev: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplanPolicy {
    pub max_replan_depth: u32,
}

impl Default for ReplanPolicy {
    fn default() -> Self {
        Self {
            max_replan_depth: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetadata {
    pub platform: Platform,
    pub tech_stack: Vec<String>,
    pub project_type: String,
    pub requirement_strategy: RequirementStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_blueprint: Option<UiBlueprint>,
    #[serde(default)]
    pub dependency_checklist: Vec<DependencyRequirement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub user_message: String,
    pub route: RouteDecision,
    pub max_iterations: u32,
    pub tasks: Vec<ExecutionTask>,
    #[serde(default)]
    pub replan: ReplanPolicy,
    pub metadata: PlanMetadata,
}

impl ExecutionPlan {
    pub fn task(&self, id: &str) -> Option<&ExecutionTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn has_phase(&self, phase: TaskPhase) -> bool {
        self.tasks.iter().any(|t| t.phase == phase)
    }
}
