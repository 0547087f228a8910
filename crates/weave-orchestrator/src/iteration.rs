use serde::{Deserialize, Serialize};

use weave_types::{ReflectionIssue, RequirementStrategy, TaskPhase};

use crate::{
    autonomous_iteration_tag, replan_depth_tag, requirement_brainstorm_block,
    rich_prototype_quality_gate_block, ReflectionOutcome,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplanDiagnosticBundle {
    pub iteration: u32,
    pub replan_depth: u32,
    pub max_replan_depth: u32,
    pub summary: String,
    pub issues: Vec<ReflectionIssue>,
    pub next_phase_hints: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum IterationDecision {
    Accept,
    Iterate(ReplanDiagnosticBundle),
    Abort(ReplanDiagnosticBundle),
}

#[derive(Debug, Clone)]
pub struct IterationController {
    pub target_score: u32,
}

impl Default for IterationController {
    fn default() -> Self {
        Self { target_score: 80 }
    }
}

impl IterationController {
    pub fn new(target_score: u32) -> Self {
        Self { target_score }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &self,
        outcome: &ReflectionOutcome,
        failed_results: usize,
        iteration: u32,
        max_iterations: u32,
        replan_depth: u32,
        max_replan_depth: u32,
    ) -> IterationDecision {
        let accept = outcome.reflection.score >= self.target_score
            && failed_results == 0
            && outcome.strict_gate_passed
            && outcome.missing_critical_phases.is_empty();
        if accept {
            return IterationDecision::Accept;
        }

        let bundle = ReplanDiagnosticBundle {
            iteration,
            replan_depth,
            max_replan_depth,
            summary: outcome.reflection.summary.clone(),
            issues: outcome.reflection.issues.clone(),
            next_phase_hints: phase_hints(&outcome.missing_critical_phases),
        };

        if iteration < max_iterations && replan_depth <= max_replan_depth {
            IterationDecision::Iterate(bundle)
        } else {
            IterationDecision::Abort(bundle)
        }
    }
}

fn phase_hints(missing: &[TaskPhase]) -> Vec<String> {
    missing
        .iter()
        .map(|phase| format!("complete the `{}` phase", phase.as_str()))
        .collect()
}

/// Rewrites the user message for the next iteration: iteration and depth
/// tags, top-3 issues with suggestions, top-3 next-task hints, plus the
/// policy blocks the run's strategy requires.
pub fn compose_replan_message(
    original_message: &str,
    bundle: &ReplanDiagnosticBundle,
    strategy: RequirementStrategy,
    strict_prototype: bool,
) -> String {
    let mut message = String::from(original_message);
    message.push_str("\n\n");
    message.push_str(&autonomous_iteration_tag(bundle.iteration));
    message.push('\n');
    message.push_str(&replan_depth_tag(bundle.replan_depth, bundle.max_replan_depth));

    if !bundle.issues.is_empty() {
        message.push_str("\n[OpenIssues]");
        for issue in bundle.issues.iter().take(3) {
            message.push_str(&format!("\n- {}", issue.detail));
            if let Some(suggestion) = &issue.suggestion {
                message.push_str(&format!(" (suggestion: {suggestion})"));
            }
        }
    }

    if !bundle.next_phase_hints.is_empty() {
        message.push_str("\n[NextTasks]");
        for hint in bundle.next_phase_hints.iter().take(3) {
            message.push_str(&format!("\n- {hint}"));
        }
    }

    if strategy == RequirementStrategy::Brainstorm {
        message.push('\n');
        message.push_str(&requirement_brainstorm_block());
    }
    if strict_prototype {
        message.push('\n');
        message.push_str(&rich_prototype_quality_gate_block());
    }

    message
}
