use regex::Regex;
use serde::{Deserialize, Serialize};

use weave_types::{
    ExecutionPlan, IssueSeverity, Platform, Reflection, ReflectionIssue, SessionMode, TaskPhase,
    TaskStatus, TaskExecutionResult,
};

pub const STRICT_COVERAGE_BASELINE: u32 = 80;
pub const LAX_COVERAGE_BASELINE: u32 = 58;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSignals {
    pub layout_shell: bool,
    pub route_structure: bool,
    pub data_surface: bool,
    pub form_flow: bool,
    pub validation: bool,
    pub state_management: bool,
    pub async_interaction: bool,
    pub multiple_views: bool,
}

impl InteractionSignals {
    pub fn coverage(&self) -> u32 {
        let truths = [
            self.layout_shell,
            self.route_structure,
            self.data_surface,
            self.form_flow,
            self.validation,
            self.state_management,
            self.async_interaction,
            self.multiple_views,
        ];
        let count = truths.iter().filter(|t| **t).count() as f64;
        ((count / 8.0) * 100.0).round().clamp(0.0, 100.0) as u32
    }
}

#[derive(Debug, Clone)]
pub struct ReflectionInput<'a> {
    pub plan: &'a ExecutionPlan,
    pub results: &'a [TaskExecutionResult],
    pub files_generated_total: usize,
    pub files_generated_this_iteration: usize,
    pub touched_paths: &'a [String],
    /// (path, content excerpt) pairs sampled from generated artifacts.
    pub artifact_samples: &'a [(String, String)],
}

#[derive(Debug, Clone)]
pub struct ReflectionOutcome {
    pub reflection: Reflection,
    pub signals: InteractionSignals,
    pub strict_required: bool,
    pub strict_gate_passed: bool,
    pub missing_critical_phases: Vec<TaskPhase>,
}

struct SignalPatterns {
    layout_path: Regex,
    layout_text: Regex,
    route_path: Regex,
    route_text: Regex,
    data_text: Regex,
    form_text: Regex,
    validation_text: Regex,
    state_text: Regex,
    async_text: Regex,
    view_path: Regex,
    placeholder: Regex,
}

impl SignalPatterns {
    fn new() -> Self {
        Self {
            layout_path: Regex::new(r"(?i)(layout|shell|scaffold)").expect("layout path regex"),
            layout_text: Regex::new(r"(?i)(<header|<aside|<nav|app-shell)").expect("layout regex"),
            route_path: Regex::new(r"(?i)(routes?|router)").expect("route path regex"),
            route_text: Regex::new(
                r"(?i)(createBrowserRouter|createHashRouter|<Route|useRoutes|useNavigate)",
            )
            .expect("route text regex"),
            data_text: Regex::new(r"(?i)(<table|<tbody|dataSource=|columns=|<List|\.map\()")
                .expect("data regex"),
            form_text: Regex::new(r"(?i)(<form|onSubmit|handleSubmit|<Form)").expect("form regex"),
            validation_text: Regex::new(r"(?i)(required|validate|rules=|zod|yup|errors\.)")
                .expect("validation regex"),
            state_text: Regex::new(
                r"(?i)(useState|useReducer|zustand|createSlice|configureStore|useStore)",
            )
            .expect("state regex"),
            async_text: Regex::new(r"(?i)(await |async |fetch\(|axios|useEffect|isLoading|loading)")
                .expect("async regex"),
            view_path: Regex::new(r"(?i)(pages?|views?|screens?)/").expect("view path regex"),
            placeholder: Regex::new(r"占位|placeholder|TODO|待补充|coming soon|to be implemented|可扩展")
                .expect("placeholder regex"),
        }
    }
}

pub fn derive_signals(touched_paths: &[String], samples: &[(String, String)]) -> InteractionSignals {
    let patterns = SignalPatterns::new();
    let any_path = |re: &Regex| touched_paths.iter().any(|p| re.is_match(p));
    let any_text = |re: &Regex| samples.iter().any(|(_, text)| re.is_match(text));

    let view_count = touched_paths
        .iter()
        .filter(|p| patterns.view_path.is_match(p))
        .count();

    InteractionSignals {
        layout_shell: any_path(&patterns.layout_path) || any_text(&patterns.layout_text),
        route_structure: any_path(&patterns.route_path) || any_text(&patterns.route_text),
        data_surface: any_text(&patterns.data_text),
        form_flow: any_text(&patterns.form_text),
        validation: any_text(&patterns.validation_text),
        state_management: any_text(&patterns.state_text),
        async_interaction: any_text(&patterns.async_text),
        multiple_views: view_count >= 2,
    }
}

fn has_placeholders(samples: &[(String, String)]) -> bool {
    let patterns = SignalPatterns::new();
    samples
        .iter()
        .any(|(_, text)| patterns.placeholder.is_match(text))
}

fn standalone_html_only(touched_paths: &[String]) -> bool {
    !touched_paths.is_empty()
        && touched_paths.iter().all(|p| {
            p.ends_with(".html") || p.ends_with(".htm")
        })
}

fn clamp_score(value: i64) -> u32 {
    value.clamp(0, 100) as u32
}

/// Scores one execution iteration and assembles the issue list the replan
/// prompt feeds back to the model.
pub fn reflect(input: &ReflectionInput<'_>) -> ReflectionOutcome {
    let strict_required = input.plan.route.mode == SessionMode::Creator
        && matches!(input.plan.route.platform, Platform::Web | Platform::Desktop);

    let signals = derive_signals(input.touched_paths, input.artifact_samples);
    let coverage = signals.coverage();

    let completed = input
        .results
        .iter()
        .filter(|r| r.status == TaskStatus::Completed)
        .count() as i64;
    let failed = input
        .results
        .iter()
        .filter(|r| r.status == TaskStatus::Failed)
        .count() as i64;
    let skipped = input
        .results
        .iter()
        .filter(|r| r.status == TaskStatus::Skipped)
        .count() as i64;

    let missing_critical_phases: Vec<TaskPhase> = [
        TaskPhase::Pages,
        TaskPhase::Interactions,
        TaskPhase::States,
        TaskPhase::Quality,
    ]
    .into_iter()
    .filter(|phase| input.plan.has_phase(*phase))
    .filter(|phase| {
        !input
            .results
            .iter()
            .any(|r| r.phase == *phase && r.status == TaskStatus::Completed)
    })
    .collect();
    let missing = missing_critical_phases.len() as i64;

    let total_tasks = input.plan.tasks.len().max(1) as f64;
    let completion_ratio = (completed as f64) / total_tasks;

    let baseline = if strict_required {
        STRICT_COVERAGE_BASELINE
    } else {
        LAX_COVERAGE_BASELINE
    } as i64;
    let coverage_penalty = (baseline - coverage as i64).max(0);

    let files_generated = input.files_generated_total as i64;
    let low_file_penalty = if strict_required && files_generated < 10 {
        12
    } else if !strict_required && files_generated < 6 {
        6
    } else {
        0
    };

    let demand_match = clamp_score((completion_ratio * 100.0).round() as i64 - 10 * missing);
    let consistency = clamp_score(
        100 - 18 * failed - 5 * skipped - ((0.25 * coverage_penalty as f64).round() as i64),
    );
    let code_quality = clamp_score(
        70 + files_generated.min(25) - 15 * failed - coverage_penalty - low_file_penalty
            - 8 * missing,
    );
    let best_practice = clamp_score(
        75 + 4 * completed.min(5) - 12 * failed - ((0.7 * coverage_penalty as f64).round() as i64)
            - 8 * missing,
    );
    let score = clamp_score(
        (0.3 * demand_match as f64
            + 0.2 * consistency as f64
            + 0.25 * code_quality as f64
            + 0.15 * best_practice as f64
            + 0.1 * coverage as f64)
            .round() as i64,
    );

    let placeholders = has_placeholders(input.artifact_samples);
    let html_only = standalone_html_only(input.touched_paths);

    let mut issues: Vec<ReflectionIssue> = Vec::new();
    for result in input.results.iter().filter(|r| r.status == TaskStatus::Failed) {
        issues.push(ReflectionIssue {
            severity: IssueSeverity::Critical,
            category: "task-failed".to_string(),
            detail: format!(
                "task `{}` ({}) failed: {}",
                result.task_id,
                result.phase.as_str(),
                result.error.as_deref().unwrap_or("no error detail")
            ),
            suggestion: Some("rerun the phase with the failure context attached".to_string()),
        });
    }
    for phase in &missing_critical_phases {
        issues.push(ReflectionIssue {
            severity: IssueSeverity::Critical,
            category: "missing-phase".to_string(),
            detail: format!("critical phase `{}` has no completed result", phase.as_str()),
            suggestion: Some(format!("schedule the `{}` phase next", phase.as_str())),
        });
    }
    if strict_required {
        let mandatory = [
            ("dataSurface", signals.data_surface),
            ("formFlow", signals.form_flow),
            ("stateManagement", signals.state_management),
            ("multipleViews", signals.multiple_views),
            ("routeStructure", signals.route_structure),
        ];
        for (name, present) in mandatory {
            if !present {
                issues.push(ReflectionIssue {
                    severity: IssueSeverity::Warning,
                    category: "signal-missing".to_string(),
                    detail: format!("strict prototype requires the `{name}` signal"),
                    suggestion: Some(format!("add artifacts that exercise `{name}`")),
                });
            }
        }
    }
    if html_only {
        issues.push(ReflectionIssue {
            severity: IssueSeverity::Critical,
            category: "standalone-html".to_string(),
            detail: "output is standalone HTML only; a component project is required".to_string(),
            suggestion: Some("generate framework components instead of flat HTML".to_string()),
        });
    }
    if placeholders {
        issues.push(ReflectionIssue {
            severity: IssueSeverity::Warning,
            category: "placeholder-content".to_string(),
            detail: "generated artifacts still carry placeholder copy".to_string(),
            suggestion: Some("replace placeholders with realistic domain content".to_string()),
        });
    }
    if input.files_generated_this_iteration == 0 {
        issues.push(ReflectionIssue {
            severity: IssueSeverity::Warning,
            category: "no-incremental-change".to_string(),
            detail: "the iteration produced no file changes".to_string(),
            suggestion: Some("target the highest-priority open issue directly".to_string()),
        });
    }

    let strict_gate_passed = !strict_required
        || !(
            !signals.data_surface
                || !signals.form_flow
                || !signals.state_management
                || !signals.multiple_views
                || !signals.route_structure
                || coverage < STRICT_COVERAGE_BASELINE
                || placeholders
                || html_only
                || input.files_generated_this_iteration == 0
        );

    let should_iterate = failed > 0 || missing > 0 || !strict_gate_passed;

    let summary = format!(
        "score {score} (demand {demand_match}, consistency {consistency}, quality {code_quality}, practice {best_practice}, coverage {coverage}); {completed} completed / {failed} failed / {skipped} skipped; {} issue(s)",
        issues.len()
    );

    ReflectionOutcome {
        reflection: Reflection {
            score,
            demand_match,
            consistency,
            code_quality,
            best_practice,
            should_iterate,
            summary,
            issues,
        },
        signals,
        strict_required,
        strict_gate_passed,
        missing_critical_phases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use weave_types::{
        ExecutionMode, ExecutionTask, PlanMetadata, ReplanPolicy, RequirementStrategy,
        RouteDecision,
    };

    fn plan(mode: SessionMode, platform: Platform) -> ExecutionPlan {
        let mut tasks = Vec::new();
        for (id, phase) in [
            ("task-pages", TaskPhase::Pages),
            ("task-interactions", TaskPhase::Interactions),
            ("task-states", TaskPhase::States),
            ("task-quality", TaskPhase::Quality),
        ] {
            let mut task = ExecutionTask::new(id, phase, "frontend-pages");
            task.mode = ExecutionMode::Parallel;
            tasks.push(task);
        }
        ExecutionPlan {
            id: "plan-test".to_string(),
            created_at: Utc::now(),
            user_message: "demo".to_string(),
            route: RouteDecision { mode, platform },
            max_iterations: 5,
            tasks,
            replan: ReplanPolicy::default(),
            metadata: PlanMetadata {
                platform,
                tech_stack: Vec::new(),
                project_type: "react-vite".to_string(),
                requirement_strategy: RequirementStrategy::Direct,
                ui_blueprint: None,
                dependency_checklist: Vec::new(),
            },
        }
    }

    fn completed_results(plan: &ExecutionPlan) -> Vec<TaskExecutionResult> {
        plan.tasks
            .iter()
            .map(|t| TaskExecutionResult::completed(t.id.clone(), t.phase))
            .collect()
    }

    fn rich_samples() -> Vec<(String, String)> {
        vec![
            (
                "src/router.tsx".to_string(),
                "import { createBrowserRouter, Route } from 'react-router-dom';".to_string(),
            ),
            (
                "src/pages/Orders.tsx".to_string(),
                "const rows = orders.map(o => <tr>{o.id}</tr>); return <table><tbody>{rows}</tbody></table>;"
                    .to_string(),
            ),
            (
                "src/pages/OrderForm.tsx".to_string(),
                "<form onSubmit={handleSubmit}> required validate errors.name await fetch('/api')"
                    .to_string(),
            ),
            (
                "src/store/orders.ts".to_string(),
                "import { create } from 'zustand'; export const useStore = create(() => ({}));"
                    .to_string(),
            ),
            (
                "src/layout/AppLayout.tsx".to_string(),
                "<header>app</header><nav>menu</nav>".to_string(),
            ),
        ]
    }

    fn rich_paths() -> Vec<String> {
        vec![
            "src/router.tsx".to_string(),
            "src/pages/Orders.tsx".to_string(),
            "src/pages/OrderForm.tsx".to_string(),
            "src/store/orders.ts".to_string(),
            "src/layout/AppLayout.tsx".to_string(),
        ]
    }

    #[test]
    fn all_signals_yield_full_coverage() {
        let signals = derive_signals(&rich_paths(), &rich_samples());
        assert_eq!(signals.coverage(), 100);
    }

    #[test]
    fn healthy_iteration_scores_high_and_passes_the_gate() {
        let plan = plan(SessionMode::Creator, Platform::Web);
        let results = completed_results(&plan);
        let paths = rich_paths();
        let samples = rich_samples();
        let outcome = reflect(&ReflectionInput {
            plan: &plan,
            results: &results,
            files_generated_total: 18,
            files_generated_this_iteration: 18,
            touched_paths: &paths,
            artifact_samples: &samples,
        });
        assert!(outcome.strict_required);
        assert!(outcome.strict_gate_passed);
        assert!(outcome.missing_critical_phases.is_empty());
        assert!(outcome.reflection.score >= 90);
        assert_eq!(outcome.reflection.demand_match, 100);
    }

    #[test]
    fn failed_tasks_drag_consistency_down() {
        let plan = plan(SessionMode::Implementer, Platform::Web);
        let mut results = completed_results(&plan);
        results[0] = TaskExecutionResult::failed("task-pages", TaskPhase::Pages, "boom");
        let paths = rich_paths();
        let samples = rich_samples();
        let outcome = reflect(&ReflectionInput {
            plan: &plan,
            results: &results,
            files_generated_total: 12,
            files_generated_this_iteration: 3,
            touched_paths: &paths,
            artifact_samples: &samples,
        });
        assert_eq!(outcome.reflection.consistency, 82);
        assert!(outcome
            .reflection
            .issues
            .iter()
            .any(|i| i.category == "task-failed"));
        // pages failed, so the phase is missing a completed result
        assert_eq!(outcome.missing_critical_phases, vec![TaskPhase::Pages]);
    }

    #[test]
    fn strict_gate_fails_without_mandatory_signals() {
        let plan = plan(SessionMode::Creator, Platform::Web);
        let results = completed_results(&plan);
        let paths = vec!["src/pages/Home.tsx".to_string()];
        let samples = vec![(
            "src/pages/Home.tsx".to_string(),
            "export default function Home() { return <div>hi</div>; }".to_string(),
        )];
        let outcome = reflect(&ReflectionInput {
            plan: &plan,
            results: &results,
            files_generated_total: 3,
            files_generated_this_iteration: 3,
            touched_paths: &paths,
            artifact_samples: &samples,
        });
        assert!(!outcome.strict_gate_passed);
        assert!(outcome
            .reflection
            .issues
            .iter()
            .any(|i| i.category == "signal-missing"));
    }

    #[test]
    fn lax_mode_ignores_the_strict_gate() {
        let plan = plan(SessionMode::Implementer, Platform::Mobile);
        let results = completed_results(&plan);
        let paths = vec!["src/screens/Home.tsx".to_string()];
        let samples: Vec<(String, String)> = Vec::new();
        let outcome = reflect(&ReflectionInput {
            plan: &plan,
            results: &results,
            files_generated_total: 8,
            files_generated_this_iteration: 2,
            touched_paths: &paths,
            artifact_samples: &samples,
        });
        assert!(!outcome.strict_required);
        assert!(outcome.strict_gate_passed);
    }

    #[test]
    fn placeholder_copy_is_flagged() {
        let plan = plan(SessionMode::Creator, Platform::Web);
        let results = completed_results(&plan);
        let paths = rich_paths();
        let mut samples = rich_samples();
        samples.push((
            "src/pages/About.tsx".to_string(),
            "<p>coming soon</p>".to_string(),
        ));
        let outcome = reflect(&ReflectionInput {
            plan: &plan,
            results: &results,
            files_generated_total: 18,
            files_generated_this_iteration: 4,
            touched_paths: &paths,
            artifact_samples: &samples,
        });
        assert!(!outcome.strict_gate_passed);
        assert!(outcome
            .reflection
            .issues
            .iter()
            .any(|i| i.category == "placeholder-content"));
    }

    #[test]
    fn standalone_html_output_fails_strict() {
        let plan = plan(SessionMode::Creator, Platform::Web);
        let results = completed_results(&plan);
        let paths = vec!["index.html".to_string()];
        let samples = vec![("index.html".to_string(), "<html></html>".to_string())];
        let outcome = reflect(&ReflectionInput {
            plan: &plan,
            results: &results,
            files_generated_total: 1,
            files_generated_this_iteration: 1,
            touched_paths: &paths,
            artifact_samples: &samples,
        });
        assert!(!outcome.strict_gate_passed);
        assert!(outcome
            .reflection
            .issues
            .iter()
            .any(|i| i.category == "standalone-html"));
    }

    #[test]
    fn empty_iteration_fails_strict_even_when_signals_hold() {
        let plan = plan(SessionMode::Creator, Platform::Web);
        let results = completed_results(&plan);
        let paths = rich_paths();
        let samples = rich_samples();
        let outcome = reflect(&ReflectionInput {
            plan: &plan,
            results: &results,
            files_generated_total: 18,
            files_generated_this_iteration: 0,
            touched_paths: &paths,
            artifact_samples: &samples,
        });
        assert!(!outcome.strict_gate_passed);
        assert!(outcome
            .reflection
            .issues
            .iter()
            .any(|i| i.category == "no-incremental-change"));
    }
}
