use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde_json::json;
use tracing::Level;

use weave_observability::{emit_event, ObservabilityEvent, ProcessKind};
use weave_plan::build_schedule;
use weave_policy::{SessionContractPolicy, SessionPolicyStore};
use weave_providers::{ChatMessage, LlmClient, StreamChunk};
use weave_store::FileStore;
use weave_tools::{ToolInvocation, ToolRegistry};
use weave_types::event::kind;
use weave_types::{
    budget_status, BudgetStatus, ExecutionMode, ExecutionPlan, ExecutionTask, Reflection,
    RequirementStrategy, RunBudget, RuntimeEvent, Session, TaskExecutionResult, TaskPhase,
    TaskStatus,
};

use crate::{
    compose_immutable_context, compose_replan_message, digest_frozen_contracts,
    execution_policy_block, frozen_contracts_block, reasoning_contract_block, reflect,
    FrozenContractBundle, IterationController, IterationDecision, ReflectionInput, Run,
};

const ARTIFACT_SAMPLE_LIMIT: usize = 8;
const ARTIFACT_SAMPLE_CHARS: usize = 2_000;

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub target_score: u32,
    pub budget: RunBudget,
    pub provider_hint: Option<String>,
    pub model_hint: Option<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            target_score: 80,
            budget: RunBudget::default(),
            provider_hint: None,
            model_hint: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KernelOutcome {
    pub iterations: u32,
    pub accepted: bool,
    pub reflection: Option<Reflection>,
    pub budget_stop_reason: Option<String>,
    pub results: Vec<TaskExecutionResult>,
    pub cancelled: bool,
}

#[derive(Default)]
struct StreamedToolCall {
    name: String,
    args: String,
}

pub struct ExecutionKernel {
    llm: Arc<dyn LlmClient>,
    files: Arc<dyn FileStore>,
    policies: Arc<dyn SessionPolicyStore>,
    tools: ToolRegistry,
    config: KernelConfig,
}

impl ExecutionKernel {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        files: Arc<dyn FileStore>,
        policies: Arc<dyn SessionPolicyStore>,
        tools: ToolRegistry,
        config: KernelConfig,
    ) -> Self {
        Self {
            llm,
            files,
            policies,
            tools,
            config,
        }
    }

    /// Drives the plan wave by wave under the iteration control loop until
    /// reflection accepts, a budget trips, or the run is cancelled.
    pub async fn execute(
        &self,
        session: &Session,
        plan: &ExecutionPlan,
        run: &Run,
    ) -> anyhow::Result<KernelOutcome> {
        let schedule = build_schedule(&plan.tasks);
        if schedule.has_cycle {
            anyhow::bail!(
                "execution plan has a dependency cycle (residual tasks: {})",
                schedule.residual_task_ids.join(", ")
            );
        }

        let controller = IterationController::new(self.config.target_score);
        let started = Instant::now();
        let tool_calls_total = AtomicU32::new(0);
        let mut user_message = plan.user_message.clone();
        let mut frozen_bundle: Option<FrozenContractBundle> = None;
        let mut replan_depth = 0u32;
        let mut last_reflection: Option<Reflection> = None;
        let mut last_results: Vec<TaskExecutionResult> = Vec::new();
        let strict_prototype = plan.route.mode == weave_types::SessionMode::Creator
            && matches!(
                plan.route.platform,
                weave_types::Platform::Web | weave_types::Platform::Desktop
            );

        let mut iteration = 0u32;
        loop {
            if run.is_cancelled() {
                return Ok(self.outcome(iteration, false, last_reflection, None, last_results, true));
            }
            if iteration >= plan.max_iterations {
                return Ok(self.outcome(
                    iteration,
                    false,
                    last_reflection,
                    Some("max_iterations".to_string()),
                    last_results,
                    false,
                ));
            }
            iteration += 1;

            if let Some(reason) = self.check_budgets(run, iteration, started, &tool_calls_total) {
                return Ok(self.outcome(
                    iteration - 1,
                    false,
                    last_reflection,
                    Some(reason),
                    last_results,
                    false,
                ));
            }

            let mut results: Vec<TaskExecutionResult> = Vec::new();
            for group in &schedule.groups {
                if run.is_cancelled() {
                    break;
                }
                let tasks: Vec<&ExecutionTask> = group
                    .task_ids
                    .iter()
                    .filter_map(|id| plan.task(id))
                    .collect();

                if group.mode == ExecutionMode::Serial {
                    for task in tasks {
                        let result = self
                            .execute_task(
                                session,
                                plan,
                                task,
                                group.wave,
                                iteration,
                                &user_message,
                                frozen_bundle.as_ref(),
                                run,
                                &tool_calls_total,
                            )
                            .await;
                        results.push(result);
                    }
                } else {
                    let task_futures: Vec<_> = tasks
                        .iter()
                        .map(|task| {
                            self.execute_task(
                                session,
                                plan,
                                task,
                                group.wave,
                                iteration,
                                &user_message,
                                frozen_bundle.as_ref(),
                                run,
                                &tool_calls_total,
                            )
                        })
                        .collect();
                    results.extend(futures::future::join_all(task_futures).await);
                }

                // contract freeze takes effect as soon as its task completes
                let froze = results.iter().any(|r| {
                    r.phase == TaskPhase::ContractFreeze && r.status == TaskStatus::Completed
                });
                if froze && frozen_bundle.is_none() {
                    frozen_bundle = Some(self.freeze_contracts(session).await);
                }
            }

            if run.is_cancelled() {
                return Ok(self.outcome(iteration, false, last_reflection, None, results, true));
            }

            let all_files = self.files.get_all_files(&session.id).await;
            let touched: Vec<String> = all_files.iter().map(|f| f.path.clone()).collect();
            let changed_this_iteration: HashSet<&String> =
                results.iter().flat_map(|r| &r.files_changed).collect();
            let samples: Vec<(String, String)> = all_files
                .iter()
                .rev()
                .take(ARTIFACT_SAMPLE_LIMIT)
                .map(|f| {
                    let excerpt: String = f.content.chars().take(ARTIFACT_SAMPLE_CHARS).collect();
                    (f.path.clone(), excerpt)
                })
                .collect();

            let outcome = reflect(&ReflectionInput {
                plan,
                results: &results,
                files_generated_total: all_files.len(),
                files_generated_this_iteration: changed_this_iteration.len(),
                touched_paths: &touched,
                artifact_samples: &samples,
            });
            let failed = results
                .iter()
                .filter(|r| r.status == TaskStatus::Failed)
                .count();
            last_reflection = Some(outcome.reflection.clone());

            match controller.decide(
                &outcome,
                failed,
                iteration,
                plan.max_iterations,
                replan_depth,
                plan.replan.max_replan_depth,
            ) {
                IterationDecision::Accept => {
                    return Ok(self.outcome(
                        iteration,
                        true,
                        last_reflection,
                        None,
                        results,
                        false,
                    ));
                }
                IterationDecision::Iterate(bundle) => {
                    replan_depth += 1;
                    user_message = compose_replan_message(
                        &plan.user_message,
                        &bundle,
                        plan.metadata.requirement_strategy,
                        strict_prototype,
                    );
                    last_results = results;
                }
                IterationDecision::Abort(_) => {
                    return Ok(self.outcome(
                        iteration,
                        false,
                        last_reflection,
                        Some("max_iterations".to_string()),
                        results,
                        false,
                    ));
                }
            }
        }
    }

    fn outcome(
        &self,
        iterations: u32,
        accepted: bool,
        reflection: Option<Reflection>,
        budget_stop_reason: Option<String>,
        results: Vec<TaskExecutionResult>,
        cancelled: bool,
    ) -> KernelOutcome {
        KernelOutcome {
            iterations,
            accepted,
            reflection,
            budget_stop_reason,
            results,
            cancelled,
        }
    }

    fn check_budgets(
        &self,
        run: &Run,
        iteration: u32,
        started: Instant,
        tool_calls: &AtomicU32,
    ) -> Option<String> {
        let budget = &self.config.budget;
        let mut stop = None;

        if let Some(max_steps) = budget.max_steps {
            let used = iteration.saturating_sub(1) as u64;
            let status = budget_status(used, max_steps as u64);
            self.emit_budget(run, "steps", used, max_steps as u64, status);
            if status == BudgetStatus::Exhausted {
                stop = Some("budget".to_string());
            }
        }
        if let Some(max_ms) = budget.max_duration_ms {
            let used = started.elapsed().as_millis() as u64;
            let status = budget_status(used, max_ms);
            self.emit_budget(run, "ms", used, max_ms, status);
            if status == BudgetStatus::Exhausted {
                stop = Some("budget".to_string());
            }
        }
        if let Some(max_calls) = budget.max_tool_calls {
            let used = tool_calls.load(Ordering::SeqCst) as u64;
            let status = budget_status(used, max_calls as u64);
            self.emit_budget(run, "calls", used, max_calls as u64, status);
            if status == BudgetStatus::Exhausted {
                stop = Some("budget".to_string());
            }
        }
        stop
    }

    fn emit_budget(&self, run: &Run, limit: &str, used: u64, max: u64, status: BudgetStatus) {
        run.emitter.emit(RuntimeEvent::new(
            kind::AUTONOMY_BUDGET,
            json!({"limit": limit, "used": used, "max": max, "status": status}),
        ));
    }

    async fn freeze_contracts(&self, session: &Session) -> FrozenContractBundle {
        let policy = SessionContractPolicy::default();
        let prefixes = policy.frozen_prefixes.clone();
        let files = self.files.get_all_files(&session.id).await;
        let bundle = digest_frozen_contracts(&files, &prefixes);
        self.policies
            .set_contract(&session.id, SessionContractPolicy::frozen(prefixes))
            .await;
        bundle
    }

    fn context_blocks(
        &self,
        plan: &ExecutionPlan,
        task: &ExecutionTask,
        frozen: Option<&FrozenContractBundle>,
    ) -> Vec<String> {
        let mut blocks = Vec::new();
        if let Some(blueprint) = &plan.metadata.ui_blueprint {
            blocks.push(reasoning_contract_block(blueprint));
        }
        if let Some(bundle) = frozen {
            blocks.push(frozen_contracts_block(bundle));
        }
        if task.phase == TaskPhase::Skeleton {
            blocks.push(execution_policy_block());
        }
        if plan.metadata.requirement_strategy == RequirementStrategy::Brainstorm
            && task.phase == TaskPhase::Research
        {
            blocks.push(crate::requirement_brainstorm_block());
        }
        blocks
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_task(
        &self,
        session: &Session,
        plan: &ExecutionPlan,
        task: &ExecutionTask,
        wave: usize,
        iteration: u32,
        user_message: &str,
        frozen: Option<&FrozenContractBundle>,
        run: &Run,
        tool_calls_total: &AtomicU32,
    ) -> TaskExecutionResult {
        let started = Instant::now();
        run.emitter.emit(RuntimeEvent::new(
            kind::AGENT_TASK_STARTED,
            json!({
                "taskId": task.id,
                "phase": task.phase,
                "agent": task.agent,
                "waveId": format!("wave-{wave}"),
                "iteration": iteration,
            }),
        ));

        let work = self.drive_task(
            session,
            plan,
            task,
            iteration,
            user_message,
            frozen,
            run,
            tool_calls_total,
        );
        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(task.timeout_ms),
            work,
        )
        .await;

        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                emit_event(
                    Level::ERROR,
                    ProcessKind::Engine,
                    ObservabilityEvent {
                        event: "task.failed",
                        component: "kernel",
                        session_id: Some(&session.id),
                        run_id: Some(&run.run_id),
                        task_id: Some(&task.id),
                        phase: Some(task.phase.as_str()),
                        provider_id: self.config.provider_hint.as_deref(),
                        model_id: self.config.model_hint.as_deref(),
                        status: Some("failed"),
                        error_code: None,
                        detail: Some(&err.to_string()),
                    },
                );
                TaskExecutionResult::failed(task.id.clone(), task.phase, err.to_string())
            }
            Err(_) => TaskExecutionResult::failed(
                task.id.clone(),
                task.phase,
                format!("task timed out after {}ms", task.timeout_ms),
            ),
        };
        result.duration_ms = started.elapsed().as_millis() as u64;

        let event_kind = match result.status {
            TaskStatus::Completed => kind::AGENT_TASK_COMPLETED,
            TaskStatus::Failed => kind::AGENT_TASK_BLOCKED,
            TaskStatus::Skipped => kind::AGENT_TASK_COMPLETED,
        };
        run.emitter.emit(RuntimeEvent::new(
            event_kind,
            json!({
                "taskId": task.id,
                "phase": task.phase,
                "status": result.status,
                "filesChanged": result.files_changed.len(),
                "error": result.error,
            }),
        ));
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive_task(
        &self,
        session: &Session,
        plan: &ExecutionPlan,
        task: &ExecutionTask,
        iteration: u32,
        user_message: &str,
        frozen: Option<&FrozenContractBundle>,
        run: &Run,
        tool_calls_total: &AtomicU32,
    ) -> anyhow::Result<TaskExecutionResult> {
        let context = compose_immutable_context(&self.context_blocks(plan, task, frozen));
        let mut full_message = user_message.to_string();
        if !context.is_empty() {
            full_message.push_str("\n\n");
            full_message.push_str(&context);
        }

        let messages = vec![
            ChatMessage::system(agent_system_prompt(&task.agent, task.phase, &task.description)),
            ChatMessage::user(full_message),
        ];

        let mut stream = self
            .llm
            .stream(
                self.config.provider_hint.as_deref(),
                self.config.model_hint.as_deref(),
                messages,
                Some(self.tools.list()),
                run.cancel.clone(),
            )
            .await?;

        let mut streamed_tool_calls: HashMap<String, StreamedToolCall> = HashMap::new();
        let mut completion = String::new();
        while let Some(chunk) = stream.next().await {
            if run.is_cancelled() {
                break;
            }
            match chunk? {
                StreamChunk::TextDelta(delta) => {
                    completion.push_str(&delta);
                    run.emitter.emit(RuntimeEvent::new(
                        kind::ASSISTANT_DELTA,
                        json!({"taskId": task.id, "delta": delta}),
                    ));
                }
                StreamChunk::ToolCallStart { id, name } => {
                    let entry = streamed_tool_calls.entry(id).or_default();
                    if entry.name.is_empty() {
                        entry.name = name;
                    }
                }
                StreamChunk::ToolCallDelta { id, args_delta } => {
                    let entry = streamed_tool_calls.entry(id).or_default();
                    entry.args.push_str(&args_delta);
                }
                StreamChunk::ToolCallEnd { .. } => {}
                StreamChunk::Done { .. } => break,
            }
        }

        let mut result = TaskExecutionResult::completed(task.id.clone(), task.phase);
        let mut ordered_calls: Vec<(String, StreamedToolCall)> =
            streamed_tool_calls.into_iter().collect();
        ordered_calls.sort_by(|a, b| a.0.cmp(&b.0));

        for (call_id, call) in ordered_calls {
            if call.name.trim().is_empty() {
                continue;
            }
            if run.is_cancelled() {
                break;
            }
            if let Some(max_calls) = self.config.budget.max_tool_calls {
                if tool_calls_total.load(Ordering::SeqCst) >= max_calls {
                    break;
                }
            }
            tool_calls_total.fetch_add(1, Ordering::SeqCst);
            result.tool_calls += 1;

            let args: serde_json::Value =
                serde_json::from_str(&call.args).unwrap_or_else(|_| json!({}));
            run.emitter.emit(RuntimeEvent::new(
                kind::TOOL_CALL_STARTED,
                json!({"callId": call_id, "tool": call.name, "taskId": task.id}),
            ));

            let invocation = ToolInvocation {
                session_id: session.id.clone(),
                iteration,
                agent_id: task.agent.clone(),
                call_id: call_id.clone(),
                session_mode: session.mode,
                args,
            };
            match self.tools.execute(&call.name, invocation).await {
                Ok(tool_result) => {
                    let path = tool_result
                        .metadata
                        .get("path")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string());
                    match tool_result.blocked_code() {
                        Some(code) => {
                            run.emitter.emit(RuntimeEvent::new(
                                kind::TOOL_CALL_FAILED,
                                json!({
                                    "callId": call_id,
                                    "tool": call.name,
                                    "code": code,
                                    "output": tool_result.output,
                                }),
                            ));
                        }
                        None => {
                            run.emitter.emit(RuntimeEvent::new(
                                kind::TOOL_CALL_COMPLETED,
                                json!({"callId": call_id, "tool": call.name, "title": tool_result.title}),
                            ));
                            if let Some(path) = path {
                                if matches!(call.name.as_str(), "write_file" | "apply_diff") {
                                    result.files_changed.push(path.clone());
                                    run.emitter.emit(RuntimeEvent::new(
                                        kind::ARTIFACT_FILE_CHANGED,
                                        json!({"path": path, "taskId": task.id}),
                                    ));
                                }
                            }
                        }
                    }
                }
                Err(err) => {
                    run.emitter.emit(RuntimeEvent::new(
                        kind::TOOL_CALL_FAILED,
                        json!({"callId": call_id, "tool": call.name, "error": err.to_string()}),
                    ));
                }
            }
        }

        Ok(result)
    }
}

fn agent_system_prompt(agent: &str, phase: TaskPhase, description: &str) -> String {
    format!(
        "You are `{agent}`, a frontend build agent responsible for the `{}` phase. {description}. \
Work only through the provided tools (write_file, apply_diff, read_file); paths are workspace-relative. \
Honor every `[ImmutableContext]` block verbatim.",
        phase.as_str()
    )
}
