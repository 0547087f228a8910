use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};

use weave_events::EventBus;
use weave_plan::{build_schedule, PlanGenerator, PlanInput};
use weave_policy::SessionPolicyStore;
use weave_providers::{ChatMessage, LlmClient, StreamChunk};
use weave_repair::{RepairReport, SelfRepairLoop};
use weave_store::FileStore;
use weave_tools::ToolRegistry;
use weave_types::event::kind;
use weave_types::{
    budget_status, ExecutionPlan, Platform, Reflection, RunBudget, RuntimeEvent, Session,
};

use crate::{
    is_aborted, with_retry, Aborted, Blackboard, ExecutionKernel, KernelConfig, KernelOutcome,
    RetrySpec, Run, KEY_ANALYSIS_DOCUMENTS, KEY_EXECUTION_SUMMARY,
};

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub session: Session,
    pub user_message: String,
    pub agent_id: String,
    pub platform: Platform,
    pub project_type: String,
    pub tech_stack: Vec<Value>,
    pub ui_library: Option<String>,
    pub budget: Option<RunBudget>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub success: bool,
    pub termination_reason: String,
    pub reflection: Option<Reflection>,
    pub repair: Option<RepairReport>,
}

/// Analysis, then planning, then execution, over a shared blackboard.
/// Terminal events are emitted here and nowhere below.
pub struct ThreeLayerOrchestrator {
    llm: Arc<dyn LlmClient>,
    files: Arc<dyn FileStore>,
    policies: Arc<dyn SessionPolicyStore>,
    tools: ToolRegistry,
    generator: PlanGenerator,
    repair: Option<Arc<SelfRepairLoop>>,
    retry: RetrySpec,
    bus: EventBus,
    kernel_config: KernelConfig,
}

impl ThreeLayerOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        files: Arc<dyn FileStore>,
        policies: Arc<dyn SessionPolicyStore>,
        tools: ToolRegistry,
        generator: PlanGenerator,
        repair: Option<Arc<SelfRepairLoop>>,
        retry: RetrySpec,
        bus: EventBus,
        kernel_config: KernelConfig,
    ) -> Self {
        Self {
            llm,
            files,
            policies,
            tools,
            generator,
            repair,
            retry,
            bus,
            kernel_config,
        }
    }

    pub fn event_bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub async fn run(&self, request: PipelineRequest) -> anyhow::Result<PipelineOutcome> {
        let run = Run::new(request.session.id.clone(), self.bus.clone());
        self.run_with(request, run).await
    }

    pub async fn run_with(
        &self,
        request: PipelineRequest,
        run: Run,
    ) -> anyhow::Result<PipelineOutcome> {
        let blackboard = Blackboard::new();

        if let Some(budget) = &request.budget {
            self.advertise_budget(&run, budget);
        }

        // analysis
        let documents = self
            .stage(&run, "analysis", || self.analysis_stage(&request, &run))
            .await?;
        blackboard.put(KEY_ANALYSIS_DOCUMENTS, documents).await;

        // planning
        let plan = self
            .stage(&run, "planning", || self.planning_stage(&request))
            .await?;
        blackboard.set_plan(&plan).await;

        // execution
        let kernel_outcome = self
            .stage(&run, "execution", || {
                self.execution_stage(&request, &plan, &run)
            })
            .await?;
        blackboard
            .put(
                KEY_EXECUTION_SUMMARY,
                json!({
                    "iterations": kernel_outcome.iterations,
                    "accepted": kernel_outcome.accepted,
                    "budgetStopReason": kernel_outcome.budget_stop_reason,
                }),
            )
            .await;

        if kernel_outcome.cancelled {
            return Err(anyhow::Error::new(Aborted));
        }

        // post-run self-repair against the session artifact set
        let repair_report = match &self.repair {
            Some(repair) if request.session.template.supports_validation() => {
                match repair
                    .run(&request.session, Some(&run.emitter), run.cancel.clone())
                    .await
                {
                    Ok(report) => Some(report),
                    Err(err) => {
                        if run.is_cancelled() {
                            return Err(anyhow::Error::new(Aborted));
                        }
                        tracing::warn!("self-repair did not run: {err}");
                        None
                    }
                }
            }
            _ => None,
        };

        let repair_clean = repair_report
            .as_ref()
            .map(|r| r.resolved || r.remaining.is_empty())
            .unwrap_or(true);
        let success = kernel_outcome.accepted && repair_clean;
        let termination_reason = if kernel_outcome.accepted {
            "accept"
        } else {
            match kernel_outcome.budget_stop_reason.as_deref() {
                Some("budget") => "budget",
                Some("max_iterations") => "max_iterations",
                _ => "error",
            }
        };

        run.emitter.emit(RuntimeEvent::new(
            kind::RUN_COMPLETED,
            json!({
                "success": success,
                "terminationReason": termination_reason,
                "iterations": kernel_outcome.iterations,
                "score": kernel_outcome.reflection.as_ref().map(|r| r.score),
            }),
        ));

        // with unresolved repair issues, a transport that still expects an
        // error frame gets at most this digest; the once-only wrapper drops
        // it when the completed frame above already went out
        if !success {
            if let Some(report) = &repair_report {
                if !report.remaining.is_empty() {
                    let digest: Vec<String> = report
                        .remaining
                        .iter()
                        .take(5)
                        .map(|e| e.message.clone())
                        .collect();
                    run.emitter.emit(RuntimeEvent::new(
                        kind::RUN_ERROR,
                        json!({"error": digest.join("; ")}),
                    ));
                }
            }
        }

        Ok(PipelineOutcome {
            run_id: run.run_id.clone(),
            success,
            termination_reason: termination_reason.to_string(),
            reflection: kernel_outcome.reflection,
            repair: repair_report,
        })
    }

    fn advertise_budget(&self, run: &Run, budget: &RunBudget) {
        let mut limits: Vec<(&str, u64)> = Vec::new();
        if let Some(steps) = budget.max_steps {
            limits.push(("steps", steps as u64));
        }
        if let Some(ms) = budget.max_duration_ms {
            limits.push(("ms", ms));
        }
        if let Some(calls) = budget.max_tool_calls {
            limits.push(("calls", calls as u64));
        }
        for (limit, max) in limits {
            run.emitter.emit(RuntimeEvent::new(
                kind::AUTONOMY_BUDGET,
                json!({
                    "limit": limit,
                    "used": 0,
                    "max": max,
                    "status": budget_status(0, max),
                }),
            ));
        }
    }

    /// Stage protocol: started event, transient retry, completed event; a
    /// fatal failure emits `run.error` and propagates.
    async fn stage<T, F, Fut>(&self, run: &Run, name: &str, op: F) -> anyhow::Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        run.emitter.emit(RuntimeEvent::new(
            kind::AGENT_TASK_STARTED,
            json!({
                "taskId": format!("orchestrator-{name}"),
                "waveId": "orchestration",
            }),
        ));

        match with_retry(|_attempt| op(), &self.retry, &run.cancel).await {
            Ok(value) => {
                run.emitter.emit(RuntimeEvent::new(
                    kind::AGENT_TASK_COMPLETED,
                    json!({
                        "taskId": format!("orchestrator-{name}"),
                        "waveId": "orchestration",
                    }),
                ));
                Ok(value)
            }
            Err(err) => {
                if is_aborted(&err) {
                    // cancellation never emits a terminal event
                    return Err(err);
                }
                run.emitter.emit(RuntimeEvent::new(
                    kind::RUN_ERROR,
                    json!({"error": format!("{name} layer failed: {err}")}),
                ));
                Err(err)
            }
        }
    }

    async fn analysis_stage(&self, request: &PipelineRequest, run: &Run) -> anyhow::Result<Value> {
        let messages = vec![
            ChatMessage::system(
                "You are the analysis layer of a frontend generation pipeline. Produce a concise \
requirement analysis and an architecture outline for the request. Answer in two sections titled \
`Requirements` and `Architecture`.",
            ),
            ChatMessage::user(request.user_message.clone()),
        ];
        let mut stream = self
            .llm
            .stream(
                self.kernel_config.provider_hint.as_deref(),
                self.kernel_config.model_hint.as_deref(),
                messages,
                None,
                run.cancel.clone(),
            )
            .await?;

        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            if run.is_cancelled() {
                return Err(anyhow::Error::new(Aborted));
            }
            match chunk? {
                StreamChunk::TextDelta(delta) => {
                    text.push_str(&delta);
                    run.emitter.emit(RuntimeEvent::new(
                        kind::ASSISTANT_DELTA,
                        json!({"taskId": "orchestrator-analysis", "delta": delta}),
                    ));
                }
                StreamChunk::Done { .. } => break,
                _ => {}
            }
        }

        Ok(json!({
            "request": request.user_message,
            "documents": text,
        }))
    }

    async fn planning_stage(&self, request: &PipelineRequest) -> anyhow::Result<ExecutionPlan> {
        let plan = self.generator.generate(&PlanInput {
            user_message: request.user_message.clone(),
            agent_id: request.agent_id.clone(),
            mode: request.session.mode,
            platform: request.platform,
            project_type: request.project_type.clone(),
            tech_stack: request.tech_stack.clone(),
            ui_library: request.ui_library.clone(),
        })?;

        let schedule = build_schedule(&plan.tasks);
        if schedule.has_cycle {
            anyhow::bail!(
                "plan schedule has a cycle (residual: {})",
                schedule.residual_task_ids.join(", ")
            );
        }
        Ok(plan)
    }

    async fn execution_stage(
        &self,
        request: &PipelineRequest,
        plan: &ExecutionPlan,
        run: &Run,
    ) -> anyhow::Result<KernelOutcome> {
        let mut config = self.kernel_config.clone();
        if let Some(budget) = &request.budget {
            config.budget = budget.clone();
        }
        let kernel = ExecutionKernel::new(
            self.llm.clone(),
            self.files.clone(),
            self.policies.clone(),
            self.tools.clone(),
            config,
        );
        kernel.execute(&request.session, plan, run).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_util::sync::CancellationToken;
    use weave_plan::RegexRequirementAnalyzer;
    use weave_policy::MemoryPolicyStore;
    use weave_providers::{ChunkStream, ProviderError};
    use weave_store::MemoryFileStore;
    use weave_types::{ProjectTemplate, SessionMode, ToolSchema};

    struct FlakyClient {
        calls: AtomicU32,
        failures_before_success: u32,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn stream(
            &self,
            _provider_hint: Option<&str>,
            _model_hint: Option<&str>,
            _messages: Vec<ChatMessage>,
            _tools: Option<Vec<ToolSchema>>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<ChunkStream> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                return Err(anyhow::Error::new(
                    ProviderError::new("fetch failed").with_code("ECONNRESET"),
                ));
            }
            Ok(Box::pin(futures::stream::iter(vec![
                Ok(StreamChunk::TextDelta("Requirements: ok".to_string())),
                Ok(StreamChunk::Done {
                    finish_reason: "stop".to_string(),
                    usage: None,
                }),
            ])))
        }
    }

    struct FatalClient;

    #[async_trait]
    impl LlmClient for FatalClient {
        async fn stream(
            &self,
            _provider_hint: Option<&str>,
            _model_hint: Option<&str>,
            _messages: Vec<ChatMessage>,
            _tools: Option<Vec<ToolSchema>>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<ChunkStream> {
            Err(anyhow::Error::new(
                ProviderError::new("model rejected the request").with_status(422),
            ))
        }
    }

    fn orchestrator(client: Arc<dyn LlmClient>, bus: EventBus) -> ThreeLayerOrchestrator {
        let files = Arc::new(MemoryFileStore::new());
        let policies = Arc::new(MemoryPolicyStore::new());
        let tools = ToolRegistry::new(files.clone(), policies.clone());
        ThreeLayerOrchestrator::new(
            client,
            files,
            policies,
            tools,
            PlanGenerator::new(Arc::new(RegexRequirementAnalyzer::new())),
            None,
            RetrySpec {
                max_attempts: 3,
                base_delay_ms: 1,
            },
            bus,
            KernelConfig::default(),
        )
    }

    fn request() -> PipelineRequest {
        PipelineRequest {
            session: Session::new("ses_1", SessionMode::Implementer, ProjectTemplate::ReactVite),
            user_message: "请修复登录页问题".to_string(),
            agent_id: "agent-frontend".to_string(),
            platform: Platform::Web,
            project_type: "react-vite".to_string(),
            tech_stack: Vec::new(),
            ui_library: None,
            budget: None,
        }
    }

    #[tokio::test]
    async fn pipeline_ends_with_exactly_one_terminal_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let orchestrator = orchestrator(
            Arc::new(FlakyClient {
                calls: AtomicU32::new(0),
                failures_before_success: 0,
            }),
            bus.clone(),
        );
        let outcome = orchestrator.run(request()).await.expect("outcome");
        assert!(!outcome.run_id.is_empty());

        let mut terminals = 0;
        while let Ok(event) = rx.try_recv() {
            if event.is_terminal() {
                terminals += 1;
                assert_eq!(event.event_type, kind::RUN_COMPLETED);
            }
        }
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn transient_analysis_failures_retry_to_success() {
        let client = Arc::new(FlakyClient {
            calls: AtomicU32::new(0),
            failures_before_success: 2,
        });
        let orchestrator = orchestrator(client.clone(), EventBus::new());
        orchestrator.run(request()).await.expect("outcome");
        // two transient failures, one success, then the kernel's own calls
        assert!(client.calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn fatal_stage_failure_emits_layer_error() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let orchestrator = orchestrator(Arc::new(FatalClient), bus.clone());
        let err = orchestrator.run(request()).await.expect_err("fatal");
        assert!(err.to_string().contains("model rejected"));

        let mut saw_layer_error = false;
        while let Ok(event) = rx.try_recv() {
            if event.event_type == kind::RUN_ERROR {
                let error = event.property_str("error").unwrap_or("");
                assert!(error.starts_with("analysis layer failed:"));
                saw_layer_error = true;
            }
        }
        assert!(saw_layer_error);
    }

    #[tokio::test]
    async fn cancellation_emits_no_terminal_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let orchestrator = orchestrator(
            Arc::new(FlakyClient {
                calls: AtomicU32::new(0),
                failures_before_success: 0,
            }),
            bus.clone(),
        );
        let run = Run::new("ses_1", bus.clone());
        run.cancel.cancel();
        let err = orchestrator
            .run_with(request(), run)
            .await
            .expect_err("aborted");
        assert!(is_aborted(&err));

        while let Ok(event) = rx.try_recv() {
            assert!(!event.is_terminal());
        }
    }

    #[tokio::test]
    async fn budget_advertisement_precedes_the_stages() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let orchestrator = orchestrator(
            Arc::new(FlakyClient {
                calls: AtomicU32::new(0),
                failures_before_success: 0,
            }),
            bus.clone(),
        );
        let mut req = request();
        req.budget = Some(RunBudget {
            max_steps: Some(10),
            max_duration_ms: Some(60_000),
            ..RunBudget::default()
        });
        orchestrator.run(req).await.expect("outcome");

        let first = rx.recv().await.expect("first event");
        assert_eq!(first.event_type, kind::AUTONOMY_BUDGET);
        assert_eq!(first.properties["used"], 0);
    }
}
