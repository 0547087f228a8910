use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use weave_events::RunEmitter;
use weave_runtime::{CommandOptions, CommandRunner, InstallCache, ValidationWorkspace};
use weave_store::FileStore;
use weave_types::event::kind;
use weave_types::{
    ErrorCategory, FileWrite, ParsedError, ProjectTemplate, RepairSnapshot, RuntimeEvent, Session,
    StoredFile, StrategyProfile,
};

use crate::{
    build_repair_guidance, fingerprint_errors, l0_syntax_check, missing_dependencies,
    parse_stage_output, repairable_only, run_runtime_smoke, template_quick_checks,
    FingerprintTracker, RuntimeProbe, SearchCandidate, ValidationStage, DEFAULT_STEP_TIMEOUT_MS,
};

pub const UNSUPPORTED_PROJECT_TEMPLATE: &str = "UNSUPPORTED_PROJECT_TEMPLATE";

#[derive(Clone)]
pub struct RepairConfig {
    pub max_attempts: u32,
    pub validation_base: PathBuf,
    pub runtime_url: Option<String>,
    pub step_timeout_ms: u64,
    pub allowed_search_hosts: Vec<String>,
    pub search_candidates: Vec<SearchCandidate>,
    pub search_payload_budget: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            validation_base: std::env::temp_dir(),
            runtime_url: None,
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            allowed_search_hosts: Vec::new(),
            search_candidates: Vec::new(),
            search_payload_budget: 2_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepairRequest {
    pub session_id: String,
    pub attempt: u32,
    pub strategy: StrategyProfile,
    pub errors: Vec<ParsedError>,
    pub context_blocks: Vec<String>,
}

/// One LLM repair iteration: receives the error list plus strategy context
/// and answers with file rewrites.
#[async_trait]
pub trait RepairModel: Send + Sync {
    async fn repair(&self, request: RepairRequest) -> anyhow::Result<Vec<FileWrite>>;
}

/// The validation stack behind phases 1 and 2; the toolchain-backed
/// implementation lives in this crate, tests script their own.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        session: &Session,
        files: &[StoredFile],
        workspace: &ValidationWorkspace,
    ) -> anyhow::Result<Vec<ParsedError>>;
}

#[derive(Debug, Clone)]
pub struct RepairReport {
    pub attempts: u32,
    pub resolved: bool,
    pub remaining: Vec<ParsedError>,
    pub rollbacks: u32,
    pub final_strategy: StrategyProfile,
    pub cancelled: bool,
}

pub struct SelfRepairLoop {
    files: Arc<dyn FileStore>,
    validator: Arc<dyn Validator>,
    model: Arc<dyn RepairModel>,
    config: RepairConfig,
}

impl SelfRepairLoop {
    pub fn new(
        files: Arc<dyn FileStore>,
        validator: Arc<dyn Validator>,
        model: Arc<dyn RepairModel>,
        config: RepairConfig,
    ) -> Self {
        Self {
            files,
            validator,
            model,
            config,
        }
    }

    pub async fn run(
        &self,
        session: &Session,
        emitter: Option<&RunEmitter>,
        cancel: CancellationToken,
    ) -> anyhow::Result<RepairReport> {
        if !session.template.supports_validation() {
            anyhow::bail!(
                "{UNSUPPORTED_PROJECT_TEMPLATE}: template is not validatable"
            );
        }

        let mut tracker = FingerprintTracker::new();
        let mut last_snapshot: Option<RepairSnapshot> = None;
        let mut last_errors: Vec<ParsedError> = Vec::new();
        let mut rollbacks = 0u32;
        let mut strategy = StrategyProfile::Default;
        let mut attempts = 0u32;

        while attempts < self.config.max_attempts {
            if cancel.is_cancelled() {
                return Ok(RepairReport {
                    attempts,
                    resolved: false,
                    remaining: last_errors,
                    rollbacks,
                    final_strategy: strategy,
                    cancelled: true,
                });
            }
            attempts += 1;

            let files = self.files.get_all_files(&session.id).await;
            let workspace =
                ValidationWorkspace::materialize(&self.config.validation_base, &session.id, &files)
                    .await?;

            // phase 0: dependency scan short-circuits the heavier stack
            let missing = missing_dependencies(&files);
            let errors = if missing.is_empty() {
                let raw = self.validator.validate(session, &files, &workspace).await;
                let raw = match raw {
                    Ok(raw) => raw,
                    Err(err) => {
                        workspace.cleanup().await?;
                        return Err(err);
                    }
                };
                repairable_only(raw)
            } else {
                missing
                    .iter()
                    .map(|m| {
                        let mut error = ParsedError::new(
                            ErrorCategory::MissingDependency,
                            format!("package `{}` is imported but not installed", m.package),
                        );
                        error.missing_package = Some(m.package.clone());
                        error
                    })
                    .collect()
            };
            workspace.cleanup().await?;

            if errors.is_empty() {
                self.emit_progress(emitter, attempts, 0, strategy, "resolved");
                return Ok(RepairReport {
                    attempts,
                    resolved: true,
                    remaining: Vec::new(),
                    rollbacks,
                    final_strategy: strategy,
                    cancelled: false,
                });
            }

            // a worsening iteration rolls back before anything else happens
            if let Some(snapshot) = &last_snapshot {
                if errors.len() > snapshot.error_count {
                    self.rollback(&session.id, snapshot).await;
                    rollbacks += 1;
                    last_errors = errors;
                    self.emit_progress(emitter, attempts, last_errors.len(), strategy, "rolled-back");
                    continue;
                }
            }

            let fingerprint = fingerprint_errors(&errors);
            let repeats = tracker.observe(&fingerprint);
            strategy = StrategyProfile::for_repeat_count(repeats);

            let snapshot = RepairSnapshot {
                files: files.clone(),
                fingerprint: fingerprint.clone(),
                error_count: errors.len(),
                taken_at: Utc::now(),
            };

            let context_blocks = self.context_blocks(&files, &errors, strategy, repeats);
            self.emit_progress(emitter, attempts, errors.len(), strategy, "repairing");

            let writes = self
                .model
                .repair(RepairRequest {
                    session_id: session.id.clone(),
                    attempt: attempts,
                    strategy,
                    errors: errors.clone(),
                    context_blocks,
                })
                .await?;

            if !writes.is_empty() {
                let changed: Vec<String> = writes.iter().map(|w| w.path.clone()).collect();
                self.files.save_files(&session.id, writes).await;
                if let Some(emitter) = emitter {
                    for path in changed {
                        emitter.emit(RuntimeEvent::new(
                            kind::ARTIFACT_FILE_CHANGED,
                            json!({"path": path, "source": "self-repair"}),
                        ));
                    }
                }
            }

            last_snapshot = Some(snapshot);
            last_errors = errors;
        }

        Ok(RepairReport {
            attempts,
            resolved: false,
            remaining: last_errors,
            rollbacks,
            final_strategy: strategy,
            cancelled: false,
        })
    }

    async fn rollback(&self, session_id: &str, snapshot: &RepairSnapshot) {
        self.files.delete_files(session_id).await;
        let writes: Vec<FileWrite> = snapshot
            .files
            .iter()
            .map(|f| FileWrite {
                path: f.path.clone(),
                content: f.content.clone(),
                language: f.language.clone(),
            })
            .collect();
        self.files.save_files(session_id, writes).await;
    }

    fn context_blocks(
        &self,
        files: &[StoredFile],
        errors: &[ParsedError],
        strategy: StrategyProfile,
        repeats: u32,
    ) -> Vec<String> {
        let mut blocks = vec!["[ImmutableContext]".to_string()];

        if repeats >= 3 {
            let guidance = build_repair_guidance(
                errors,
                &self.config.search_candidates,
                &self.config.allowed_search_hosts,
                None,
                self.config.search_payload_budget,
            );
            if let Ok(rendered) = serde_json::to_string_pretty(&guidance) {
                blocks.push(format!("[SearchRepairGuidance]\n{rendered}"));
            }
        }

        match strategy {
            StrategyProfile::ImportsFirst => {
                if let Some(manifest) = files.iter().find(|f| f.path == "package.json") {
                    blocks.push(format!("[PackageManifest]\n{}", manifest.content));
                }
                let type_hints: Vec<&str> = files
                    .iter()
                    .filter(|f| f.path.ends_with(".d.ts"))
                    .map(|f| f.path.as_str())
                    .collect();
                if !type_hints.is_empty() {
                    blocks.push(format!("[InstalledTypeHints]\n{}", type_hints.join("\n")));
                }
            }
            StrategyProfile::TypesFirst => {
                let mut bundle = String::new();
                for file in files.iter().filter(|f| {
                    f.path.starts_with("types/")
                        || f.path.starts_with("store/")
                        || f.path.starts_with("components/ui/")
                }) {
                    bundle.push_str(&format!("// {}\n{}\n", file.path, file.content));
                }
                if !bundle.is_empty() {
                    blocks.push(format!("[FrozenContracts]\n{bundle}"));
                }
            }
            StrategyProfile::BuildFirst => {
                let tail: Vec<&str> = errors
                    .iter()
                    .filter(|e| e.category == ErrorCategory::BuildError)
                    .map(|e| e.raw.as_str())
                    .rev()
                    .take(20)
                    .collect();
                if !tail.is_empty() {
                    blocks.push(format!("[BuildErrorTail]\n{}", tail.join("\n")));
                }
            }
            StrategyProfile::Default => {}
        }

        blocks
    }

    fn emit_progress(
        &self,
        emitter: Option<&RunEmitter>,
        attempt: u32,
        error_count: usize,
        strategy: StrategyProfile,
        status: &str,
    ) {
        if let Some(emitter) = emitter {
            emitter.emit(RuntimeEvent::new(
                kind::AGENT_TASK_PROGRESS,
                json!({
                    "taskId": "self-repair",
                    "attempt": attempt,
                    "errorCount": error_count,
                    "strategy": strategy,
                    "status": status,
                }),
            ));
        }
    }
}

/// Phase 1 + 2 against the real toolchain: template quick checks, install
/// (signature-gated), L0 syntax, lint + `tsc --noEmit`, build, runtime smoke.
pub struct ToolchainValidator {
    runner: Arc<dyn CommandRunner>,
    install_cache: InstallCache,
    probe: Option<Arc<dyn RuntimeProbe>>,
    runtime_url: Option<String>,
    step_timeout_ms: u64,
}

impl ToolchainValidator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        install_cache: InstallCache,
        probe: Option<Arc<dyn RuntimeProbe>>,
        runtime_url: Option<String>,
        step_timeout_ms: u64,
    ) -> Self {
        Self {
            runner,
            install_cache,
            probe,
            runtime_url,
            step_timeout_ms,
        }
    }

    async fn run_stage(
        &self,
        stage: ValidationStage,
        executable: &str,
        args: &[&str],
        cwd: &str,
        timeout_ms: u64,
    ) -> anyhow::Result<Vec<ParsedError>> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let outcome = self
            .runner
            .run_command(
                executable,
                &args,
                CommandOptions {
                    cwd: Some(cwd.to_string()),
                    timeout_ms: Some(timeout_ms),
                    ..CommandOptions::default()
                },
            )
            .await?;
        if outcome.exit_code == 0 && !outcome.timed_out {
            return Ok(Vec::new());
        }
        let combined = format!("{}\n{}", outcome.stdout, outcome.stderr);
        let mut errors = parse_stage_output(stage, &combined);
        if errors.is_empty() {
            errors.push(ParsedError::new(
                ErrorCategory::BuildError,
                format!(
                    "{} stage exited with code {}{}",
                    stage.as_str(),
                    outcome.exit_code,
                    if outcome.timed_out { " (timed out)" } else { "" }
                ),
            ));
        }
        Ok(errors)
    }
}

#[async_trait]
impl Validator for ToolchainValidator {
    async fn validate(
        &self,
        session: &Session,
        files: &[StoredFile],
        workspace: &ValidationWorkspace,
    ) -> anyhow::Result<Vec<ParsedError>> {
        // phase 1
        let findings = template_quick_checks(session.template, files);
        if !findings.is_empty() {
            return Ok(findings);
        }

        let cwd = workspace.root().to_string_lossy().to_string();
        let manifest = files.iter().find(|f| f.path == "package.json");

        if let Some(manifest) = manifest {
            if self.install_cache.needs_install(&session.id, &manifest.content) {
                let errors = self
                    .run_stage(
                        ValidationStage::Install,
                        "npm",
                        &["install", "--no-audit", "--no-fund"],
                        &cwd,
                        180_000,
                    )
                    .await?;
                if !errors.is_empty() {
                    return Ok(errors);
                }
                self.install_cache.mark_installed(&session.id, &manifest.content);
            }
        }

        // L0 gates everything downstream
        let l0 = l0_syntax_check(files);
        if !l0.is_empty() {
            return Ok(l0);
        }

        let mut l1 = Vec::new();
        let has_dep = |name: &str| {
            manifest
                .and_then(|m| serde_json::from_str::<serde_json::Value>(&m.content).ok())
                .map(|v| {
                    ["dependencies", "devDependencies"].iter().any(|table| {
                        v.get(table)
                            .and_then(|t| t.as_object())
                            .map(|t| t.contains_key(name))
                            .unwrap_or(false)
                    })
                })
                .unwrap_or(false)
        };
        if has_dep("eslint") {
            l1.extend(
                self.run_stage(
                    ValidationStage::Lint,
                    "npx",
                    &["eslint", ".", "--format", "stylish"],
                    &cwd,
                    90_000,
                )
                .await?,
            );
        }
        if files.iter().any(|f| f.path == "tsconfig.json") {
            l1.extend(
                self.run_stage(
                    ValidationStage::TypeCheck,
                    "npx",
                    &["tsc", "--noEmit"],
                    &cwd,
                    120_000,
                )
                .await?,
            );
        }
        if !l1.is_empty() {
            return Ok(l1);
        }

        let has_build_script = manifest
            .and_then(|m| serde_json::from_str::<serde_json::Value>(&m.content).ok())
            .and_then(|v| v.get("scripts")?.get("build").cloned())
            .is_some();
        if has_build_script {
            let build = self
                .run_stage(
                    ValidationStage::Build,
                    "npm",
                    &["run", "build"],
                    &cwd,
                    240_000,
                )
                .await?;
            if !build.is_empty() {
                return Ok(build);
            }
        }

        if let (Some(probe), Some(url)) = (&self.probe, &self.runtime_url) {
            return Ok(run_runtime_smoke(probe.as_ref(), url, self.step_timeout_ms).await);
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use weave_store::MemoryFileStore;
    use weave_types::SessionMode;

    fn session() -> Session {
        Session::new("ses_1", SessionMode::Creator, ProjectTemplate::ReactVite)
    }

    /// Scripted validator: pops one error list per validation pass.
    struct ScriptedValidator {
        passes: Mutex<Vec<Vec<ParsedError>>>,
    }

    impl ScriptedValidator {
        fn new(passes: Vec<Vec<ParsedError>>) -> Self {
            Self {
                passes: Mutex::new(passes),
            }
        }
    }

    #[async_trait]
    impl Validator for ScriptedValidator {
        async fn validate(
            &self,
            _session: &Session,
            _files: &[StoredFile],
            _workspace: &ValidationWorkspace,
        ) -> anyhow::Result<Vec<ParsedError>> {
            let mut passes = self.passes.lock().expect("lock");
            if passes.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(passes.remove(0))
            }
        }
    }

    struct ScriptedModel {
        calls: AtomicU32,
        writes: Vec<FileWrite>,
    }

    #[async_trait]
    impl RepairModel for ScriptedModel {
        async fn repair(&self, _request: RepairRequest) -> anyhow::Result<Vec<FileWrite>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.writes.clone())
        }
    }

    fn errors(n: usize) -> Vec<ParsedError> {
        (0..n)
            .map(|i| ParsedError::new(ErrorCategory::TypeError, format!("error {i}")))
            .collect()
    }

    fn config() -> RepairConfig {
        RepairConfig {
            validation_base: std::env::temp_dir(),
            ..RepairConfig::default()
        }
    }

    async fn seed(files: &MemoryFileStore) {
        files
            .save_files(
                "ses_1",
                vec![
                    FileWrite::new("package.json", r#"{"dependencies":{"react":"^18"}}"#),
                    FileWrite::new("src/App.tsx", "export default function App() { return null; }"),
                ],
            )
            .await;
    }

    #[tokio::test]
    async fn clean_validation_resolves_immediately() {
        let files = Arc::new(MemoryFileStore::new());
        seed(&files).await;
        let model = Arc::new(ScriptedModel {
            calls: AtomicU32::new(0),
            writes: Vec::new(),
        });
        let repair = SelfRepairLoop::new(
            files,
            Arc::new(ScriptedValidator::new(vec![Vec::new()])),
            model.clone(),
            config(),
        );
        let report = repair
            .run(&session(), None, CancellationToken::new())
            .await
            .expect("report");
        assert!(report.resolved);
        assert_eq!(report.attempts, 1);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn worsening_iteration_rolls_back_to_the_snapshot() {
        let files = Arc::new(MemoryFileStore::new());
        seed(&files).await;

        // pass 1: 3 errors -> snapshot + repair rewrites App.tsx
        // pass 2: 5 errors -> rollback restores the snapshot
        let validator = ScriptedValidator::new(vec![errors(3), errors(5), errors(3)]);
        let model = Arc::new(ScriptedModel {
            calls: AtomicU32::new(0),
            writes: vec![FileWrite::new("src/App.tsx", "broken rewrite")],
        });
        let repair = SelfRepairLoop::new(
            files.clone(),
            Arc::new(validator),
            model,
            RepairConfig {
                max_attempts: 2,
                ..config()
            },
        );
        let report = repair
            .run(&session(), None, CancellationToken::new())
            .await
            .expect("report");
        assert_eq!(report.rollbacks, 1);
        let restored = files.get_file("ses_1", "src/App.tsx").await.expect("file");
        assert_eq!(
            restored.content,
            "export default function App() { return null; }"
        );
    }

    #[tokio::test]
    async fn repeated_fingerprints_escalate_the_strategy() {
        let files = Arc::new(MemoryFileStore::new());
        seed(&files).await;
        let same = || {
            vec![ParsedError::new(
                ErrorCategory::TypeError,
                "Type 'string' is not assignable",
            )]
        };
        let validator = ScriptedValidator::new(vec![same(), same(), same(), same(), same()]);
        let model = Arc::new(ScriptedModel {
            calls: AtomicU32::new(0),
            writes: Vec::new(),
        });
        let repair = SelfRepairLoop::new(
            files,
            Arc::new(validator),
            model,
            RepairConfig {
                max_attempts: 4,
                ..config()
            },
        );
        let report = repair
            .run(&session(), None, CancellationToken::new())
            .await
            .expect("report");
        assert!(!report.resolved);
        assert_eq!(report.final_strategy, StrategyProfile::BuildFirst);
    }

    #[tokio::test]
    async fn missing_dependencies_short_circuit_validation() {
        let files = Arc::new(MemoryFileStore::new());
        files
            .save_files(
                "ses_1",
                vec![
                    FileWrite::new("package.json", r#"{"dependencies":{"react":"^18"}}"#),
                    FileWrite::new("src/App.tsx", "import dayjs from 'dayjs';"),
                ],
            )
            .await;
        let model = Arc::new(ScriptedModel {
            calls: AtomicU32::new(0),
            writes: vec![FileWrite::new(
                "package.json",
                r#"{"dependencies":{"react":"^18","dayjs":"^1"}}"#,
            )],
        });
        // validator would fail the test if consulted on the first pass
        let repair = SelfRepairLoop::new(
            files,
            Arc::new(ScriptedValidator::new(vec![Vec::new()])),
            model.clone(),
            config(),
        );
        let report = repair
            .run(&session(), None, CancellationToken::new())
            .await
            .expect("report");
        assert!(report.resolved);
        assert_eq!(report.attempts, 2);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsupported_template_is_refused() {
        let files = Arc::new(MemoryFileStore::new());
        let repair = SelfRepairLoop::new(
            files,
            Arc::new(ScriptedValidator::new(Vec::new())),
            Arc::new(ScriptedModel {
                calls: AtomicU32::new(0),
                writes: Vec::new(),
            }),
            config(),
        );
        let mut unsupported = session();
        unsupported.template = ProjectTemplate::Unknown;
        let err = repair
            .run(&unsupported, None, CancellationToken::new())
            .await
            .expect_err("refused");
        assert!(err.to_string().contains(UNSUPPORTED_PROJECT_TEMPLATE));
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_between_attempts() {
        let files = Arc::new(MemoryFileStore::new());
        seed(&files).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let repair = SelfRepairLoop::new(
            files,
            Arc::new(ScriptedValidator::new(vec![errors(1)])),
            Arc::new(ScriptedModel {
                calls: AtomicU32::new(0),
                writes: Vec::new(),
            }),
            config(),
        );
        let report = repair.run(&session(), None, cancel).await.expect("report");
        assert!(report.cancelled);
        assert_eq!(report.attempts, 0);
    }
}
