use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::fs;
use tracing::info;

use weave_events::EventBus;
use weave_orchestrator::{KernelConfig, PipelineRequest, RetrySpec, ThreeLayerOrchestrator};
use weave_plan::{build_schedule, PlanGenerator, PlanInput, RegexRequirementAnalyzer};
use weave_policy::MemoryPolicyStore;
use weave_providers::{ProviderRegistry, ProviderSettings};
use weave_repair::{RepairConfig, SelfRepairLoop, ToolchainValidator};
use weave_runtime::{InstallCache, ProcessRunner};
use weave_store::{FileStore, MemoryFileStore};
use weave_tools::ToolRegistry;
use weave_types::{Platform, ProjectTemplate, Session, SessionMode};

#[derive(Parser, Debug)]
#[command(name = "weave-engine")]
#[command(about = "Headless Weave generation backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlatformArg {
    Web,
    Desktop,
    Mobile,
    Miniprogram,
}

impl From<PlatformArg> for Platform {
    fn from(value: PlatformArg) -> Self {
        match value {
            PlatformArg::Web => Platform::Web,
            PlatformArg::Desktop => Platform::Desktop,
            PlatformArg::Mobile => Platform::Mobile,
            PlatformArg::Miniprogram => Platform::Miniprogram,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline for a request and print the generated files.
    Run {
        prompt: String,
        #[arg(long, value_enum, default_value_t = PlatformArg::Web)]
        platform: PlatformArg,
        #[arg(long, default_value = "react-vite")]
        project_type: String,
        #[arg(long, default_value_t = false)]
        creator: bool,
        #[arg(long)]
        state_dir: Option<String>,
    },
    /// Generate and print the execution plan without running it.
    Plan {
        prompt: String,
        #[arg(long, value_enum, default_value_t = PlatformArg::Web)]
        platform: PlatformArg,
        #[arg(long, default_value = "react-vite")]
        project_type: String,
        #[arg(long, default_value_t = false)]
        creator: bool,
    },
    /// Print the wave schedule for a generated plan.
    Schedule {
        prompt: String,
        #[arg(long, value_enum, default_value_t = PlatformArg::Web)]
        platform: PlatformArg,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            prompt,
            platform,
            project_type,
            creator,
            state_dir,
        } => {
            let state_dir = resolve_state_dir(state_dir);
            let settings = load_provider_settings(&state_dir).await?;
            run_pipeline(prompt, platform.into(), project_type, creator, settings).await?;
        }
        Command::Plan {
            prompt,
            platform,
            project_type,
            creator,
        } => {
            let generator = PlanGenerator::new(Arc::new(RegexRequirementAnalyzer::new()));
            let plan = generator.generate(&PlanInput {
                user_message: prompt,
                agent_id: "agent-frontend".to_string(),
                mode: if creator {
                    SessionMode::Creator
                } else {
                    SessionMode::Implementer
                },
                platform: platform.into(),
                project_type,
                tech_stack: Vec::new(),
                ui_library: None,
            })?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Schedule { prompt, platform } => {
            let generator = PlanGenerator::new(Arc::new(RegexRequirementAnalyzer::new()));
            let plan = generator.generate(&PlanInput {
                user_message: prompt,
                agent_id: "agent-frontend".to_string(),
                mode: SessionMode::Implementer,
                platform: platform.into(),
                project_type: "react-vite".to_string(),
                tech_stack: Vec::new(),
                ui_library: None,
            })?;
            let schedule = build_schedule(&plan.tasks);
            println!("{}", serde_json::to_string_pretty(&schedule)?);
        }
    }

    Ok(())
}

async fn run_pipeline(
    prompt: String,
    platform: Platform,
    project_type: String,
    creator: bool,
    settings: ProviderSettings,
) -> anyhow::Result<()> {
    let files: Arc<MemoryFileStore> = Arc::new(MemoryFileStore::new());
    let policies = Arc::new(MemoryPolicyStore::new());
    let tools = ToolRegistry::new(files.clone(), policies.clone());
    let providers = Arc::new(ProviderRegistry::new(settings));
    let bus = EventBus::new();

    let template = match project_type.as_str() {
        "next-js" => ProjectTemplate::NextJs,
        "react-vite" => ProjectTemplate::ReactVite,
        "react-native" => ProjectTemplate::ReactNative,
        "uniapp" => ProjectTemplate::Uniapp,
        _ => ProjectTemplate::Unknown,
    };
    let mode = if creator {
        SessionMode::Creator
    } else {
        SessionMode::Implementer
    };
    let session_id = format!("ses_{}", uuid::Uuid::new_v4().simple());
    let mut session = Session::new(session_id.clone(), mode, template);
    session.title = Some(derive_session_title(&prompt));

    let validation_root = std::env::temp_dir();
    let runner = Arc::new(ProcessRunner::new(validation_root.clone()));
    let validator = Arc::new(ToolchainValidator::new(
        runner,
        InstallCache::new(),
        None,
        None,
        weave_repair::DEFAULT_STEP_TIMEOUT_MS,
    ));
    let repair = Arc::new(SelfRepairLoop::new(
        files.clone(),
        validator,
        Arc::new(NoopRepairModel),
        RepairConfig {
            validation_base: validation_root,
            ..RepairConfig::default()
        },
    ));

    let orchestrator = ThreeLayerOrchestrator::new(
        providers,
        files.clone(),
        policies,
        tools,
        PlanGenerator::new(Arc::new(RegexRequirementAnalyzer::new())),
        Some(repair),
        RetrySpec::default(),
        bus.clone(),
        KernelConfig::default(),
    );

    // stream run events to stdout until the terminal frame
    let mut rx = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            let terminal = event.is_terminal();
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
            if terminal {
                break;
            }
        }
    });

    let outcome = orchestrator
        .run(PipelineRequest {
            session: session.clone(),
            user_message: prompt,
            agent_id: "agent-frontend".to_string(),
            platform,
            project_type,
            tech_stack: Vec::new(),
            ui_library: None,
            budget: None,
        })
        .await?;
    let _ = printer.await;

    info!(
        "run {} finished: success={} reason={}",
        outcome.run_id, outcome.success, outcome.termination_reason
    );
    for file in files.get_all_files(&session_id).await {
        println!("--- {} ({} bytes)", file.path, file.size);
    }
    Ok(())
}

/// Engine-side repair fallback when no dedicated repair model is configured:
/// report, change nothing.
struct NoopRepairModel;

#[async_trait::async_trait]
impl weave_repair::RepairModel for NoopRepairModel {
    async fn repair(
        &self,
        _request: weave_repair::RepairRequest,
    ) -> anyhow::Result<Vec<weave_types::FileWrite>> {
        Ok(Vec::new())
    }
}

fn derive_session_title(prompt: &str) -> String {
    let title: String = prompt.trim().chars().take(48).collect();
    if title.is_empty() {
        "untitled session".to_string()
    } else {
        title
    }
}

fn resolve_state_dir(flag: Option<String>) -> PathBuf {
    if let Some(dir) = flag {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("WEAVE_STATE_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    PathBuf::from(".weave")
}

async fn load_provider_settings(state_dir: &PathBuf) -> anyhow::Result<ProviderSettings> {
    let config_path = state_dir.join("config.json");
    if !config_path.exists() {
        info!(
            "no provider config at {}; falling back to the local echo provider",
            config_path.display()
        );
        return Ok(ProviderSettings::default());
    }
    let raw = fs::read_to_string(&config_path)
        .await
        .with_context(|| format!("reading {}", config_path.display()))?;
    let settings: ProviderSettings =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", config_path.display()))?;
    Ok(settings)
}
