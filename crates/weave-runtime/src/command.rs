use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_ALLOWED_EXECUTABLES: [&str; 9] = [
    "npm", "npx", "pnpm", "yarn", "node", "tsx", "python", "python3", "git",
];

const SHELL_OPERATOR_CHARS: [char; 7] = [';', '&', '|', '<', '>', '`', '\r'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRejected {
    pub reason: String,
}

impl CommandRejected {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for CommandRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "COMMAND_REJECTED: {}", self.reason)
    }
}

impl std::error::Error for CommandRejected {}

#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    pub cwd: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_buffer: Option<usize>,
    pub env: HashMap<String, String>,
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

/// Spawns without shell interpolation; argv stays a separate list.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run_command(
        &self,
        executable: &str,
        args: &[String],
        options: CommandOptions,
    ) -> anyhow::Result<CommandOutcome>;
}

#[derive(Clone)]
pub struct ProcessRunner {
    workspace_root: PathBuf,
    allowed: Vec<String>,
}

impl ProcessRunner {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            allowed: DEFAULT_ALLOWED_EXECUTABLES
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    pub fn with_allow_list(mut self, allowed: Vec<String>) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn validate(
        &self,
        executable: &str,
        args: &[String],
        cwd: Option<&str>,
    ) -> Result<PathBuf, CommandRejected> {
        let exe_name = executable_basename(executable);
        if !self.allowed.iter().any(|a| a == &exe_name) {
            return Err(CommandRejected::new(format!(
                "executable `{exe_name}` is not on the allow-list"
            )));
        }

        for token in std::iter::once(executable).chain(args.iter().map(String::as_str)) {
            if token.contains('\n')
                || token.chars().any(|c| SHELL_OPERATOR_CHARS.contains(&c))
            {
                return Err(CommandRejected::new(format!(
                    "token `{}` contains a shell operator",
                    token.replace('\n', "\\n")
                )));
            }
        }

        if let Some(flag) = inline_interpreter_flag(&exe_name, args) {
            return Err(CommandRejected::new(format!(
                "inline-interpreter flag `{flag}` is not allowed for `{exe_name}`"
            )));
        }

        let resolved = self.resolve_cwd(cwd)?;
        Ok(resolved)
    }

    fn resolve_cwd(&self, cwd: Option<&str>) -> Result<PathBuf, CommandRejected> {
        let Some(cwd) = cwd else {
            return Ok(self.workspace_root.clone());
        };
        let requested = Path::new(cwd);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.workspace_root.join(requested)
        };
        let normalized = normalize_lexically(&joined)
            .ok_or_else(|| CommandRejected::new("cwd escapes the workspace"))?;
        let root = normalize_lexically(&self.workspace_root).unwrap_or_default();
        if !normalized.starts_with(&root) {
            return Err(CommandRejected::new("cwd escapes the workspace"));
        }
        Ok(normalized)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run_command(
        &self,
        executable: &str,
        args: &[String],
        options: CommandOptions,
    ) -> anyhow::Result<CommandOutcome> {
        let cwd = self.validate(executable, args, options.cwd.as_deref())?;
        let timeout_ms = options.timeout_ms.unwrap_or(30_000);
        let max_buffer = options.max_buffer.unwrap_or(4 * 1024 * 1024);
        let cancel = options.cancel.unwrap_or_default();

        let mut command = Command::new(executable);
        command
            .args(args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &options.env {
            command.env(key, value);
        }

        let started = Instant::now();
        let mut child = command.spawn()?;
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let mut timed_out = false;
        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                anyhow::bail!("command cancelled");
            }
            waited = tokio::time::timeout(
                std::time::Duration::from_millis(timeout_ms),
                child.wait(),
            ) => match waited {
                Ok(status) => status?,
                Err(_) => {
                    timed_out = true;
                    let _ = child.kill().await;
                    child.wait().await?
                }
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(CommandOutcome {
            exit_code: status.code().unwrap_or(-1),
            stdout: truncate_buffer(stdout, max_buffer),
            stderr: truncate_buffer(stderr, max_buffer),
            duration_ms: started.elapsed().as_millis() as u64,
            timed_out,
        })
    }
}

fn executable_basename(executable: &str) -> String {
    let normalized = executable.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or(&normalized);
    base.trim_end_matches(".exe").to_ascii_lowercase()
}

fn inline_interpreter_flag(exe_name: &str, args: &[String]) -> Option<String> {
    let blocked: &[&str] = match exe_name {
        "node" | "tsx" => &["-e", "--eval", "-p", "--print"],
        "python" | "python3" => &["-c"],
        "pwsh" | "powershell" => &["-command", "-encodedcommand", "-c"],
        _ => return None,
    };
    args.iter()
        .find(|arg| {
            let lowered = arg.to_ascii_lowercase();
            blocked.iter().any(|flag| lowered == *flag)
        })
        .cloned()
}

fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    let mut prefix = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix.push(p.as_os_str()),
            Component::RootDir => prefix.push(std::path::MAIN_SEPARATOR.to_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(part) => parts.push(part.to_os_string()),
        }
    }
    let mut out = prefix;
    for part in parts {
        out.push(part);
    }
    Some(out)
}

fn truncate_buffer(buf: Vec<u8>, max: usize) -> String {
    let text = String::from_utf8_lossy(&buf);
    if text.len() <= max {
        text.to_string()
    } else {
        format!("{}\n[truncated]", &text[..max])
    }
}
