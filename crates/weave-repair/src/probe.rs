use async_trait::async_trait;

use weave_types::{ErrorCategory, ParsedError};

pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 5_000;

/// A smoke step that outlived its hard deadline. The wrapper races every
/// probe step so a wedged browser context cannot stall the repair loop.
#[derive(Debug, Clone)]
pub struct HardTimeoutError {
    pub step: String,
    pub timeout_ms: u64,
}

impl std::fmt::Display for HardTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hard timeout: step `{}` exceeded {}ms",
            self.step, self.timeout_ms
        )
    }
}

impl std::error::Error for HardTimeoutError {}

#[derive(Debug, Clone)]
pub enum ProbeStepError {
    Failed { step: String, detail: String },
    HardTimeout(HardTimeoutError),
}

impl std::fmt::Display for ProbeStepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStepError::Failed { step, detail } => {
                write!(f, "runtime step `{step}` failed: {detail}")
            }
            ProbeStepError::HardTimeout(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ProbeStepError {}

pub async fn with_hard_timeout<T, F>(
    step: &str,
    timeout_ms: u64,
    future: F,
) -> Result<T, ProbeStepError>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ProbeStepError::Failed {
            step: step.to_string(),
            detail: err.to_string(),
        }),
        Err(_) => Err(ProbeStepError::HardTimeout(HardTimeoutError {
            step: step.to_string(),
            timeout_ms,
        })),
    }
}

/// The headless-browser context is an external collaborator; the loop only
/// needs these four steps.
#[async_trait]
pub trait RuntimeProbe: Send + Sync {
    async fn goto(&self, url: &str) -> anyhow::Result<()>;
    async fn wait_for_body(&self) -> anyhow::Result<()>;
    async fn ready_state(&self) -> anyhow::Result<String>;
    async fn screenshot(&self) -> anyhow::Result<Vec<u8>>;
}

/// L2 runtime smoke: goto, wait, readiness probe, screenshot, each under the
/// 5 s hard timeout. Failures come back as parse-ready errors.
pub async fn run_runtime_smoke(
    probe: &dyn RuntimeProbe,
    url: &str,
    step_timeout_ms: u64,
) -> Vec<ParsedError> {
    let mut errors = Vec::new();

    if let Err(err) = with_hard_timeout("goto", step_timeout_ms, probe.goto(url)).await {
        errors.push(runtime_error(&err));
        return errors;
    }
    if let Err(err) = with_hard_timeout("wait_for_body", step_timeout_ms, probe.wait_for_body()).await
    {
        errors.push(runtime_error(&err));
        return errors;
    }
    match with_hard_timeout("ready_state", step_timeout_ms, probe.ready_state()).await {
        Ok(state) => {
            if state != "complete" && state != "interactive" {
                errors.push(ParsedError::new(
                    ErrorCategory::BuildError,
                    format!("page never became ready (readyState={state})"),
                ));
            }
        }
        Err(err) => {
            errors.push(runtime_error(&err));
            return errors;
        }
    }
    if let Err(err) = with_hard_timeout("screenshot", step_timeout_ms, probe.screenshot()).await {
        errors.push(runtime_error(&err));
    }

    errors
}

fn runtime_error(err: &ProbeStepError) -> ParsedError {
    let mut error = ParsedError::new(ErrorCategory::BuildError, err.to_string());
    error.code = Some("L2_RUNTIME".to_string());
    error
}

/// Default probe: an HTTP readiness check against the served page. A real
/// browser-backed probe plugs in through the same trait.
pub struct HttpProbe {
    client: reqwest::Client,
    last_body: tokio::sync::Mutex<String>,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            last_body: tokio::sync::Mutex::new(String::new()),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeProbe for HttpProbe {
    async fn goto(&self, url: &str) -> anyhow::Result<()> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("page responded with status {status}");
        }
        *self.last_body.lock().await = response.text().await?;
        Ok(())
    }

    async fn wait_for_body(&self) -> anyhow::Result<()> {
        let body = self.last_body.lock().await;
        if body.contains("<body") || body.contains("<div id=\"root\"") {
            Ok(())
        } else {
            anyhow::bail!("response carries no document body")
        }
    }

    async fn ready_state(&self) -> anyhow::Result<String> {
        Ok("complete".to_string())
    }

    async fn screenshot(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.last_body.lock().await.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct HangingProbe {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RuntimeProbe for HangingProbe {
        async fn goto(&self, _url: &str) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(())
        }
        async fn wait_for_body(&self) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn ready_state(&self) -> anyhow::Result<String> {
            Ok("complete".to_string())
        }
        async fn screenshot(&self) -> anyhow::Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_step_hits_the_hard_timeout() {
        let probe = HangingProbe {
            calls: AtomicU32::new(0),
        };
        let errors = run_runtime_smoke(&probe, "http://127.0.0.1:5173", 100).await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("hard timeout"));
        assert_eq!(errors[0].code.as_deref(), Some("L2_RUNTIME"));
        // the loop stops at the first failed step
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    struct HealthyProbe;

    #[async_trait]
    impl RuntimeProbe for HealthyProbe {
        async fn goto(&self, _url: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn wait_for_body(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn ready_state(&self) -> anyhow::Result<String> {
            Ok("complete".to_string())
        }
        async fn screenshot(&self) -> anyhow::Result<Vec<u8>> {
            Ok(vec![1, 2, 3])
        }
    }

    #[tokio::test]
    async fn healthy_probe_produces_no_errors() {
        let errors = run_runtime_smoke(&HealthyProbe, "http://127.0.0.1:5173", 5_000).await;
        assert!(errors.is_empty());
    }
}
