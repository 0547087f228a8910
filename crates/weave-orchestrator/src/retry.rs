use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use weave_providers::ProviderError;

pub const TRANSIENT_STATUSES: [u16; 9] = [0, 408, 409, 425, 429, 500, 502, 503, 504];
pub const TRANSIENT_CODES: [&str; 8] = [
    "ECONNRESET",
    "ETIMEDOUT",
    "ECONNREFUSED",
    "ENOTFOUND",
    "EAI_AGAIN",
    "UND_ERR_CONNECT_TIMEOUT",
    "UND_ERR_HEADERS_TIMEOUT",
    "UND_ERR_SOCKET",
];
pub const TRANSIENT_MESSAGE_FRAGMENTS: [&str; 7] = [
    "fetch failed",
    "network",
    "socket hang up",
    "timed out",
    "timeout",
    "connection reset",
    "temporarily unavailable",
];

/// Cooperative-cancellation error; never retried, never counted as a code or
/// policy error, and never the source of a terminal event.
#[derive(Debug, Clone, Default)]
pub struct Aborted;

impl std::fmt::Display for Aborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AbortError")
    }
}

impl std::error::Error for Aborted {}

pub fn is_aborted(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Aborted>().is_some()
}

/// Deterministic transient classification: an explicit retryable marker, an
/// HTTP-like status, a known transport code, or a known message fragment.
pub fn is_transient_error(err: &anyhow::Error) -> bool {
    if let Some(provider) = err.downcast_ref::<ProviderError>() {
        if provider.retryable {
            return true;
        }
        if let Some(status) = provider.status {
            if TRANSIENT_STATUSES.contains(&status) {
                return true;
            }
        }
        if let Some(code) = &provider.code {
            if TRANSIENT_CODES.contains(&code.as_str()) {
                return true;
            }
        }
    }

    let message = err.to_string();
    if TRANSIENT_CODES.iter().any(|code| message.contains(code)) {
        return true;
    }
    let lowered = message.to_lowercase();
    TRANSIENT_MESSAGE_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

#[derive(Debug, Clone)]
pub struct RetrySpec {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_500,
        }
    }
}

impl RetrySpec {
    pub fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Stage-level transient retry with exponential backoff. Backoff sleeps race
/// cancellation; a cancelled sleep raises `Aborted` without another attempt.
pub async fn with_retry<T, F, Fut>(
    mut op: F,
    spec: &RetrySpec,
    cancel: &CancellationToken,
) -> anyhow::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(anyhow::Error::new(Aborted));
        }
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if is_aborted(&err) {
                    return Err(err);
                }
                if attempt >= spec.max_attempts || !is_transient_error(&err) {
                    return Err(err);
                }
                let delay = spec.backoff_delay_ms(attempt);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(anyhow::Error::new(Aborted)),
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = calls.clone();
        let result = with_retry(
            move |_attempt| {
                let calls = calls_ref.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    match n {
                        1 => Err(anyhow::anyhow!("fetch failed")),
                        2 => Err(anyhow::anyhow!("read ECONNRESET on socket")),
                        _ => Ok("done"),
                    }
                }
            },
            &RetrySpec::default(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.expect("value"), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_failures_do_not_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = calls.clone();
        let result: anyhow::Result<()> = with_retry(
            move |_attempt| {
                let calls = calls_ref.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("invalid tool schema"))
                }
            },
            &RetrySpec::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_the_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = calls.clone();
        let result: anyhow::Result<()> = with_retry(
            move |_attempt| {
                let calls = calls_ref.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("request timed out"))
                }
            },
            &RetrySpec::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_mid_backoff_raises_abort() {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });
        let result: anyhow::Result<()> = with_retry(
            |_attempt| async { Err(anyhow::anyhow!("fetch failed")) },
            &RetrySpec {
                max_attempts: 3,
                base_delay_ms: 60_000,
            },
            &cancel,
        )
        .await;
        let err = result.expect_err("aborted");
        assert!(is_aborted(&err));
        assert_eq!(err.to_string(), "AbortError");
    }

    #[test]
    fn provider_error_markers_classify_as_transient() {
        let retryable = anyhow::Error::new(ProviderError::new("nope").retryable());
        assert!(is_transient_error(&retryable));

        let status = anyhow::Error::new(ProviderError::new("bad gateway").with_status(502));
        assert!(is_transient_error(&status));

        let code = anyhow::Error::new(
            ProviderError::new("dns lookup").with_code("EAI_AGAIN"),
        );
        assert!(is_transient_error(&code));

        let fatal = anyhow::Error::new(ProviderError::new("schema rejected").with_status(422));
        assert!(!is_transient_error(&fatal));
    }

    #[test]
    fn backoff_is_exponential_from_the_base() {
        let spec = RetrySpec::default();
        assert_eq!(spec.backoff_delay_ms(1), 1_500);
        assert_eq!(spec.backoff_delay_ms(2), 3_000);
        assert_eq!(spec.backoff_delay_ms(3), 6_000);
    }
}
