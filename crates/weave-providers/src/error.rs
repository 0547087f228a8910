/// Typed provider failure. Streams surface these so transient classification
/// stays deterministic: the caller inspects `retryable`, `status`, and `code`
/// instead of string-matching ad hoc.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub message: String,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub retryable: bool,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
            retryable: false,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn from_http_status(status: u16, body: &str) -> Self {
        let retryable = matches!(status, 408 | 409 | 425 | 429 | 500 | 502 | 503 | 504);
        let mut err = Self::new(format!(
            "provider request failed with status {status}: {body}"
        ))
        .with_status(status);
        if retryable {
            err = err.retryable();
        }
        err
    }

    pub fn transport(source: &reqwest::Error) -> Self {
        let code = if source.is_timeout() {
            Some("ETIMEDOUT".to_string())
        } else if source.is_connect() {
            Some("ECONNREFUSED".to_string())
        } else {
            None
        };
        Self {
            message: format!("fetch failed: {source}"),
            status: source.status().map(|s| s.as_u16()),
            code,
            retryable: true,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses_mark_retryable() {
        for status in [408, 409, 425, 429, 500, 502, 503, 504] {
            assert!(ProviderError::from_http_status(status, "x").retryable);
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!ProviderError::from_http_status(status, "x").retryable);
        }
    }
}
