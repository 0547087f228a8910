use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    MissingDependency,
    TypeError,
    ImportError,
    SyntaxError,
    ConfigError,
    BuildError,
    Unknown,
}

impl ErrorCategory {
    pub fn is_repairable(self) -> bool {
        !matches!(self, ErrorCategory::Unknown)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedError {
    pub category: ErrorCategory,
    pub message: String,
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_package: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_types: Vec<String>,
}

impl ParsedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            category,
            raw: message.clone(),
            message,
            file: None,
            line: None,
            column: None,
            code: None,
            missing_package: None,
            missing_types: Vec::new(),
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}
