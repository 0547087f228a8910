use regex::Regex;

use weave_types::{ErrorCategory, ParsedError};

use crate::normalize_package_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    Install,
    Syntax,
    Lint,
    TypeCheck,
    Build,
    Runtime,
}

impl ValidationStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStage::Install => "install",
            ValidationStage::Syntax => "syntax",
            ValidationStage::Lint => "lint",
            ValidationStage::TypeCheck => "type-check",
            ValidationStage::Build => "build",
            ValidationStage::Runtime => "runtime",
        }
    }
}

/// tsc --noEmit output: `src/App.tsx(10,5): error TS2304: Cannot find name 'x'.`
pub fn parse_tsc_output(output: &str) -> Vec<ParsedError> {
    let line_re = Regex::new(r"^(.+?)\((\d+),(\d+)\): error (TS\d+): (.+)$").expect("tsc regex");
    let module_re =
        Regex::new(r"Cannot find module '([^']+)'").expect("module regex");

    let mut errors = Vec::new();
    for line in output.lines() {
        let Some(caps) = line_re.captures(line.trim()) else {
            continue;
        };
        let file = caps[1].to_string();
        let line_no: u32 = caps[2].parse().unwrap_or(0);
        let column: u32 = caps[3].parse().unwrap_or(0);
        let code = caps[4].to_string();
        let message = caps[5].to_string();

        let mut error = classify_tsc_error(&code, &message);
        error.raw = line.trim().to_string();
        error = error.at(file, line_no, column);
        error.code = Some(code);
        if error.category == ErrorCategory::MissingDependency {
            if let Some(caps) = module_re.captures(&message) {
                error.missing_package = normalize_package_name(&caps[1]);
            }
        }
        errors.push(error);
    }
    errors
}

fn classify_tsc_error(code: &str, message: &str) -> ParsedError {
    if code == "TS2307" || message.contains("Cannot find module") {
        let is_relative = Regex::new(r"Cannot find module '(\.|/)")
            .expect("relative module regex")
            .is_match(message);
        let category = if is_relative {
            ErrorCategory::ImportError
        } else {
            ErrorCategory::MissingDependency
        };
        return ParsedError::new(category, message);
    }
    if message.contains("has no exported member") || message.contains("is not a module") {
        return ParsedError::new(ErrorCategory::ImportError, message);
    }
    let numeric: u32 = code.trim_start_matches("TS").parse().unwrap_or(0);
    if (1000..2000).contains(&numeric) {
        return ParsedError::new(ErrorCategory::SyntaxError, message);
    }
    if numeric == 5083 || numeric == 18003 || message.contains("tsconfig") {
        return ParsedError::new(ErrorCategory::ConfigError, message);
    }
    ParsedError::new(ErrorCategory::TypeError, message)
}

/// ESLint stylish output. Only parsing errors feed the repair loop; style
/// findings are not repairable code errors.
pub fn parse_lint_output(output: &str) -> Vec<ParsedError> {
    let location_re =
        Regex::new(r"^\s*(\d+):(\d+)\s+error\s+(.+)$").expect("eslint line regex");
    let mut errors = Vec::new();
    let mut current_file = String::new();

    for line in output.lines() {
        let trimmed = line.trim_end();
        if !trimmed.starts_with(' ') && !trimmed.is_empty() && !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            current_file = trimmed.trim().to_string();
            continue;
        }
        let Some(caps) = location_re.captures(trimmed) else {
            continue;
        };
        let message = caps[3].trim().to_string();
        if !message.starts_with("Parsing error") {
            continue;
        }
        let mut error = ParsedError::new(ErrorCategory::SyntaxError, message);
        error.raw = trimmed.trim().to_string();
        error = error.at(
            current_file.clone(),
            caps[1].parse().unwrap_or(0),
            caps[2].parse().unwrap_or(0),
        );
        errors.push(error);
    }
    errors
}

/// Bundler/install output with no stable line grammar; classified per line.
pub fn parse_build_output(output: &str) -> Vec<ParsedError> {
    let module_not_found =
        Regex::new(r#"(?:Cannot resolve|Module not found|Could not resolve|Failed to resolve import)[^'"]*['"]([^'"]+)['"]"#)
            .expect("module not found regex");
    let mut errors = Vec::new();

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(caps) = module_not_found.captures(trimmed) {
            let specifier = caps[1].to_string();
            let package = normalize_package_name(&specifier);
            let category = if package.is_some() {
                ErrorCategory::MissingDependency
            } else {
                ErrorCategory::ImportError
            };
            let mut error = ParsedError::new(category, trimmed);
            error.missing_package = package;
            errors.push(error);
            continue;
        }
        if trimmed.contains("SyntaxError")
            || trimmed.contains("Unexpected token")
            || trimmed.contains("Unterminated")
        {
            errors.push(ParsedError::new(ErrorCategory::SyntaxError, trimmed));
            continue;
        }
        if trimmed.contains("tsconfig")
            || trimmed.contains("vite.config")
            || trimmed.contains("Invalid configuration")
            || trimmed.contains("ERR_PNPM")
            || trimmed.contains("ENOENT: no such file or directory, open")
        {
            errors.push(ParsedError::new(ErrorCategory::ConfigError, trimmed));
            continue;
        }
        if trimmed.starts_with("error")
            || trimmed.starts_with("ERROR")
            || trimmed.contains("error during build")
            || trimmed.contains("Build failed")
        {
            errors.push(ParsedError::new(ErrorCategory::BuildError, trimmed));
        }
    }
    errors
}

pub fn parse_stage_output(stage: ValidationStage, output: &str) -> Vec<ParsedError> {
    match stage {
        ValidationStage::TypeCheck => parse_tsc_output(output),
        ValidationStage::Lint => parse_lint_output(output),
        ValidationStage::Install | ValidationStage::Build | ValidationStage::Runtime => {
            parse_build_output(output)
        }
        ValidationStage::Syntax => Vec::new(),
    }
}

pub fn repairable_only(errors: Vec<ParsedError>) -> Vec<ParsedError> {
    errors
        .into_iter()
        .filter(|e| e.category.is_repairable())
        .collect()
}
