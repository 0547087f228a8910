use weave_types::{ErrorCategory, ParsedError, ProjectTemplate, StoredFile};

/// L0: a fast structural parse of every code file. Catches unbalanced
/// delimiters and unterminated strings before any toolchain spawns. One
/// error per file at most.
pub fn l0_syntax_check(files: &[StoredFile]) -> Vec<ParsedError> {
    files
        .iter()
        .filter(|f| is_checkable(&f.path))
        .filter_map(|file| first_syntax_error(file))
        .collect()
}

fn is_checkable(path: &str) -> bool {
    matches!(
        path.rsplit('.').next(),
        Some("ts") | Some("tsx") | Some("js") | Some("jsx") | Some("json")
    )
}

fn first_syntax_error(file: &StoredFile) -> Option<ParsedError> {
    if file.path.ends_with(".json") {
        return match serde_json::from_str::<serde_json::Value>(&file.content) {
            Ok(_) => None,
            Err(err) => Some(
                ParsedError::new(
                    ErrorCategory::SyntaxError,
                    format!("invalid JSON: {err}"),
                )
                .at(file.path.clone(), err.line() as u32, err.column() as u32),
            ),
        };
    }

    let mut stack: Vec<(char, u32)> = Vec::new();
    let mut line: u32 = 1;
    let mut chars = file.content.chars().peekable();
    let mut in_string: Option<char> = None;
    let mut string_line: u32 = 1;
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
            in_line_comment = false;
            // template literals span lines; quote strings do not
            if matches!(in_string, Some('"') | Some('\'')) {
                return Some(
                    ParsedError::new(
                        ErrorCategory::SyntaxError,
                        "unterminated string literal",
                    )
                    .at(file.path.clone(), string_line, 0),
                );
            }
            continue;
        }
        if in_line_comment {
            continue;
        }
        if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
            }
            continue;
        }
        if let Some(quote) = in_string {
            if c == '\\' {
                chars.next();
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '/' if chars.peek() == Some(&'/') => in_line_comment = true,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block_comment = true;
            }
            '"' | '\'' | '`' => {
                in_string = Some(c);
                string_line = line;
            }
            '{' | '(' | '[' => stack.push((c, line)),
            '}' | ')' | ']' => {
                let expected = match c {
                    '}' => '{',
                    ')' => '(',
                    _ => '[',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => {
                        return Some(
                            ParsedError::new(
                                ErrorCategory::SyntaxError,
                                format!("unbalanced `{c}`"),
                            )
                            .at(file.path.clone(), line, 0),
                        )
                    }
                }
            }
            _ => {}
        }
    }

    if let Some((open, open_line)) = stack.pop() {
        return Some(
            ParsedError::new(
                ErrorCategory::SyntaxError,
                format!("unclosed `{open}`"),
            )
            .at(file.path.clone(), open_line, 0),
        );
    }
    None
}

/// Phase-1 template quick checks: cheap structural validation before any
/// install or compile runs.
pub fn template_quick_checks(template: ProjectTemplate, files: &[StoredFile]) -> Vec<ParsedError> {
    let mut findings = Vec::new();
    let has = |path: &str| files.iter().any(|f| f.path == path);
    let has_prefix = |prefix: &str| files.iter().any(|f| f.path.starts_with(prefix));

    let package_json = files.iter().find(|f| f.path == "package.json");
    let Some(package_json) = package_json else {
        findings.push(ParsedError::new(
            ErrorCategory::ConfigError,
            "package.json is missing",
        ));
        return findings;
    };
    let manifest: Option<serde_json::Value> = serde_json::from_str(&package_json.content).ok();
    if manifest.is_none() {
        findings.push(
            ParsedError::new(ErrorCategory::ConfigError, "package.json is not valid JSON")
                .at("package.json".to_string(), 1, 1),
        );
        return findings;
    }
    let manifest = manifest.unwrap_or_default();
    let has_dep = |name: &str| {
        ["dependencies", "devDependencies"].iter().any(|table| {
            manifest
                .get(table)
                .and_then(|v| v.as_object())
                .map(|m| m.contains_key(name))
                .unwrap_or(false)
        })
    };

    match template {
        ProjectTemplate::NextJs => {
            if !has_dep("next") {
                findings.push(ParsedError::new(
                    ErrorCategory::ConfigError,
                    "next-js template without a `next` dependency",
                ));
            }
            if !has_prefix("app/") && !has_prefix("pages/") && !has_prefix("src/app/") {
                findings.push(ParsedError::new(
                    ErrorCategory::ConfigError,
                    "next-js template without an app/ or pages/ tree",
                ));
            }
        }
        ProjectTemplate::ReactVite => {
            if !has("index.html") {
                findings.push(ParsedError::new(
                    ErrorCategory::ConfigError,
                    "react-vite template without index.html",
                ));
            }
            if !has_prefix("src/") {
                findings.push(ParsedError::new(
                    ErrorCategory::ConfigError,
                    "react-vite template without a src/ entry",
                ));
            }
        }
        ProjectTemplate::ReactNative | ProjectTemplate::Uniapp => {
            if !has_dep("react") && !has_dep("vue") {
                findings.push(ParsedError::new(
                    ErrorCategory::ConfigError,
                    "mobile template without a framework dependency",
                ));
            }
        }
        ProjectTemplate::Unknown => {}
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stored(path: &str, content: &str) -> StoredFile {
        StoredFile {
            id: path.to_string(),
            session_id: "ses_1".to_string(),
            path: path.to_string(),
            content: content.to_string(),
            language: None,
            size: content.len() as u64,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn balanced_file_passes_l0() {
        let files = vec![stored(
            "src/App.tsx",
            "export default function App() {\n  return (<div className=\"x\">ok</div>);\n}\n",
        )];
        assert!(l0_syntax_check(&files).is_empty());
    }

    #[test]
    fn unclosed_brace_is_reported_once_per_file() {
        let files = vec![stored(
            "src/broken.ts",
            "function a() {\n  if (true) {\n}\n",
        )];
        let errors = l0_syntax_check(&files);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, ErrorCategory::SyntaxError);
        assert_eq!(errors[0].file.as_deref(), Some("src/broken.ts"));
    }

    #[test]
    fn unterminated_string_is_caught() {
        let files = vec![stored("src/s.ts", "const x = \"broken\nconst y = 1;\n")];
        let errors = l0_syntax_check(&files);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unterminated string"));
    }

    #[test]
    fn template_literals_may_span_lines() {
        let files = vec![stored("src/t.ts", "const x = `line1\nline2`;\n")];
        assert!(l0_syntax_check(&files).is_empty());
    }

    #[test]
    fn braces_inside_comments_and_strings_are_ignored() {
        let files = vec![stored(
            "src/c.ts",
            "// closing } in comment\nconst x = \"}\";\n/* { */\n",
        )];
        assert!(l0_syntax_check(&files).is_empty());
    }

    #[test]
    fn invalid_json_fails_l0() {
        let files = vec![stored("package.json", "{\"name\": }")];
        let errors = l0_syntax_check(&files);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file.as_deref(), Some("package.json"));
    }

    #[test]
    fn missing_package_json_is_a_config_error() {
        let findings = template_quick_checks(ProjectTemplate::ReactVite, &[]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, ErrorCategory::ConfigError);
    }

    #[test]
    fn react_vite_requires_entry_files() {
        let files = vec![stored("package.json", r#"{"dependencies":{"react":"^18"}}"#)];
        let findings = template_quick_checks(ProjectTemplate::ReactVite, &files);
        assert_eq!(findings.len(), 2);

        let complete = vec![
            stored("package.json", r#"{"dependencies":{"react":"^18"}}"#),
            stored("index.html", "<html></html>"),
            stored("src/main.tsx", "import './App';"),
        ];
        assert!(template_quick_checks(ProjectTemplate::ReactVite, &complete).is_empty());
    }

    #[test]
    fn next_template_checks_dependency_and_tree() {
        let files = vec![
            stored("package.json", r#"{"dependencies":{"next":"14.0.0"}}"#),
            stored("app/page.tsx", "export default function Page() { return null; }"),
        ];
        assert!(template_quick_checks(ProjectTemplate::NextJs, &files).is_empty());
    }
}
