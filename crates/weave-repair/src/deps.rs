use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use weave_types::StoredFile;

pub const NODE_BUILTIN_MODULES: [&str; 22] = [
    "assert",
    "buffer",
    "child_process",
    "crypto",
    "dns",
    "events",
    "fs",
    "http",
    "https",
    "net",
    "os",
    "path",
    "process",
    "querystring",
    "readline",
    "stream",
    "tls",
    "url",
    "util",
    "worker_threads",
    "zlib",
    "module",
];

pub const DEV_DEPENDENCY_HINTS: [&str; 15] = [
    "tailwindcss",
    "postcss",
    "autoprefixer",
    "typescript",
    "eslint",
    "prettier",
    "vitest",
    "jest",
    "vite",
    "webpack",
    "rollup",
    "esbuild",
    "tsup",
    "ts-node",
    "nodemon",
];

const CODE_EXTENSIONS: [&str; 4] = ["ts", "tsx", "js", "jsx"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDependency {
    pub package: String,
    pub dev: bool,
}

struct ImportPatterns {
    from_import: Regex,
    bare_import: Regex,
    require_call: Regex,
    dynamic_import: Regex,
}

impl ImportPatterns {
    fn new() -> Self {
        Self {
            from_import: Regex::new(r#"import\s+[^'"]*?from\s+['"]([^'"]+)['"]"#)
                .expect("from import regex"),
            bare_import: Regex::new(r#"import\s+['"]([^'"]+)['"]"#).expect("bare import regex"),
            require_call: Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#)
                .expect("require regex"),
            dynamic_import: Regex::new(r#"import\(\s*['"]([^'"]+)['"]\s*\)"#)
                .expect("dynamic import regex"),
        }
    }

    fn specifiers<'a>(&self, content: &'a str) -> Vec<&'a str> {
        let mut out = Vec::new();
        for regex in [
            &self.from_import,
            &self.bare_import,
            &self.require_call,
            &self.dynamic_import,
        ] {
            for capture in regex.captures_iter(content) {
                if let Some(m) = capture.get(1) {
                    out.push(m.as_str());
                }
            }
        }
        out
    }
}

fn is_code_file(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .map(|ext| CODE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Scoped packages keep `@scope/pkg`; unscoped specifiers reduce to their
/// first segment. Relative and alias imports yield nothing.
pub fn normalize_package_name(specifier: &str) -> Option<String> {
    let specifier = specifier.trim();
    if specifier.is_empty()
        || specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with("~/")
        || specifier.starts_with("@/")
    {
        return None;
    }
    let specifier = specifier.strip_prefix("node:").unwrap_or(specifier);
    if specifier.starts_with('@') {
        let mut segments = specifier.splitn(3, '/');
        let scope = segments.next()?;
        let name = segments.next()?;
        return Some(format!("{scope}/{name}"));
    }
    specifier.split('/').next().map(|s| s.to_string())
}

fn installed_packages(package_json: Option<&str>) -> HashSet<String> {
    let mut installed = HashSet::new();
    let Some(raw) = package_json else {
        return installed;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return installed;
    };
    for table in ["dependencies", "devDependencies"] {
        if let Some(map) = value.get(table).and_then(|v| v.as_object()) {
            installed.extend(map.keys().cloned());
        }
    }
    installed
}

pub fn is_dev_dependency(package: &str) -> bool {
    package.starts_with("@types/") || DEV_DEPENDENCY_HINTS.contains(&package)
}

/// Phase-0 dependency scan: every import specifier across the session's code
/// files, minus builtins, relative imports, and already-installed packages.
pub fn missing_dependencies(files: &[StoredFile]) -> Vec<MissingDependency> {
    let patterns = ImportPatterns::new();
    let package_json = files
        .iter()
        .find(|f| f.path == "package.json")
        .map(|f| f.content.as_str());
    let installed = installed_packages(package_json);
    let builtins: HashSet<&str> = NODE_BUILTIN_MODULES.iter().copied().collect();

    // BTreeMap keeps the report deterministic
    let mut missing: BTreeMap<String, bool> = BTreeMap::new();
    for file in files {
        if !is_code_file(&file.path) {
            continue;
        }
        for specifier in patterns.specifiers(&file.content) {
            let Some(package) = normalize_package_name(specifier) else {
                continue;
            };
            if builtins.contains(package.as_str()) || installed.contains(&package) {
                continue;
            }
            missing.entry(package.clone()).or_insert_with(|| is_dev_dependency(&package));
        }
    }

    missing
        .into_iter()
        .map(|(package, dev)| MissingDependency { package, dev })
        .collect()
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
    fn normalization_keeps_scopes_and_strips_subpaths() {
        assert_eq!(
            normalize_package_name("@radix-ui/react-slot/dist"),
            Some("@radix-ui/react-slot".to_string())
        );
        assert_eq!(
            normalize_package_name("lodash/debounce"),
            Some("lodash".to_string())
        );
        assert_eq!(normalize_package_name("./local"), None);
        assert_eq!(normalize_package_name("@/components/Button"), None);
        assert_eq!(normalize_package_name("node:path"), Some("path".to_string()));
    }

    #[test]
    fn scan_finds_all_import_forms() {
        let files = vec![
            stored(
                "src/App.tsx",
                "import React from 'react';\nimport 'antd/dist/reset.css';\nconst _ = require('lodash');\nconst mod = await import('dayjs');\nimport helper from './helper';\n",
            ),
            stored(
                "package.json",
                r#"{"dependencies":{"react":"^18"},"devDependencies":{}}"#,
            ),
        ];
        let missing = missing_dependencies(&files);
        let names: Vec<&str> = missing.iter().map(|m| m.package.as_str()).collect();
        assert_eq!(names, vec!["antd", "dayjs", "lodash"]);
    }

    #[test]
    fn builtins_and_installed_are_excluded() {
        let files = vec![
            stored(
                "scripts/build.js",
                "const fs = require('fs');\nconst path = require('path');\nimport vite from 'vite';\n",
            ),
            stored(
                "package.json",
                r#"{"devDependencies":{"vite":"^5"}}"#,
            ),
        ];
        assert!(missing_dependencies(&files).is_empty());
    }

    #[test]
    fn types_and_toolchain_packages_report_as_dev() {
        let files = vec![stored(
            "src/index.ts",
            "import type { X } from '@types/node';\nimport tailwind from 'tailwindcss';\nimport dayjs from 'dayjs';\n",
        )];
        let missing = missing_dependencies(&files);
        let dev: Vec<bool> = missing.iter().map(|m| m.dev).collect();
        let names: Vec<&str> = missing.iter().map(|m| m.package.as_str()).collect();
        assert_eq!(names, vec!["@types/node", "dayjs", "tailwindcss"]);
        assert_eq!(dev, vec![true, false, true]);
    }

    #[test]
    fn non_code_files_are_ignored() {
        let files = vec![stored("README.md", "import fake from 'not-a-real-import';")];
        assert!(missing_dependencies(&files).is_empty());
    }
}
