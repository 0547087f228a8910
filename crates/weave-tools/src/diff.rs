use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const AMBIGUOUS_MATCH: &str = "AMBIGUOUS_MATCH";
pub const NO_MATCH_NORMALIZED: &str = "NO_MATCH_NORMALIZED";
pub const INVALID_PATCH: &str = "INVALID_PATCH";

const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
const DIVIDER_MARKER: &str = "=======";
const REPLACE_MARKER: &str = ">>>>>>> REPLACE";

const FULL_FILE_MIN_RATIO: f64 = 0.35;
const FULL_FILE_MIN_LEN: usize = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchHint {
    pub line_start: usize,
    pub line_end: usize,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct ApplyDiffError {
    pub code: &'static str,
    pub detail: String,
    pub hints: Vec<MatchHint>,
}

impl ApplyDiffError {
    fn new(code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
            hints: Vec::new(),
        }
    }
}

impl std::fmt::Display for ApplyDiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

impl std::error::Error for ApplyDiffError {}

#[derive(Debug, Clone)]
pub struct DiffBlock {
    pub search: String,
    pub replace: String,
}

pub fn parse_patch(patch: &str) -> Result<Vec<DiffBlock>, ApplyDiffError> {
    let normalized = patch.replace("\r\n", "\n");
    let mut blocks = Vec::new();
    let mut rest = normalized.as_str();

    while let Some(start) = rest.find(SEARCH_MARKER) {
        let after_search = &rest[start + SEARCH_MARKER.len()..];
        let after_search = after_search.strip_prefix('\n').unwrap_or(after_search);

        let Some(divider) = find_marker_line(after_search, DIVIDER_MARKER) else {
            return Err(ApplyDiffError::new(
                INVALID_PATCH,
                "missing ======= divider in SEARCH/REPLACE block",
            ));
        };
        let search = &after_search[..divider.0];
        let after_divider = &after_search[divider.1..];

        let Some(end) = find_marker_line(after_divider, REPLACE_MARKER) else {
            return Err(ApplyDiffError::new(
                INVALID_PATCH,
                "missing >>>>>>> REPLACE terminator",
            ));
        };
        let replace = &after_divider[..end.0];

        blocks.push(DiffBlock {
            search: trim_trailing_newline(search).to_string(),
            replace: trim_trailing_newline(replace).to_string(),
        });
        rest = &after_divider[end.1..];
    }

    if blocks.is_empty() {
        return Err(ApplyDiffError::new(
            INVALID_PATCH,
            "patch carries no SEARCH/REPLACE blocks",
        ));
    }
    Ok(blocks)
}

// (offset of marker line start, offset just past the marker line)
fn find_marker_line(text: &str, marker: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_end_matches('\n') == marker {
            return Some((offset, offset + line.len()));
        }
        offset += line.len();
    }
    None
}

fn trim_trailing_newline(text: &str) -> &str {
    text.strip_suffix('\n').unwrap_or(text)
}

/// Applies a SEARCH/REPLACE patch: strict match, then whitespace-normalized
/// line match, then (for single-block patches) the full-file fallback.
pub fn apply_patch(
    content: &str,
    patch: &str,
    normalize_whitespace: bool,
) -> Result<String, ApplyDiffError> {
    let blocks = parse_patch(patch)?;
    let had_crlf = content.contains("\r\n");
    let mut working = content.replace("\r\n", "\n");
    let single_block = blocks.len() == 1;

    let mut first_error: Option<ApplyDiffError> = None;
    let mut applied = 0usize;

    for block in &blocks {
        match apply_block(&working, block, normalize_whitespace) {
            Ok(next) => {
                working = next;
                applied += 1;
            }
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    if let Some(err) = first_error {
        if applied == 0 && single_block {
            let replace = &blocks[0].replace;
            if qualifies_for_full_file_fallback(&working, replace) {
                let replaced = strip_code_fence(replace).to_string();
                return Ok(restore_eol(replaced, had_crlf));
            }
        }
        return Err(err);
    }

    Ok(restore_eol(working, had_crlf))
}

fn restore_eol(content: String, had_crlf: bool) -> String {
    if had_crlf {
        content.replace('\n', "\r\n")
    } else {
        content
    }
}

fn apply_block(
    content: &str,
    block: &DiffBlock,
    normalize_whitespace: bool,
) -> Result<String, ApplyDiffError> {
    let search = block.search.replace("\r\n", "\n");
    let replace = block.replace.replace("\r\n", "\n");

    if search.is_empty() {
        return Err(ApplyDiffError::new(INVALID_PATCH, "empty SEARCH block"));
    }

    // strict pass
    let occurrences = content.match_indices(&search).count();
    match occurrences {
        1 => return Ok(content.replacen(&search, &replace, 1)),
        0 => {}
        n => {
            return Err(ApplyDiffError::new(
                AMBIGUOUS_MATCH,
                format!("SEARCH block matches {n} locations; add surrounding context"),
            ))
        }
    }

    if !normalize_whitespace {
        return Err(no_match_error(content, &search));
    }

    // normalized pass: line-by-line with collapsed whitespace
    let content_lines: Vec<&str> = content.split('\n').collect();
    let search_lines: Vec<String> = search.split('\n').map(normalize_line).collect();
    if search_lines.is_empty() || search_lines.len() > content_lines.len() {
        return Err(no_match_error(content, &search));
    }

    let mut matches = Vec::new();
    for start in 0..=(content_lines.len() - search_lines.len()) {
        let window = &content_lines[start..start + search_lines.len()];
        if window
            .iter()
            .map(|line| normalize_line(line))
            .eq(search_lines.iter().cloned())
        {
            matches.push(start);
        }
    }

    match matches.len() {
        1 => {
            let start = matches[0];
            let mut out: Vec<&str> = Vec::with_capacity(content_lines.len());
            out.extend(&content_lines[..start]);
            let replace_lines: Vec<&str> = replace.split('\n').collect();
            out.extend(replace_lines.iter());
            out.extend(&content_lines[start + search_lines.len()..]);
            Ok(out.join("\n"))
        }
        0 => Err(no_match_error(content, &search)),
        n => Err(ApplyDiffError::new(
            AMBIGUOUS_MATCH,
            format!("normalized SEARCH block matches {n} locations"),
        )),
    }
}

fn normalize_line(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn no_match_error(content: &str, search: &str) -> ApplyDiffError {
    let mut err = ApplyDiffError::new(
        NO_MATCH_NORMALIZED,
        "SEARCH block not found; closest candidate windows attached",
    );
    err.hints = candidate_windows(content, search);
    err
}

/// Top-3 windows of the file ranked by token overlap with the SEARCH text,
/// rendered with line numbers so the next patch can anchor itself.
fn candidate_windows(content: &str, search: &str) -> Vec<MatchHint> {
    let content_lines: Vec<&str> = content.split('\n').collect();
    let window_len = search.split('\n').count().min(content_lines.len()).max(1);
    let search_tokens: HashSet<&str> = search.split_whitespace().collect();
    if search_tokens.is_empty() || content_lines.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, usize)> = Vec::new(); // (score, start)
    for start in 0..=(content_lines.len() - window_len) {
        let window_tokens: HashSet<&str> = content_lines[start..start + window_len]
            .iter()
            .flat_map(|line| line.split_whitespace())
            .collect();
        let score = search_tokens.intersection(&window_tokens).count();
        if score > 0 {
            scored.push((score, start));
        }
    }
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    scored
        .into_iter()
        .take(3)
        .map(|(_, start)| {
            let end = start + window_len;
            let snippet = content_lines[start..end]
                .iter()
                .enumerate()
                .map(|(idx, line)| format!("{:>4} | {}", start + idx + 1, line))
                .collect::<Vec<_>>()
                .join("\n");
            MatchHint {
                line_start: start + 1,
                line_end: end,
                snippet,
            }
        })
        .collect()
}

fn qualifies_for_full_file_fallback(content: &str, replace: &str) -> bool {
    if content.len() <= FULL_FILE_MIN_LEN {
        return false;
    }
    let body = strip_code_fence(replace);
    if (body.len() as f64) < (content.len() as f64) * FULL_FILE_MIN_RATIO {
        return false;
    }
    let qualifying = Regex::new(
        r"import |export default|function [A-Z]|const [A-Z]|return \(|<div|<main|<section",
    )
    .expect("fallback token regex");
    qualifying.is_match(body)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim_end).unwrap_or(rest)
}
