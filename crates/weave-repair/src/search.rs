use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use weave_types::ParsedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    /// Official documentation sources outrank community content.
    #[serde(default)]
    pub official: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredLink {
    pub url: String,
    pub title: String,
    pub score: u32,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairGuidance {
    pub query: String,
    pub links: Vec<ScoredLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_summary: Option<String>,
}

const OFFICIAL_BONUS: u32 = 40;
const COMMUNITY_BONUS: u32 = 15;
const OVERLAP_WEIGHT: f64 = 45.0;
const HIGH_THRESHOLD: u32 = 70;
const MEDIUM_THRESHOLD: u32 = 40;

pub fn build_repair_query(errors: &[ParsedError]) -> String {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for error in errors.iter().take(5) {
        for token in error.message.split_whitespace() {
            let cleaned: String = token
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '@' || *c == '/')
                .collect();
            if cleaned.len() < 3 {
                continue;
            }
            let lowered = cleaned.to_lowercase();
            if seen.insert(lowered.clone()) {
                tokens.push(lowered);
            }
            if tokens.len() >= 12 {
                return tokens.join(" ");
            }
        }
    }
    tokens.join(" ")
}

fn hostname(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.split('@').next_back()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn overlap_score(query: &str, candidate: &SearchCandidate) -> u32 {
    let query_tokens: HashSet<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
    if query_tokens.is_empty() {
        return 0;
    }
    let candidate_tokens: HashSet<String> = candidate
        .title
        .split_whitespace()
        .chain(candidate.snippet.split_whitespace())
        .map(|t| {
            t.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect();
    let hits = query_tokens
        .iter()
        .filter(|t| candidate_tokens.contains(*t))
        .count();
    ((hits as f64 / query_tokens.len() as f64) * OVERLAP_WEIGHT).round() as u32
}

fn confidence_for(score: u32) -> Confidence {
    if score >= HIGH_THRESHOLD {
        Confidence::High
    } else if score >= MEDIUM_THRESHOLD {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Deterministic guidance: exact-hostname allow-list filter, official-first
/// scoring plus token overlap, ordered by (score desc, url asc).
pub fn build_repair_guidance(
    errors: &[ParsedError],
    candidates: &[SearchCandidate],
    allowed_hosts: &[String],
    visual_summary: Option<&str>,
    payload_char_budget: usize,
) -> RepairGuidance {
    let query = build_repair_query(errors);

    let mut links: Vec<ScoredLink> = candidates
        .iter()
        .filter(|candidate| {
            hostname(&candidate.url)
                .map(|host| allowed_hosts.iter().any(|allowed| allowed == host))
                .unwrap_or(false)
        })
        .map(|candidate| {
            let base = if candidate.official {
                OFFICIAL_BONUS
            } else {
                COMMUNITY_BONUS
            };
            let score = base + overlap_score(&query, candidate);
            ScoredLink {
                url: candidate.url.clone(),
                title: candidate.title.clone(),
                score,
                confidence: confidence_for(score),
            }
        })
        .collect();

    links.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.url.cmp(&b.url)));

    let visual_summary = visual_summary.map(|summary| {
        if summary.len() <= payload_char_budget {
            summary.to_string()
        } else {
            let mut end = payload_char_budget;
            while end > 0 && !summary.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}…", &summary[..end])
        }
    });

    RepairGuidance {
        query,
        links,
        visual_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::ErrorCategory;

    fn errors() -> Vec<ParsedError> {
        vec![ParsedError::new(
            ErrorCategory::MissingDependency,
            "Cannot find module dayjs in project",
        )]
    }

    fn candidate(url: &str, title: &str, official: bool) -> SearchCandidate {
        SearchCandidate {
            url: url.to_string(),
            title: title.to_string(),
            snippet: String::new(),
            official,
        }
    }

    fn hosts(list: &[&str]) -> Vec<String> {
        list.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn hostname_filter_is_exact() {
        let guidance = build_repair_guidance(
            &errors(),
            &[
                candidate("https://react.dev/learn", "react docs", true),
                candidate("https://evil-react.dev/learn", "spoof", true),
                candidate("https://sub.react.dev/learn", "subdomain", true),
            ],
            &hosts(&["react.dev"]),
            None,
            0,
        );
        assert_eq!(guidance.links.len(), 1);
        assert_eq!(guidance.links[0].url, "https://react.dev/learn");
    }

    #[test]
    fn official_outranks_community_and_urls_break_ties() {
        let guidance = build_repair_guidance(
            &errors(),
            &[
                candidate("https://stackoverflow.com/q/2", "cannot find module dayjs", false),
                candidate("https://day.js.org/docs", "cannot find module dayjs", true),
                candidate("https://stackoverflow.com/q/1", "cannot find module dayjs", false),
            ],
            &hosts(&["stackoverflow.com", "day.js.org"]),
            None,
            0,
        );
        assert_eq!(guidance.links[0].url, "https://day.js.org/docs");
        // equal scores order by url ascending
        assert_eq!(guidance.links[1].url, "https://stackoverflow.com/q/1");
        assert_eq!(guidance.links[2].url, "https://stackoverflow.com/q/2");
    }

    #[test]
    fn confidence_thresholds_are_deterministic() {
        let guidance = build_repair_guidance(
            &errors(),
            &[
                candidate("https://day.js.org/docs", "cannot find module dayjs in project", true),
                candidate("https://example.com/post", "unrelated topic entirely", false),
            ],
            &hosts(&["day.js.org", "example.com"]),
            None,
            0,
        );
        assert_eq!(guidance.links[0].confidence, Confidence::High);
        assert_eq!(guidance.links[1].confidence, Confidence::Low);
    }

    #[test]
    fn visual_summary_respects_the_budget() {
        let guidance = build_repair_guidance(
            &errors(),
            &[],
            &[],
            Some("a long visual summary describing the screenshot"),
            12,
        );
        let summary = guidance.visual_summary.expect("summary");
        assert!(summary.starts_with("a long visua"));
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn query_tokens_are_deduplicated_and_bounded() {
        let many = vec![ParsedError::new(
            ErrorCategory::TypeError,
            "alpha beta alpha gamma delta epsilon zeta eta theta iota kappa lambda mu nu xi",
        )];
        let query = build_repair_query(&many);
        assert!(query.split_whitespace().count() <= 12);
        assert_eq!(
            query.split_whitespace().filter(|t| *t == "alpha").count(),
            1
        );
    }
}
