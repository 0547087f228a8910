use regex::Regex;

const REPAIR_KEYWORDS: [&str; 10] = [
    "修复", "修正", "排查", "优化", "fix", "bug", "error", "issue", "refactor", "improve",
];

/// Seam for requirement analysis so the regex heuristics can be swapped for a
/// model-backed implementation without touching the generator.
pub trait RequirementAnalyzer: Send + Sync {
    fn detects_repair_intent(&self, message: &str) -> bool;
    fn detail_score(&self, message: &str) -> u32;
}

#[derive(Default)]
pub struct RegexRequirementAnalyzer;

impl RegexRequirementAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl RequirementAnalyzer for RegexRequirementAnalyzer {
    fn detects_repair_intent(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        REPAIR_KEYWORDS.iter().any(|kw| lowered.contains(kw))
    }

    fn detail_score(&self, message: &str) -> u32 {
        let units = detail_units(message);
        let mut score = 0;
        if units >= 18 {
            score += 1;
        }
        if units >= 32 {
            score += 1;
        }
        if separator_count(message) >= 2 {
            score += 1;
        }
        if message.chars().any(|c| c == ':' || c == '：') {
            score += 1;
        }
        if has_bullet_line(message) {
            score += 1;
        }
        score
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

/// CJK characters count one unit each; runs of Latin text count per token.
fn detail_units(message: &str) -> usize {
    let cjk = message.chars().filter(|c| is_cjk(*c)).count();
    let latin_tokens = message
        .split_whitespace()
        .filter(|token| token.chars().any(|c| c.is_ascii_alphanumeric()))
        .count();
    cjk + latin_tokens
}

fn separator_count(message: &str) -> usize {
    message
        .chars()
        .filter(|c| matches!(c, ',' | '，' | ';' | '；' | '\n'))
        .count()
}

fn has_bullet_line(message: &str) -> bool {
    let numbered = Regex::new(r"^\d+[.、)）]").expect("bullet regex");
    message.lines().any(|line| {
        let trimmed = line.trim_start();
        trimmed.starts_with('-')
            || trimmed.starts_with('*')
            || trimmed.starts_with('•')
            || numbered.is_match(trimmed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> RegexRequirementAnalyzer {
        RegexRequirementAnalyzer::new()
    }

    #[test]
    fn repair_intent_matches_cjk_and_latin_keywords() {
        assert!(analyzer().detects_repair_intent("请修复登录页问题"));
        assert!(analyzer().detects_repair_intent("Fix the login page"));
        assert!(analyzer().detects_repair_intent("there is a BUG in checkout"));
        assert!(!analyzer().detects_repair_intent("生成一个看板页面"));
    }

    #[test]
    fn short_vague_message_scores_low() {
        assert!(analyzer().detail_score("做一个博客") <= 1);
        assert!(analyzer().detail_score("a todo app") <= 1);
    }

    #[test]
    fn structured_message_scores_high() {
        let message = "需求: 订单管理系统\n1. 列表页支持筛选, 搜索\n2. 详情页展示状态\n3. 支持导出, 打印";
        assert!(analyzer().detail_score(message) >= 3);
    }

    #[test]
    fn units_mix_cjk_and_latin() {
        // 7 CJK chars + 2 latin tokens
        assert_eq!(detail_units("做一个管理系统 with react"), 9);
    }

    #[test]
    fn bullet_lines_detected() {
        assert!(has_bullet_line("- first\n- second"));
        assert!(has_bullet_line("1. first"));
        assert!(!has_bullet_line("just a sentence"));
    }
}
