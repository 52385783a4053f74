use mledger_core::Category;
use serde::{Deserialize, Serialize};

use crate::util::levenshtein_distance;

/// Maps a description to a subcategory label such as "Airtime".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubcategoryRule {
    pub name: String,
    pub priority: i32,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
}

/// Flips the sign-derived category for a named financial product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryOverride {
    pub product: String,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    /// Only applies when the sign rule produced this category.
    #[serde(default)]
    pub when: Option<Category>,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    Regex,
    Fuzzy {
        threshold: f32,
    },
}

/// A pattern with its precompiled regex (if applicable).
#[derive(Debug, Clone)]
pub(crate) struct Matcher {
    pattern: String,
    match_type: MatchType,
    compiled_regex: Option<regex::Regex>,
}

impl Matcher {
    pub(crate) fn new(pattern: &str, match_type: &MatchType) -> Self {
        let compiled_regex = match match_type {
            MatchType::Regex => match regex::Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(%pattern, error = %e, "rule pattern does not compile; rule disabled");
                    None
                }
            },
            _ => None,
        };
        Self {
            pattern: pattern.to_lowercase(),
            match_type: match_type.clone(),
            compiled_regex,
        }
    }

    pub(crate) fn is_match(&self, description: &str) -> bool {
        let text = description.to_lowercase();
        match &self.match_type {
            MatchType::Contains => text.contains(&self.pattern),
            MatchType::Exact => text == self.pattern,
            MatchType::Regex => self
                .compiled_regex
                .as_ref()
                .is_some_and(|re| re.is_match(description)),
            MatchType::Fuzzy { threshold } => fuzzy_score(&text, &self.pattern) >= *threshold,
        }
    }
}

pub struct SubcategoryEngine {
    rules: Vec<(SubcategoryRule, Matcher)>,
}

impl SubcategoryEngine {
    pub fn new(rules: Vec<SubcategoryRule>) -> Self {
        let mut compiled: Vec<_> = rules
            .into_iter()
            .map(|rule| {
                let m = Matcher::new(&rule.pattern, &rule.match_type);
                (rule, m)
            })
            .collect();
        // Highest priority first; stable, so equal priorities keep file order.
        compiled.sort_by(|a, b| b.0.priority.cmp(&a.0.priority));
        Self { rules: compiled }
    }

    pub fn find_matching_rule(&self, description: &str) -> Option<&SubcategoryRule> {
        self.rules
            .iter()
            .find(|(_, m)| m.is_match(description))
            .map(|(rule, _)| rule)
    }

    pub fn subcategory(&self, description: &str) -> Option<String> {
        self.find_matching_rule(description).map(|r| r.name.clone())
    }
}

/// Product buckets statement readers ask about most.
pub fn default_subcategory_rules() -> Vec<SubcategoryRule> {
    let rule = |name: &str, priority: i32, pattern: &str| SubcategoryRule {
        name: name.to_string(),
        priority,
        pattern: pattern.to_string(),
        match_type: MatchType::Regex,
    };
    vec![
        rule("Charges", 100, r"(?i)\b(?:charges?|fees?|commission)\b"),
        rule("M-Shwari", 90, r"(?i)\bm-?shwari\b"),
        rule("Fuliza", 90, r"(?i)\bfuliza\b"),
        rule("Airtime", 80, r"(?i)\bairtime\b"),
        rule("Withdrawals", 70, r"(?i)\bwithdraw(?:al)?\b|\bagent\b|\batm\b"),
        rule("Bills & PayBill", 60, r"(?i)\bpay\s*bill\b|\bpaybill\b"),
        rule("Buy Goods / Shopping", 50, r"(?i)\bbuy\s+goods\b|\bmerchant\b|\btill\b"),
        rule(
            "Send Money / Transfers",
            40,
            r"(?i)\btransfer\b|\bsend\s+money\b|\breceived\s+from\b|\bfunds\s+received\b|\b(?:254|0)7\d{2}",
        ),
    ]
}

fn fuzzy_score(s1: &str, s2: &str) -> f32 {
    let max_len = s1.len().max(s2.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein_distance(s1, s2) as f32 / max_len as f32)
}
