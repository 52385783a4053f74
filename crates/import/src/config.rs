use serde::{Deserialize, Serialize};

use crate::rules::{default_subcategory_rules, CategoryOverride, SubcategoryRule};

/// Knobs for tokenizing and classifying statement text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Shortest receipt id accepted on an anchor line.
    pub min_receipt_len: usize,
    /// A line containing one of these closes the current block.
    pub terminal_keywords: Vec<String>,
    pub charge_keywords: Vec<String>,
    pub subcategories: Vec<SubcategoryRule>,
    /// Empty by default: product direction is a business decision, not a parsing one.
    pub overrides: Vec<CategoryOverride>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            min_receipt_len: 8,
            terminal_keywords: vec!["Completed".to_string()],
            charge_keywords: ["fee", "charge", "commission"]
                .into_iter()
                .map(String::from)
                .collect(),
            subcategories: default_subcategory_rules(),
            overrides: vec![],
        }
    }
}
