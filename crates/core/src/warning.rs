use serde::Serialize;
use std::fmt;

use super::money::Money;

/// Non-fatal findings recorded while a document is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// A page produced no text by either strategy, or a strategy errored.
    PageUnreadable { page: usize, cause: String },
    /// A block had fewer than two decimal tokens.
    BlockDiscarded { receipt_id: String, tokens: usize },
    /// A second non-charge record reused a receipt id.
    DuplicateReceipt { receipt_id: String },
    BalanceMismatch {
        receipt_id: String,
        reported: Money,
        computed: Money,
    },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::PageUnreadable { page, cause } => {
                write!(f, "page {page} unreadable: {cause}")
            }
            ParseWarning::BlockDiscarded { receipt_id, tokens } => {
                write!(f, "block {receipt_id} discarded ({tokens} amount tokens)")
            }
            ParseWarning::DuplicateReceipt { receipt_id } => {
                write!(f, "duplicate record for receipt {receipt_id} dropped")
            }
            ParseWarning::BalanceMismatch { receipt_id, reported, computed } => write!(
                f,
                "balance mismatch on {receipt_id}: statement {reported}, computed {computed}"
            ),
        }
    }
}
