use mledger_core::{Money, ParseWarning};

use crate::tokenizer::TransactionBlock;

/// Money columns recovered from a block's amount tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFields {
    pub paid_in: Money,
    pub paid_out: Money,
    pub balance: Option<Money>,
}

/// A block whose amounts have been assigned to columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub block: TransactionBlock,
    pub fields: ResolvedFields,
}

/// Assign a block's tokens to (paid in, paid out, balance).
///
/// Three or more tokens whose second- and third-to-last are non-negative are
/// read positionally as paid-in / paid-out / balance columns. Otherwise the last
/// two are a signed amount and the balance. Fewer than two tokens is unresolvable.
pub fn resolve_fields(tokens: &[Money]) -> Option<ResolvedFields> {
    let n = tokens.len();
    if n < 2 {
        return None;
    }
    let balance = Some(tokens[n - 1]);

    if n >= 3 && !tokens[n - 3].is_negative() && !tokens[n - 2].is_negative() {
        return Some(ResolvedFields {
            paid_in: tokens[n - 3],
            paid_out: tokens[n - 2],
            balance,
        });
    }

    let amount = tokens[n - 2];
    let (paid_in, paid_out) = if amount.is_negative() {
        (Money::zero(), amount.abs())
    } else {
        (amount, Money::zero())
    };
    Some(ResolvedFields { paid_in, paid_out, balance })
}

/// Resolve every block, dropping (and counting) the ones without enough amounts.
pub fn resolve_blocks(blocks: Vec<TransactionBlock>) -> (Vec<RawTransaction>, Vec<ParseWarning>) {
    let mut resolved = Vec::with_capacity(blocks.len());
    let mut warnings = Vec::new();
    for block in blocks {
        match resolve_fields(&block.tokens) {
            Some(fields) => resolved.push(RawTransaction { block, fields }),
            None => {
                tracing::debug!(receipt = %block.receipt_id, "unresolvable amounts, block dropped");
                warnings.push(ParseWarning::BlockDiscarded {
                    receipt_id: block.receipt_id,
                    tokens: block.tokens.len(),
                });
            }
        }
    }
    (resolved, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn m(cents: i64) -> Money {
        Money::from_cents(cents)
    }

    fn block(tokens: Vec<Money>) -> TransactionBlock {
        TransactionBlock {
            receipt_id: "QA11BB22".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            description: String::new(),
            tokens,
            sequence: 0,
        }
    }

    #[test]
    fn positive_amount_is_paid_in() {
        let f = resolve_fields(&[m(100_000), m(500_000)]).unwrap();
        assert_eq!(f.paid_in, m(100_000));
        assert_eq!(f.paid_out, Money::zero());
        assert_eq!(f.balance, Some(m(500_000)));
    }

    #[test]
    fn negative_amount_is_paid_out() {
        let f = resolve_fields(&[m(-50_000), m(450_000)]).unwrap();
        assert_eq!(f.paid_in, Money::zero());
        assert_eq!(f.paid_out, m(50_000));
    }

    #[test]
    fn three_non_negative_tokens_are_positional_columns() {
        let f = resolve_fields(&[m(0), m(2_500), m(7_500)]).unwrap();
        assert_eq!(f.paid_in, Money::zero());
        assert_eq!(f.paid_out, m(2_500));
        assert_eq!(f.balance, Some(m(7_500)));
    }

    #[test]
    fn positional_rule_looks_only_at_the_last_three() {
        // A stray amount inside the description comes first.
        let f = resolve_fields(&[m(-999), m(1_000), m(0), m(11_000)]).unwrap();
        assert_eq!(f.paid_in, m(1_000));
        assert_eq!(f.balance, Some(m(11_000)));
    }

    #[test]
    fn negative_in_column_position_falls_back_to_amount_balance() {
        let f = resolve_fields(&[m(12_345), m(-2_000), m(8_000)]).unwrap();
        assert_eq!(f.paid_in, Money::zero());
        assert_eq!(f.paid_out, m(2_000));
        assert_eq!(f.balance, Some(m(8_000)));
    }

    #[test]
    fn fewer_than_two_tokens_is_unresolvable() {
        assert_eq!(resolve_fields(&[]), None);
        assert_eq!(resolve_fields(&[m(100)]), None);
    }

    #[test]
    fn resolve_blocks_counts_drops() {
        let (ok, warnings) = resolve_blocks(vec![block(vec![m(100), m(200)]), block(vec![m(100)])]);
        assert_eq!(ok.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], ParseWarning::BlockDiscarded { tokens: 1, .. }));
    }
}
