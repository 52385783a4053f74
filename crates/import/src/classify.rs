use std::collections::{HashMap, HashSet};

use mledger_core::{Category, Money, ParseWarning, Transaction};

use crate::config::ParserConfig;
use crate::fields::RawTransaction;
use crate::rules::{CategoryOverride, Matcher, SubcategoryEngine};
use crate::util::KeywordSet;

#[derive(Debug, Default)]
pub struct Classified {
    pub transactions: Vec<Transaction>,
    pub warnings: Vec<ParseWarning>,
}

pub struct Classifier {
    charge: KeywordSet,
    subcategories: SubcategoryEngine,
    overrides: Vec<(CategoryOverride, Matcher)>,
}

impl Classifier {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            charge: KeywordSet::new(&config.charge_keywords),
            subcategories: SubcategoryEngine::new(config.subcategories.clone()),
            overrides: config
                .overrides
                .iter()
                .map(|o| (o.clone(), Matcher::new(&o.pattern, &o.match_type)))
                .collect(),
        }
    }

    /// Charge keyword, then paid-in, then paid-out; a product override has the last word.
    pub fn category(&self, raw: &RawTransaction) -> Category {
        let description = &raw.block.description;
        let naive = if self.charge.is_match(description) {
            Some(Category::Charge)
        } else if raw.fields.paid_in.is_positive() {
            Some(Category::Income)
        } else if raw.fields.paid_out.is_positive() {
            Some(Category::Expense)
        } else {
            None
        };

        let overridden = self.overrides.iter().find(|(o, m)| {
            o.when.map_or(true, |w| Some(w) == naive) && m.is_match(description)
        });
        match (overridden, naive) {
            (Some((o, _)), _) => {
                tracing::debug!(
                    receipt = %raw.block.receipt_id,
                    product = %o.product,
                    category = %o.category,
                    "category override applied"
                );
                o.category
            }
            (None, Some(c)) => c,
            (None, None) => Category::Expense,
        }
    }

    /// Categorize, drop duplicate receipts, and link charges to their parent.
    pub fn classify(&self, raws: Vec<RawTransaction>) -> Classified {
        let mut out = Classified::default();
        let mut primary: HashSet<String> = HashSet::new();

        for raw in raws {
            let category = self.category(&raw);
            if !category.is_charge() && !primary.insert(raw.block.receipt_id.clone()) {
                tracing::debug!(receipt = %raw.block.receipt_id, "duplicate receipt dropped");
                out.warnings.push(ParseWarning::DuplicateReceipt {
                    receipt_id: raw.block.receipt_id,
                });
                continue;
            }

            let f = raw.fields;
            let amount = match category {
                Category::Income => f.paid_in,
                Category::Expense => f.paid_out,
                Category::Charge if f.paid_out.is_positive() => f.paid_out,
                Category::Charge => f.paid_in,
            };
            // An override can route a row to the column the statement left empty.
            let amount = if amount.is_zero() { f.paid_in.max(f.paid_out) } else { amount };

            let b = raw.block;
            out.transactions.push(Transaction {
                subcategory: self.subcategories.subcategory(&b.description),
                receipt_id: b.receipt_id,
                parent_receipt: None,
                date: b.date,
                time: b.time,
                description: b.description,
                category,
                amount,
                balance: f.balance,
                computed_balance: Money::zero(),
                reconciliation_warning: false,
                sequence: b.sequence,
            });
        }

        link_charges(&mut out.transactions);
        out
    }
}

/// Point every charge at the single non-charge record sharing its receipt id.
fn link_charges(transactions: &mut [Transaction]) {
    let mut primaries: HashMap<&str, usize> = HashMap::new();
    for t in transactions.iter().filter(|t| !t.category.is_charge()) {
        *primaries.entry(t.receipt_id.as_str()).or_default() += 1;
    }
    let parents: HashSet<String> = primaries
        .into_iter()
        .filter(|(_, n)| *n == 1)
        .map(|(id, _)| id.to_string())
        .collect();

    for t in transactions.iter_mut().filter(|t| t.category.is_charge()) {
        if parents.contains(&t.receipt_id) {
            t.parent_receipt = Some(t.receipt_id.clone());
        }
    }
}
