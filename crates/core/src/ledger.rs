use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::money::Money;
use super::transaction::{Category, Transaction};
use super::warning::ParseWarning;

/// Where the running balance starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningBalance {
    /// Back out the opening balance from the first statement-reported balance.
    /// Partial statements (missing opening pages) then reconcile cleanly.
    #[default]
    Inferred,
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Flag mismatching transactions and keep going.
    #[default]
    Warn,
    /// Fail the document on the first mismatch.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    pub tolerance: Money,
    pub opening_balance: OpeningBalance,
    pub mode: ReconcileMode,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            tolerance: Money::from_cents(1),
            opening_balance: OpeningBalance::default(),
            mode: ReconcileMode::default(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Balance mismatch on {receipt_id}: statement={reported}, computed={computed}")]
    BalanceMismatch {
        receipt_id: String,
        reported: Money,
        computed: Money,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub income_total: Money,
    pub expense_total: Money,
    pub charge_total: Money,
    /// income − expense − charge; excludes the opening balance.
    pub net_balance: Money,
    pub transaction_count: usize,
    pub opening_balance: Money,
}

impl Summary {
    pub fn from_transactions(transactions: &[Transaction], opening_balance: Money) -> Self {
        let total = |c: Category| {
            transactions
                .iter()
                .filter(|t| t.category == c)
                .map(|t| t.amount)
                .sum::<Money>()
        };
        let income_total = total(Category::Income);
        let expense_total = total(Category::Expense);
        let charge_total = total(Category::Charge);
        Summary {
            income_total,
            expense_total,
            charge_total,
            net_balance: income_total - expense_total - charge_total,
            transaction_count: transactions.len(),
            opening_balance,
        }
    }

    /// Last computed balance the summary implies.
    pub fn closing_balance(&self) -> Money {
        self.opening_balance + self.net_balance
    }
}

/// Chronologically ordered, balance-annotated transactions of one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub transactions: Vec<Transaction>,
    pub summary: Summary,
}

impl Ledger {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn flagged(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|t| t.reconciliation_warning)
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub ledger: Ledger,
    pub warnings: Vec<ParseWarning>,
}

/// Order, walk and cross-check a statement's transactions.
pub fn reconcile(
    mut transactions: Vec<Transaction>,
    options: &ReconcileOptions,
) -> Result<Reconciliation, LedgerError> {
    // Discovery order breaks timestamp ties so same-second receipts stay grouped.
    transactions.sort_by(|a, b| (a.date, a.time, a.sequence).cmp(&(b.date, b.time, b.sequence)));

    let opening = match (options.opening_balance, transactions.first()) {
        (OpeningBalance::Inferred, Some(first)) => first
            .balance
            .map(|b| b - first.signed_amount())
            .unwrap_or_else(Money::zero),
        _ => Money::zero(),
    };

    let mut warnings = Vec::new();
    let mut running = opening;
    for tx in transactions.iter_mut() {
        running = running + tx.signed_amount();
        tx.computed_balance = running;
        tx.reconciliation_warning = false;

        let Some(reported) = tx.balance else { continue };
        if (reported - running).abs() <= options.tolerance {
            continue;
        }
        if options.mode == ReconcileMode::Strict {
            return Err(LedgerError::BalanceMismatch {
                receipt_id: tx.receipt_id.clone(),
                reported,
                computed: running,
            });
        }
        tracing::warn!(
            receipt = %tx.receipt_id,
            %reported,
            computed = %running,
            "statement balance does not match running balance"
        );
        tx.reconciliation_warning = true;
        warnings.push(ParseWarning::BalanceMismatch {
            receipt_id: tx.receipt_id.clone(),
            reported,
            computed: running,
        });
    }

    let summary = Summary::from_transactions(&transactions, opening);
    Ok(Reconciliation {
        ledger: Ledger { transactions, summary },
        warnings,
    })
}
