use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Income,
    Expense,
    Charge,
}

impl Category {
    pub fn is_charge(self) -> bool {
        matches!(self, Category::Charge)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Income => write!(f, "income"),
            Category::Expense => write!(f, "expense"),
            Category::Charge => write!(f, "charge"),
        }
    }
}

/// One money movement as emitted by the classifier and finalized by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub receipt_id: String,
    /// Receipt id of the transaction a charge was levied on. Lookup only.
    pub parent_receipt: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub description: String,
    pub category: Category,
    pub subcategory: Option<String>,
    /// Always non-negative; direction comes from `category`.
    pub amount: Money,
    /// Balance as printed on the statement, if any.
    pub balance: Option<Money>,
    pub computed_balance: Money,
    pub reconciliation_warning: bool,
    /// Position of the originating block in the extracted text.
    #[serde(skip)]
    pub sequence: usize,
}

impl Transaction {
    /// `amount` with the sign implied by the category.
    pub fn signed_amount(&self) -> Money {
        match self.category {
            Category::Income => self.amount,
            Category::Expense | Category::Charge => -self.amount,
        }
    }
}
