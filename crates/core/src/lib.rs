pub mod ledger;
pub mod money;
pub mod transaction;
pub mod warning;

pub use ledger::{
    reconcile, Ledger, LedgerError, OpeningBalance, ReconcileMode, ReconcileOptions,
    Reconciliation, Summary,
};
pub use money::Money;
pub use transaction::{Category, Transaction};
pub use warning::ParseWarning;
