use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// Statement amounts at or beyond this magnitude are rejected, so sums over a
/// whole ledger stay well inside `Decimal`'s range.
const AMOUNT_LIMIT: i64 = 1_000_000_000_000_000;

/// Two-decimal fixed-point amount. Every constructor rounds to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        let mut d = decimal.round_dp(2);
        d.rescale(2);
        Money(d)
    }

    pub fn zero() -> Self {
        Money(Decimal::new(0, 2))
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    /// Parse a statement amount such as `1,000.00`, `-500.00` or `Ksh1,250.50`.
    /// Parenthesised values are negative.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (negative, s) = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            Some(inner) => (true, inner),
            None => (false, s),
        };
        let s = strip_currency(s);
        let clean: String = s.chars().filter(|c| *c != ',').collect();
        if clean.is_empty() {
            return None;
        }
        let dec = Decimal::from_str(&clean).ok()?;
        if dec.abs() >= Decimal::from(AMOUNT_LIMIT) {
            return None;
        }
        let m = Money::from_decimal(dec);
        Some(if negative { -m } else { m })
    }
}

fn strip_currency(s: &str) -> &str {
    for prefix in ["Ksh", "KSh", "KSH", "KES", "Kes"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return rest.trim_start_matches(['.', ' ']);
        }
    }
    s
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{:.2}", self.0))
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money::from_decimal(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money::from_decimal(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        if self.0.is_zero() {
            return self;
        }
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}
