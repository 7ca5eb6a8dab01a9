//! Money values in minor units. All arithmetic and formatting is integer-exact.

use std::ops::Add;

use chrono::NaiveDate;
use serde::Serialize;

/// Per-currency display metadata.
struct CurrencyInfo {
    code: &'static str,
    symbol: &'static str,
    divisor: i64,
}

const CURRENCY_TABLE: &[CurrencyInfo] = &[
    CurrencyInfo { code: "USD", symbol: "$", divisor: 100 },
    CurrencyInfo { code: "EUR", symbol: "€", divisor: 100 },
    CurrencyInfo { code: "RUB", symbol: "₽", divisor: 100 },
    CurrencyInfo { code: "JPY", symbol: "¥", divisor: 1 },
    CurrencyInfo { code: "KRW", symbol: "₩", divisor: 1 },
];

fn currency_info(code: &str) -> Option<&'static CurrencyInfo> {
    CURRENCY_TABLE.iter().find(|c| c.code == code)
}

/// An amount of money in minor units (`amount / divisor` major units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransitCurrency {
    pub amount: i64,
    pub code: &'static str,
    pub divisor: i64,
}

impl TransitCurrency {
    /// Amount in `code`, using the table divisor (100 for unknown codes).
    pub fn new(amount: i64, code: &'static str) -> Self {
        let divisor = currency_info(code).map(|c| c.divisor).unwrap_or(100);
        TransitCurrency { amount, code, divisor }
    }

    pub fn with_divisor(amount: i64, code: &'static str, divisor: i64) -> Self {
        TransitCurrency {
            amount,
            code,
            divisor: divisor.max(1),
        }
    }

    pub fn usd(cents: i64) -> Self {
        Self::new(cents, "USD")
    }

    pub fn eur(cents: i64) -> Self {
        Self::new(cents, "EUR")
    }

    pub fn rub(kopecks: i64) -> Self {
        Self::new(kopecks, "RUB")
    }

    pub fn jpy(yen: i64) -> Self {
        Self::new(yen, "JPY")
    }

    pub fn krw(won: i64) -> Self {
        Self::new(won, "KRW")
    }

    pub fn negate(self) -> Self {
        TransitCurrency {
            amount: -self.amount,
            ..self
        }
    }

    pub fn is_same_currency(&self, other: &Self) -> bool {
        self.code == other.code && self.divisor == other.divisor
    }

    /// Sum of two amounts; `None` if the currencies differ.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        if !self.is_same_currency(&other) {
            return None;
        }
        Some(TransitCurrency {
            amount: self.amount + other.amount,
            ..self
        })
    }

    /// Unsigned display string, e.g. `$3.50` or `¥870`.
    pub fn format_currency_string(&self) -> String {
        let symbol = currency_info(self.code).map(|c| c.symbol);
        let number = self.format_magnitude();
        let body = match symbol {
            Some(s) => format!("{s}{number}"),
            None => format!("{number} {}", self.code),
        };
        if self.amount < 0 {
            format!("-{body}")
        } else {
            body
        }
    }

    /// Display string with an explicit sign: `+$1.00`, `-$6.30`.
    pub fn format_signed(&self) -> String {
        let unsigned = TransitCurrency {
            amount: self.amount.abs(),
            ..*self
        }
        .format_currency_string();
        if self.amount < 0 {
            format!("-{unsigned}")
        } else {
            format!("+{unsigned}")
        }
    }

    fn format_magnitude(&self) -> String {
        let magnitude = self.amount.unsigned_abs();
        let divisor = self.divisor.max(1) as u64;
        let major = magnitude / divisor;
        let minor = magnitude % divisor;
        let digits = fraction_digits(divisor);
        if digits == 0 {
            major.to_string()
        } else {
            format!("{major}.{minor:0digits$}")
        }
    }
}

/// Number of decimal places a divisor represents (100 → 2). Non-powers of ten
/// round up so no precision is hidden.
fn fraction_digits(divisor: u64) -> usize {
    let mut digits = 0;
    let mut scale = 1u64;
    while scale < divisor {
        scale = scale.saturating_mul(10);
        digits += 1;
    }
    digits
}

impl std::fmt::Display for TransitCurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_currency_string())
    }
}

/// Currency addition never crosses codes: mismatched operands yield `None`.
impl Add for TransitCurrency {
    type Output = Option<TransitCurrency>;

    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs)
    }
}

/// Combine optional fares. `None` is the identity element. Mismatched
/// currencies keep the left operand.
pub fn add_fares(
    a: Option<TransitCurrency>,
    b: Option<TransitCurrency>,
) -> Option<TransitCurrency> {
    match (a, b) {
        (Some(x), Some(y)) => match x + y {
            Some(sum) => Some(sum),
            None => {
                tracing::warn!(left = x.code, right = y.code, "refusing to add fares across currencies");
                Some(x)
            }
        },
        (Some(x), None) => Some(x),
        (None, y) => y,
    }
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// One stored value on a card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitBalance {
    pub balance: TransitCurrency,
    pub name: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

impl TransitBalance {
    pub fn new(balance: TransitCurrency) -> Self {
        TransitBalance {
            balance,
            name: None,
            valid_from: None,
            valid_to: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn valid_to(mut self, date: Option<NaiveDate>) -> Self {
        self.valid_to = date;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usd_format() {
        let fare = TransitCurrency::usd(350);
        assert!(fare.format_currency_string().contains("3.50"));
        assert_eq!(fare.format_currency_string(), "$3.50");
        assert_eq!(TransitCurrency::usd(30583).to_string(), "$305.83");
        assert_eq!(TransitCurrency::usd(5).to_string(), "$0.05");
    }

    #[test]
    fn test_jpy_has_no_fraction() {
        let yen = TransitCurrency::jpy(870);
        assert_eq!(yen.divisor, 1);
        assert_eq!(yen.format_currency_string(), "¥870");
        assert!(!yen.format_currency_string().contains('.'));
    }

    #[test]
    fn test_negative_and_signed() {
        let refund = TransitCurrency::eur(-1250);
        assert_eq!(refund.format_currency_string(), "-€12.50");
        assert_eq!(refund.format_signed(), "-€12.50");
        assert_eq!(TransitCurrency::rub(5000).format_signed(), "+₽50.00");
        assert_eq!(refund.negate(), TransitCurrency::eur(1250));
        assert_eq!(TransitCurrency::jpy(870).negate().divisor, 1);
    }

    #[test]
    fn test_unknown_code() {
        let c = TransitCurrency::new(1234, "XTS");
        assert_eq!(c.divisor, 100);
        assert_eq!(c.to_string(), "12.34 XTS");
        let odd = TransitCurrency::with_divisor(1234, "XTS", 1000);
        assert_eq!(odd.to_string(), "1.234 XTS");
    }

    #[test]
    fn test_add_same_currency() {
        let sum = TransitCurrency::usd(200) + TransitCurrency::usd(430);
        assert_eq!(sum, Some(TransitCurrency::usd(630)));
    }

    #[test]
    fn test_add_never_crosses_codes() {
        assert_eq!(TransitCurrency::usd(200) + TransitCurrency::eur(200), None);
        assert_eq!(
            add_fares(Some(TransitCurrency::usd(200)), Some(TransitCurrency::eur(1))),
            Some(TransitCurrency::usd(200))
        );
    }

    #[test]
    fn test_add_fares_identity() {
        let x = TransitCurrency::jpy(170);
        assert_eq!(add_fares(None, Some(x)), Some(x));
        assert_eq!(add_fares(Some(x), None), Some(x));
        assert_eq!(add_fares(None, None), None);
    }

    #[test]
    fn test_balance_builder() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 1);
        let b = TransitBalance::new(TransitCurrency::usd(844))
            .named("Transit value")
            .valid_to(date);
        assert_eq!(b.name.as_deref(), Some("Transit value"));
        assert_eq!(b.valid_to, date);
    }
}
