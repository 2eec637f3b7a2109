//! Type-safe price representation using decimal arithmetic.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Read a price from a loosely-typed document field.
    ///
    /// Accepts JSON numbers and strings such as `"$12,500.00"`, `"€9,900"` or
    /// `"12500 CAD"`. The currency comes from a code or symbol in the string
    /// and defaults to USD. Returns `None` for anything else, including
    /// unparseable strings.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let mut currency = CurrencyCode::default();
        let amount = match value {
            serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok()?,
            serde_json::Value::String(s) => {
                currency = CurrencyCode::detect(s).unwrap_or_default();
                let cleaned: String = s
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                    .collect();
                if cleaned.is_empty() {
                    return None;
                }
                Decimal::from_str(&cleaned).ok()?
            }
            _ => return None,
        };
        Some(Self::new(amount, currency))
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Find a currency marker in a formatted amount.
    ///
    /// ISO codes win over symbols. Prefixed dollar signs (`CA$`, `A$`) are
    /// told apart from a bare `$`.
    #[must_use]
    pub fn detect(s: &str) -> Option<Self> {
        let upper = s.to_ascii_uppercase();
        let code = upper
            .split(|c: char| !c.is_ascii_alphabetic())
            .find_map(|word| word.parse::<Self>().ok());
        if code.is_some() {
            return code;
        }
        if s.contains('€') {
            Some(Self::EUR)
        } else if s.contains('£') {
            Some(Self::GBP)
        } else if upper.contains("CA$") || upper.contains("C$") {
            Some(Self::CAD)
        } else if upper.contains("AU$") || upper.contains("A$") {
            Some(Self::AUD)
        } else if s.contains('$') {
            Some(Self::USD)
        } else {
            None
        }
    }
}

impl FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}
