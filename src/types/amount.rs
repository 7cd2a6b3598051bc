//! Currency amounts held as integer minor units.
//!
//! The wire form is a decimal with at most two fractional digits
//! (`10.00` is 1000 minor units). Parsing never goes through floating point
//! for textual input, so `0.1 + 0.2` style drift cannot reach a balance.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Minor units per major unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// Errors produced while reading a decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("'{0}' is not a decimal amount")]
    Malformed(String),
    #[error("'{0}' has more than two fractional digits")]
    TooPrecise(String),
    #[error("'{0}' does not fit in 64-bit minor units")]
    Overflow(String),
}

/// A signed amount in minor units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: i64) -> Self {
        Amount(minor)
    }

    /// Whole major units, e.g. `Amount::from_major(10)` is `10.00`.
    pub const fn from_major(major: i64) -> Self {
        Amount(major.saturating_mul(MINOR_PER_MAJOR))
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Parses `[-]digits[.d[d]]`.
    pub fn parse_decimal(input: &str) -> Result<Self, AmountError> {
        let malformed = || AmountError::Malformed(input.to_string());
        let overflow = || AmountError::Overflow(input.to_string());

        let trimmed = input.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) || (body.contains('.') && frac.is_empty()) {
            return Err(malformed());
        }
        if frac.len() > 2 {
            return Err(AmountError::TooPrecise(input.to_string()));
        }

        let whole: i64 = whole.parse().map_err(|_| overflow())?;
        let mut cents: i64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| malformed())?
        };
        if frac.len() == 1 {
            cents *= 10;
        }
        let minor = whole
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|m| m.checked_add(cents))
            .ok_or_else(overflow)?;
        Ok(Amount(if negative { -minor } else { minor }))
    }

    /// Converts a JSON float. Values that need a third decimal are rejected.
    fn from_f64(value: f64) -> Result<Self, AmountError> {
        let scaled = value * MINOR_PER_MAJOR as f64;
        if !scaled.is_finite() || scaled.abs() > i64::MAX as f64 {
            return Err(AmountError::Overflow(value.to_string()));
        }
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(AmountError::TooPrecise(value.to_string()));
        }
        Ok(Amount(rounded as i64))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR as u64;
        write!(f, "{}{}.{:02}", sign, abs / per, abs % per)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse_decimal(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Decimal number on the wire; at most two fractional digits survive f64.
        serializer.serialize_f64(self.0 as f64 / MINOR_PER_MAJOR as f64)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parsed = match RawAmount::deserialize(deserializer)? {
            RawAmount::Int(major) => major
                .checked_mul(MINOR_PER_MAJOR)
                .map(Amount)
                .ok_or_else(|| AmountError::Overflow(major.to_string())),
            RawAmount::Float(value) => Amount::from_f64(value),
            RawAmount::Text(text) => Amount::parse_decimal(&text),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decimal_forms() {
        assert_eq!(Amount::parse_decimal("10").unwrap().minor(), 1000);
        assert_eq!(Amount::parse_decimal("10.5").unwrap().minor(), 1050);
        assert_eq!(Amount::parse_decimal("10.05").unwrap().minor(), 1005);
        assert_eq!(Amount::parse_decimal("0.01").unwrap().minor(), 1);
        assert_eq!(Amount::parse_decimal("-2.50").unwrap().minor(), -250);
    }

    #[test]
    fn parse_decimal_rejects_garbage() {
        for bad in ["", ".", "1.", ".5", "1.2.3", "abc", "1e3", "--1", "+1"] {
            assert!(
                matches!(Amount::parse_decimal(bad), Err(AmountError::Malformed(_))),
                "{bad:?} should be malformed"
            );
        }
        assert!(matches!(
            Amount::parse_decimal("1.005"),
            Err(AmountError::TooPrecise(_))
        ));
        assert!(matches!(
            Amount::parse_decimal("99999999999999999999"),
            Err(AmountError::Overflow(_))
        ));
    }

    #[test]
    fn display_has_two_decimals() {
        assert_eq!(Amount::from_minor(1000).to_string(), "10.00");
        assert_eq!(Amount::from_minor(5).to_string(), "0.05");
        assert_eq!(Amount::from_minor(-5).to_string(), "-0.05");
        assert_eq!(Amount::from_major(3).to_string(), "3.00");
    }

    #[test]
    fn json_accepts_number_and_string() {
        let a: Amount = serde_json::from_str("10.0").unwrap();
        assert_eq!(a.minor(), 1000);
        let b: Amount = serde_json::from_str("10").unwrap();
        assert_eq!(b.minor(), 1000);
        let c: Amount = serde_json::from_str("\"0.10\"").unwrap();
        assert_eq!(c.minor(), 10);
        let d: Amount = serde_json::from_str("0.1").unwrap();
        assert_eq!(d.minor(), 10);
        assert!(serde_json::from_str::<Amount>("0.125").is_err());
    }

    #[test]
    fn json_emits_number() {
        assert_eq!(serde_json::to_string(&Amount::from_minor(1050)).unwrap(), "10.5");
    }
}
