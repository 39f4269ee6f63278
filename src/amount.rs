use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Fixed-point currency with 2 decimal places, stored as a scaled integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 100;

    /// Build from whole currency units (e.g. `from_major(10_000)` is 10000.00).
    pub fn from_major(value: i64) -> Self {
        Amount(value * Self::SCALE)
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }
}

/// Failure to parse a decimal amount string.
#[derive(Debug, Error)]
#[error("invalid amount '{0}'")]
pub struct ParseAmountError(String);

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ParseAmountError(s.to_string());

        let (sign, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, trimmed),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (digits, ""),
        };
        if (whole.is_empty() && frac.is_empty()) || frac.len() > 2 {
            return Err(err());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| err())?
        };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse().map_err(|_| err())?,
        };

        Ok(Amount(sign * (whole * Self::SCALE + frac)))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_major_scales() {
        assert_eq!(Amount::from_major(10_000), Amount::from_scaled(1_000_000));
        assert_eq!(Amount::from_major(0), Amount::from_scaled(0));
    }

    #[test]
    fn parse_whole_number() {
        assert_eq!("10000".parse::<Amount>().unwrap(), Amount::from_major(10_000));
    }

    #[test]
    fn parse_with_decimals() {
        assert_eq!("1.50".parse::<Amount>().unwrap(), Amount::from_scaled(150));
        assert_eq!("1.5".parse::<Amount>().unwrap(), Amount::from_scaled(150));
        assert_eq!("0.05".parse::<Amount>().unwrap(), Amount::from_scaled(5));
        assert_eq!(".50".parse::<Amount>().unwrap(), Amount::from_scaled(50));
    }

    #[test]
    fn parse_negative() {
        assert_eq!("-50.25".parse::<Amount>().unwrap(), Amount::from_scaled(-5025));
    }

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(" 10 ".parse::<Amount>().unwrap(), Amount::from_major(10));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Amount>().is_err());
        assert!("-".parse::<Amount>().is_err());
        assert!("abc".parse::<Amount>().is_err());
        assert!("1.234".parse::<Amount>().is_err());
        assert!("1.2.3".parse::<Amount>().is_err());
    }

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(Amount::from_major(10_000).to_string(), "10000.00");
        assert_eq!(Amount::from_scaled(150).to_string(), "1.50");
        assert_eq!(Amount::from_scaled(5).to_string(), "0.05");
        assert_eq!(Amount::from_scaled(-5025).to_string(), "-50.25");
    }

    #[test]
    fn display_round_trips_through_parse() {
        for scaled in [0, 1, 99, 100, 12345, -12345, 1_000_000] {
            let amount = Amount::from_scaled(scaled);
            assert_eq!(amount.to_string().parse::<Amount>().unwrap(), amount);
        }
    }

    #[test]
    fn default_is_zero() {
        assert_eq!(Amount::default(), Amount::from_scaled(0));
    }
}
