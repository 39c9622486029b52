//! Storage capacity values
//!
//! Capacities use the Kubernetes quantity notation (`10Gi`, `500Mi`, `1T`).
//! Only plain integer amounts are accepted; a claim must request more than zero bytes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SUFFIXES: &[(&str, u128)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// A positive storage size, kept in the notation it was written in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capacity {
    amount: u64,
    suffix: &'static str,
}

impl Capacity {
    /// Size in bytes
    pub fn bytes(&self) -> u128 {
        let multiplier = SUFFIXES
            .iter()
            .find(|(s, _)| *s == self.suffix)
            .map(|(_, m)| *m)
            .unwrap_or(1);
        self.amount as u128 * multiplier
    }
}

/// Reason a capacity string was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvalidCapacity(pub String);

impl FromStr for Capacity {
    type Err = InvalidCapacity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits_end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, rest) = trimmed.split_at(digits_end);

        if digits.is_empty() {
            return Err(InvalidCapacity(format!(
                "'{}' does not start with a number",
                s
            )));
        }

        let amount: u64 = digits
            .parse()
            .map_err(|_| InvalidCapacity(format!("'{}' is out of range", s)))?;

        let suffix = if rest.is_empty() {
            ""
        } else {
            SUFFIXES
                .iter()
                .find(|(suffix, _)| *suffix == rest)
                .map(|(suffix, _)| *suffix)
                .ok_or_else(|| InvalidCapacity(format!("unknown unit '{}' in '{}'", rest, s)))?
        };

        if amount == 0 {
            return Err(InvalidCapacity(format!("'{}' must be greater than zero", s)));
        }

        Ok(Self { amount, suffix })
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.suffix)
    }
}

impl Serialize for Capacity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Capacity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binary_suffix() {
        let capacity: Capacity = "10Gi".parse().unwrap();
        assert_eq!(capacity.to_string(), "10Gi");
        assert_eq!(capacity.bytes(), 10 * (1 << 30));
    }

    #[test]
    fn test_parse_plain_bytes() {
        let capacity: Capacity = "2048".parse().unwrap();
        assert_eq!(capacity.bytes(), 2048);
    }

    #[test]
    fn test_rejects_zero() {
        let err = "0Gi".parse::<Capacity>().unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
        assert_eq!(err.to_string(), err.0);
    }

    #[test]
    fn test_rejects_unknown_unit() {
        assert!("10GB".parse::<Capacity>().is_err());
        assert!("Gi".parse::<Capacity>().is_err());
        assert!("".parse::<Capacity>().is_err());
        assert!("-5Gi".parse::<Capacity>().is_err());
    }
}
