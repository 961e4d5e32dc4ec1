//! Human-readable byte sizes for configuration values such as `"1MB"`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing number in byte size: {0:?}")]
    MissingNumber(String),

    #[error("Invalid number in byte size: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Unknown byte size unit: {0:?}")]
    UnknownUnit(String),

    #[error("Byte size overflows u64: {0:?}")]
    Overflow(String),
}

/// Binary units, largest first so formatting picks the biggest exact fit.
const UNITS: &[(&str, u64)] = &[
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
];

/// Byte count that deserializes from either an integer or a string like `"256KB"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn kib(n: u64) -> Self {
        ByteSize(n << 10)
    }

    pub const fn mib(n: u64) -> Self {
        ByteSize(n << 20)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);
        if digits.is_empty() {
            return Err(ParseError::MissingNumber(s.to_string()));
        }
        let value: u64 = digits.parse()?;

        let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" | "KIB" => 1 << 10,
            "M" | "MB" | "MIB" => 1 << 20,
            "G" | "GB" | "GIB" => 1 << 30,
            "T" | "TB" | "TIB" => 1 << 40,
            other => return Err(ParseError::UnknownUnit(other.to_string())),
        };

        value
            .checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| ParseError::Overflow(s.to_string()))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &(unit, size) in UNITS {
            if self.0 >= size && self.0 % size == 0 {
                return write!(f, "{}{}", self.0 / size, unit);
            }
        }
        write!(f, "{}B", self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl serde::de::Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte count or a size string such as \"1MB\"")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ByteSize(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom("byte size cannot be negative"))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!("512".parse::<ByteSize>().unwrap(), ByteSize(512));
        assert_eq!("64KB".parse::<ByteSize>().unwrap(), ByteSize::kib(64));
        assert_eq!("1 mb".parse::<ByteSize>().unwrap(), ByteSize::mib(1));
        assert_eq!("2GiB".parse::<ByteSize>().unwrap().as_u64(), 2 << 30);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!("MB".parse::<ByteSize>(), Err(ParseError::MissingNumber(_))));
        assert!(matches!("5XB".parse::<ByteSize>(), Err(ParseError::UnknownUnit(_))));
        assert!(matches!(
            "99999999999TB".parse::<ByteSize>(),
            Err(ParseError::Overflow(_))
        ));
    }

    #[test]
    fn displays_largest_exact_unit() {
        assert_eq!(ByteSize::mib(1).to_string(), "1MB");
        assert_eq!(ByteSize(1536).to_string(), "1536B");
        assert_eq!(ByteSize::kib(1536).to_string(), "1536KB");
    }

    #[test]
    fn deserializes_both_forms() {
        #[derive(Deserialize)]
        struct Limits {
            a: ByteSize,
            b: ByteSize,
        }
        let parsed: Limits = serde_json::from_str(r#"{"a": "256KB", "b": 1024}"#).unwrap();
        assert_eq!(parsed.a, ByteSize::kib(256));
        assert_eq!(parsed.b, ByteSize(1024));
    }
}
