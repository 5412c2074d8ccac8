//! Core type definitions for PetalStore.

use petalstore_codec::Value;
use std::fmt;

/// Schema version of a database.
///
/// A database that was never created is at version 0; the first open
/// creates it at version 1 or higher. Versions only ever grow.
pub type DatabaseVersion = u64;

/// A primary or secondary index key.
///
/// Only integers, text and byte strings can be keys. Floats with an
/// integral value (what JSON-shaped records carry for ids) are normalised to
/// integers, so `7.0` and `7` address the same record. Any other float,
/// such as a price of `9.99`, is never a key: a record whose indexed field
/// holds one is stored but left out of that index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Integer key.
    Integer(i64),
    /// Text key.
    Text(String),
    /// Byte string key.
    Bytes(Vec<u8>),
}

impl Key {
    /// Extracts a key from a document value.
    ///
    /// Returns `None` for values that cannot be keys.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(n) => Some(Self::Integer(*n)),
            Value::Text(s) => Some(Self::Text(s.clone())),
            Value::Bytes(b) => Some(Self::Bytes(b.clone())),
            Value::Float(f) if is_integral(*f) => Some(Self::Integer(*f as i64)),
            _ => None,
        }
    }

    /// Converts the key back into a document value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Integer(n) => Value::Integer(*n),
            Self::Text(s) => Value::Text(s.clone()),
            Self::Bytes(b) => Value::Bytes(b.clone()),
        }
    }
}

fn is_integral(f: f64) -> bool {
    // i64::MAX as f64 rounds up to 2^63, which is out of range.
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                f.write_str("0x")?;
                b.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only; shares the database with other readers.
    ReadOnly,
    /// Reads and writes; holds the database exclusively until it ends.
    ReadWrite,
}
