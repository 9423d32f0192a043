//! Cell values.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A single cell value.
///
/// Every protobuf scalar decodes into one of these variants: integer
/// encodings widen to [`Value::Int64`], `uint64`/`fixed64` values above
/// `i64::MAX` become [`Value::UInt64`], and both floating point encodings
/// widen to [`Value::Float64`]. Build unsigned values with `Value::from(u64)`
/// so that every integer has exactly one representation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL, or a field absent from the document.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// Unsigned integer above `i64::MAX`.
    UInt64(u64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    String(Arc<str>),
    /// Raw bytes.
    Bytes(Arc<[u8]>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the boolean payload, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Self::Int64(i) => Some(*i),
            Self::UInt64(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Returns the integer payload widened to `i128`, if any.
    #[must_use]
    pub fn as_int128(&self) -> Option<i128> {
        match self {
            Self::Int64(i) => Some(i128::from(*i)),
            Self::UInt64(u) => Some(i128::from(*u)),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    #[must_use]
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Self::Float64(f) => Some(*f),
            Self::Int64(i) => Some(*i as f64),
            Self::UInt64(u) => Some(*u as f64),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the byte payload, if any.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns a short name for the variant, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int64(_) | Self::UInt64(_) => "integer",
            Self::Float64(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Compares two values with SQL semantics.
    ///
    /// Returns `None` when either side is NULL or the types are not
    /// comparable. Integers compare exactly whatever their sign, and
    /// integers against floats compare as floats.
    #[must_use]
    pub fn sql_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Int64(_) | Self::UInt64(_), Self::Int64(_) | Self::UInt64(_)) => {
                Some(self.as_int128()?.cmp(&other.as_int128()?))
            }
            (
                Self::Int64(_) | Self::UInt64(_) | Self::Float64(_),
                Self::Int64(_) | Self::UInt64(_) | Self::Float64(_),
            ) => {
                self.as_float64()?.partial_cmp(&other.as_float64()?)
            }
            (Self::String(a), Self::String(b)) => Some(a.as_ref().cmp(b.as_ref())),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.as_ref().cmp(b.as_ref())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::UInt64(u) => write!(f, "{u}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => {
                for byte in b.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(Self::UInt64(u), Self::Int64)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int64(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float64(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_numeric_comparison_widens() {
        assert_eq!(
            Value::Int64(3).sql_cmp(&Value::Float64(2.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::Float64(3.0).sql_cmp(&Value::Int64(3)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_unsigned_above_signed_range() {
        let big = Value::from(u64::MAX);
        assert_eq!(big, Value::UInt64(u64::MAX));
        assert_eq!(Value::from(7u64), Value::Int64(7));
        assert_eq!(big.sql_cmp(&Value::Int64(0)), Some(Ordering::Greater));
        assert_eq!(big.sql_cmp(&Value::Int64(-1)), Some(Ordering::Greater));
        assert_eq!(Value::Int64(i64::MAX).sql_cmp(&big), Some(Ordering::Less));
        assert_eq!(big.sql_cmp(&Value::Float64(1.0)), Some(Ordering::Greater));
        assert_eq!(big.as_int64(), None);
        assert_eq!(big.to_string(), "18446744073709551615");
    }

    #[test]
    fn test_null_is_incomparable() {
        assert_eq!(Value::Null.sql_cmp(&Value::Int64(1)), None);
        assert_eq!(Value::Null.sql_cmp(&Value::Null), None);
    }

    #[test]
    fn test_mismatched_types_are_incomparable() {
        assert_eq!(Value::from("1").sql_cmp(&Value::Int64(1)), None);
        assert_eq!(Value::Bool(true).sql_cmp(&Value::Int64(1)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("abc").to_string(), "abc");
        assert_eq!(Value::Bytes(vec![0xde, 0xad].into()).to_string(), "dead");
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn test_serde_roundtrip_keeps_variant() {
        let json = serde_json::to_string(&Value::from("x")).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::from("x"));
    }

    fn integer() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<u64>().prop_map(Value::from),
            (-3i64..3).prop_map(Value::from),
        ]
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            integer(),
            any::<f64>().prop_map(Value::from),
            "[ab]{0,2}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            Just(Value::Null),
        ]
    }

    proptest! {
        #[test]
        fn prop_integer_order_is_numeric(a in integer(), b in integer()) {
            let exact = a.as_int128().unwrap().cmp(&b.as_int128().unwrap());
            prop_assert_eq!(a.sql_cmp(&b), Some(exact));
        }

        #[test]
        fn prop_comparison_is_antisymmetric(a in scalar(), b in scalar()) {
            prop_assert_eq!(a.sql_cmp(&b), b.sql_cmp(&a).map(Ordering::reverse));
        }

        #[test]
        fn prop_integer_order_is_transitive(a in integer(), b in integer(), c in integer()) {
            let le = |x: &Value, y: &Value| x.sql_cmp(y) != Some(Ordering::Greater);
            if le(&a, &b) && le(&b, &c) {
                prop_assert!(le(&a, &c));
            }
        }

        #[test]
        fn prop_equal_integers_are_identical(a in integer(), b in integer()) {
            prop_assert_eq!(a.sql_cmp(&b) == Some(Ordering::Equal), a == b);
        }
    }
}
