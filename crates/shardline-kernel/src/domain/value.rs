//! # Cell Values
//!
//! The single value type that flows through sharding keys, bound
//! parameters and result rows.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A SQL cell or parameter value.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// Character data.
    Text(String),
}

impl Value {
    /// Is this SQL NULL?
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view, accepting integral floats and numeric text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view for numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical bytes used for hashing a sharding value.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Self::Null => Vec::new(),
            Self::Bool(b) => vec![u8::from(*b)],
            Self::Int(v) => v.to_be_bytes().to_vec(),
            Self::Float(v) if v.fract() == 0.0 => (*v as i64).to_be_bytes().to_vec(),
            Self::Float(v) => v.to_be_bytes().to_vec(),
            Self::Text(s) => s.as_bytes().to_vec(),
        }
    }

    /// Render as a SQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// Total order over non-null values. Numbers compare numerically across
    /// Int and Float; otherwise values order by kind, then by content.
    /// NULL placement is decided by the caller.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Int(a), Self::Float(b)) => int_float_cmp(*a, *b),
            (Self::Float(a), Self::Int(b)) => int_float_cmp(*b, *a).reverse(),
            // -0.0 equals 0.0; NaN falls back to the IEEE total order.
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::Text(_) => 3,
        }
    }
}

/// 2^63, the first float past `i64::MAX`.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer against a float, without rounding the
/// integer through f64.
fn int_float_cmp(a: i64, b: f64) -> Ordering {
    if b.is_nan() {
        return (a as f64).total_cmp(&b);
    }
    if b >= I64_LIMIT {
        return Ordering::Less;
    }
    if b < -I64_LIMIT {
        return Ordering::Greater;
    }
    let whole = b.trunc();
    match a.cmp(&(whole as i64)) {
        Ordering::Equal if b > whole => Ordering::Less,
        Ordering::Equal if b < whole => Ordering::Greater,
        ord => ord,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with `eq`: integral floats hash like the integer.
        match self {
            Self::Null => 0u8.hash(state),
            Self::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Self::Int(v) => {
                2u8.hash(state);
                v.hash(state);
            }
            Self::Float(v) if v.fract() == 0.0 && *v >= -I64_LIMIT && *v < I64_LIMIT => {
                2u8.hash(state);
                (*v as i64).hash(state);
            }
            Self::Float(v) => {
                2u8.hash(state);
                v.to_bits().hash(state);
            }
            Self::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_sql_literal()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_numeric_compare_across_kinds() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Float(3.0), Value::Int(3));
    }

    #[test]
    fn test_hash_agrees_with_eq() {
        let mut set = HashSet::new();
        set.insert(Value::Int(7));
        assert!(set.contains(&Value::Float(7.0)));
        assert!(!set.contains(&Value::Text("7".into())));
    }

    #[test]
    fn test_large_integers_compare_exactly_against_floats() {
        let float = Value::Float(9_007_199_254_740_992.0); // 2^53
        let above = Value::Int(9_007_199_254_740_993);
        assert_ne!(above, float);
        assert_eq!(above.compare(&float), Ordering::Greater);
        assert_eq!(float.compare(&above), Ordering::Less);
        assert_eq!(Value::Int(9_007_199_254_740_992), float);

        assert_eq!(Value::Int(i64::MAX).compare(&Value::Float(I64_LIMIT)), Ordering::Less);
        assert_eq!(Value::Int(i64::MIN), Value::Float(-I64_LIMIT));
        assert_eq!(Value::Int(-3).compare(&Value::Float(-2.5)), Ordering::Less);
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));

        let mut set = HashSet::new();
        set.insert(float.clone());
        assert!(!set.contains(&above));
        set.insert(above.clone());
        assert_eq!(set.len(), 2);
        set.insert(Value::Int(i64::MIN));
        assert!(set.contains(&Value::Float(-I64_LIMIT)));
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(Value::from("o'neil").to_sql_literal(), "'o''neil'");
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(Value::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(Value::Float(1.5).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }
}
