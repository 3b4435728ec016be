//! # Sharding Capabilities
//!
//! Traits for the pluggable pieces of a rule: sharding algorithms, key
//! generators and the clock the key generators read.

use super::errors::{KeyGenerationError, RoutingError};
use super::value::Value;
use std::fmt::Debug;
use std::ops::Bound;

/// Value extracted for one sharding column.
#[derive(Clone, Debug, PartialEq)]
pub enum ShardingValue {
    /// Discrete values (`=`, `IN`, hints, insert values).
    List(Vec<Value>),
    /// A range (`<`, `>=`, `BETWEEN`, ...).
    Range {
        /// Lower bound.
        lower: Bound<Value>,
        /// Upper bound.
        upper: Bound<Value>,
    },
}

impl ShardingValue {
    /// Single discrete value.
    pub fn single(value: impl Into<Value>) -> Self {
        Self::List(vec![value.into()])
    }

    /// Operator description for error messages.
    pub fn operator(&self) -> &'static str {
        match self {
            Self::List(_) => "equality",
            Self::Range { .. } => "range",
        }
    }
}

/// Which level a strategy resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardingLevel {
    /// Picks data sources.
    Database,
    /// Picks actual tables.
    Table,
}

/// What the algorithm is being asked about.
#[derive(Clone, Copy, Debug)]
pub struct ShardingContext<'a> {
    /// Logic table.
    pub logic_table: &'a str,
    /// Sharding column (empty for hint strategies).
    pub column: &'a str,
    /// Level being resolved.
    pub level: ShardingLevel,
}

/// A pure mapping from sharding values to target names.
///
/// Implementations return a subset of `targets`; names not in `targets` are
/// dropped by the router.
pub trait ShardingAlgorithm: Send + Sync + Debug {
    /// Registered type name (`MOD`, `HASH_MOD`, ...).
    fn type_name(&self) -> &'static str;

    /// Resolve `value` against the available `targets`.
    fn do_sharding(
        &self,
        targets: &[String],
        value: &ShardingValue,
        ctx: &ShardingContext<'_>,
    ) -> Result<Vec<String>, RoutingError>;
}

/// Source of wall-clock milliseconds.
pub trait TimeSource: Send + Sync + Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Produces values for a table's generated-key column.
pub trait KeyGenerator: Send + Sync + Debug {
    /// Registered type name.
    fn type_name(&self) -> &'static str;

    /// Next key.
    fn generate(&self) -> Result<Value, KeyGenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_names() {
        assert_eq!(ShardingValue::single(1).operator(), "equality");
        let range = ShardingValue::Range {
            lower: Bound::Included(Value::Int(1)),
            upper: Bound::Unbounded,
        };
        assert_eq!(range.operator(), "range");
    }
}
