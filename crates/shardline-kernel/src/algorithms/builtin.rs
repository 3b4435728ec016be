//! # Built-in Sharding Algorithms
//!
//! | Type | Properties | Range support |
//! |------|------------|---------------|
//! | `MOD` | `sharding-count` | enumerated when narrower than the count |
//! | `HASH_MOD` | `sharding-count` | rejected |
//! | `INLINE` | `algorithm-expression`, `allow-range-query` | opt-in, returns all targets |
//! | `VOLUME_RANGE` | `range-lower`, `range-upper`, `sharding-volume` | yes |
//! | `BOUNDARY_RANGE` | `sharding-ranges` | yes |
//!
//! MOD, HASH_MOD and the range algorithms pick targets by their numeric
//! name suffix: partition 1 matches `orders_1` and `ds_1`.

use super::inline_expr::InlineTemplate;
use crate::domain::{
    ConfigError, RoutingError, ShardingAlgorithm, ShardingContext, ShardingValue, Value,
};
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::ops::Bound;
use std::sync::Arc;

/// Algorithm properties as configured.
pub type Props = HashMap<String, String>;

fn prop<'a>(algorithm: &str, props: &'a Props, key: &str) -> Result<&'a str, ConfigError> {
    props
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::InvalidProperty {
            algorithm: algorithm.to_string(),
            property: key.to_string(),
            reason: "missing".to_string(),
        })
}

fn int_prop(algorithm: &str, props: &Props, key: &str) -> Result<i64, ConfigError> {
    let raw = prop(algorithm, props, key)?;
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidProperty {
            algorithm: algorithm.to_string(),
            property: key.to_string(),
            reason: format!("'{raw}' is not an integer"),
        })
}

fn positive_prop(algorithm: &str, props: &Props, key: &str) -> Result<i64, ConfigError> {
    let v = int_prop(algorithm, props, key)?;
    if v <= 0 {
        return Err(ConfigError::InvalidProperty {
            algorithm: algorithm.to_string(),
            property: key.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(v)
}

/// Trailing decimal digits of a target name.
pub fn numeric_suffix(name: &str) -> Option<i64> {
    let digits = name
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

fn targets_with_suffix(targets: &[String], suffixes: &[i64]) -> Vec<String> {
    targets
        .iter()
        .filter(|t| numeric_suffix(t).is_some_and(|s| suffixes.contains(&s)))
        .cloned()
        .collect()
}

fn integer_value(
    algorithm: &str,
    ctx: &ShardingContext<'_>,
    value: &Value,
) -> Result<i64, RoutingError> {
    value.as_i64().ok_or_else(|| RoutingError::IncompatibleValue {
        algorithm: algorithm.to_string(),
        column: ctx.column.to_string(),
        value: value.to_sql_literal(),
    })
}

/// Inclusive integer bounds of a range value.
fn integer_bounds(
    algorithm: &str,
    ctx: &ShardingContext<'_>,
    lower: &Bound<Value>,
    upper: &Bound<Value>,
) -> Result<(Option<i64>, Option<i64>), RoutingError> {
    let lo = match lower {
        Bound::Included(v) => Some(integer_value(algorithm, ctx, v)?),
        Bound::Excluded(v) => Some(integer_value(algorithm, ctx, v)?.saturating_add(1)),
        Bound::Unbounded => None,
    };
    let hi = match upper {
        Bound::Included(v) => Some(integer_value(algorithm, ctx, v)?),
        Bound::Excluded(v) => Some(integer_value(algorithm, ctx, v)?.saturating_sub(1)),
        Bound::Unbounded => None,
    };
    Ok((lo, hi))
}

fn unsupported_range(algorithm: &str, ctx: &ShardingContext<'_>) -> RoutingError {
    RoutingError::UnsupportedOperator {
        table: ctx.logic_table.to_string(),
        column: ctx.column.to_string(),
        algorithm: algorithm.to_string(),
        operator: "range".to_string(),
    }
}

/// `value mod sharding-count`.
#[derive(Debug)]
pub struct ModShardingAlgorithm {
    count: i64,
}

impl ModShardingAlgorithm {
    /// Type name.
    pub const TYPE: &'static str = "MOD";

    /// Build from properties.
    pub fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>, ConfigError> {
        Ok(Arc::new(Self {
            count: positive_prop(Self::TYPE, props, "sharding-count")?,
        }))
    }
}

impl ShardingAlgorithm for ModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(
        &self,
        targets: &[String],
        value: &ShardingValue,
        ctx: &ShardingContext<'_>,
    ) -> Result<Vec<String>, RoutingError> {
        match value {
            ShardingValue::List(values) => {
                let suffixes = values
                    .iter()
                    .map(|v| Ok(integer_value(Self::TYPE, ctx, v)?.rem_euclid(self.count)))
                    .collect::<Result<Vec<_>, RoutingError>>()?;
                Ok(targets_with_suffix(targets, &suffixes))
            }
            ShardingValue::Range { lower, upper } => {
                match integer_bounds(Self::TYPE, ctx, lower, upper)? {
                    (Some(lo), Some(hi)) if hi < lo => Ok(Vec::new()),
                    (Some(lo), Some(hi)) if hi.saturating_sub(lo) < self.count - 1 => {
                        let suffixes: Vec<i64> =
                            (lo..=hi).map(|v| v.rem_euclid(self.count)).collect();
                        Ok(targets_with_suffix(targets, &suffixes))
                    }
                    _ => Ok(targets.to_vec()),
                }
            }
        }
    }
}

/// Keccak-256 of the value, modulo `sharding-count`.
#[derive(Debug)]
pub struct HashModShardingAlgorithm {
    count: u64,
}

impl HashModShardingAlgorithm {
    /// Type name.
    pub const TYPE: &'static str = "HASH_MOD";

    /// Build from properties.
    pub fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>, ConfigError> {
        let count = positive_prop(Self::TYPE, props, "sharding-count")?;
        Ok(Arc::new(Self {
            count: count.unsigned_abs(),
        }))
    }

    /// Partition index of a value.
    pub fn partition(&self, value: &Value) -> i64 {
        let digest = Keccak256::digest(value.canonical_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        // count fits in i64, so the remainder does too
        (u64::from_be_bytes(head) % self.count) as i64
    }
}

impl ShardingAlgorithm for HashModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(
        &self,
        targets: &[String],
        value: &ShardingValue,
        ctx: &ShardingContext<'_>,
    ) -> Result<Vec<String>, RoutingError> {
        match value {
            ShardingValue::List(values) => {
                let suffixes: Vec<i64> = values.iter().map(|v| self.partition(v)).collect();
                Ok(targets_with_suffix(targets, &suffixes))
            }
            ShardingValue::Range { .. } => Err(unsupported_range(Self::TYPE, ctx)),
        }
    }
}

/// Target named by an inline template over the sharding column.
#[derive(Debug)]
pub struct InlineShardingAlgorithm {
    template: InlineTemplate,
    allow_range_query: bool,
}

impl InlineShardingAlgorithm {
    /// Type name.
    pub const TYPE: &'static str = "INLINE";

    /// Build from properties.
    pub fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>, ConfigError> {
        let template = InlineTemplate::compile(prop(Self::TYPE, props, "algorithm-expression")?)?;
        let allow_range_query = props
            .get("allow-range-query")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        Ok(Arc::new(Self {
            template,
            allow_range_query,
        }))
    }
}

impl ShardingAlgorithm for InlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(
        &self,
        targets: &[String],
        value: &ShardingValue,
        ctx: &ShardingContext<'_>,
    ) -> Result<Vec<String>, RoutingError> {
        match value {
            ShardingValue::List(values) => {
                let mut names = Vec::with_capacity(values.len());
                for v in values {
                    let mut bindings = HashMap::new();
                    bindings.insert(ctx.column.to_ascii_lowercase(), v.clone());
                    let name = self.template.render(&bindings).map_err(|e| {
                        RoutingError::IncompatibleValue {
                            algorithm: format!("{} '{}' ({e})", Self::TYPE, self.template.source()),
                            column: ctx.column.to_string(),
                            value: v.to_sql_literal(),
                        }
                    })?;
                    names.push(name);
                }
                Ok(targets
                    .iter()
                    .filter(|t| names.iter().any(|n| n.eq_ignore_ascii_case(t)))
                    .cloned()
                    .collect())
            }
            ShardingValue::Range { .. } if self.allow_range_query => Ok(targets.to_vec()),
            ShardingValue::Range { .. } => Err(unsupported_range(Self::TYPE, ctx)),
        }
    }
}

/// Partitions split at ascending boundaries:
/// `(-inf, b0)`, `[b0, b1)`, ..., `[bn, +inf)`.
#[derive(Debug)]
struct RangePartitions {
    boundaries: Vec<i64>,
}

impl RangePartitions {
    fn partition_of(&self, v: i64) -> i64 {
        self.boundaries.partition_point(|b| *b <= v) as i64
    }

    fn last(&self) -> i64 {
        self.boundaries.len() as i64
    }

    fn do_sharding(
        &self,
        algorithm: &str,
        targets: &[String],
        value: &ShardingValue,
        ctx: &ShardingContext<'_>,
    ) -> Result<Vec<String>, RoutingError> {
        let suffixes: Vec<i64> = match value {
            ShardingValue::List(values) => values
                .iter()
                .map(|v| Ok(self.partition_of(integer_value(algorithm, ctx, v)?)))
                .collect::<Result<_, RoutingError>>()?,
            ShardingValue::Range { lower, upper } => {
                let (lo, hi) = integer_bounds(algorithm, ctx, lower, upper)?;
                if matches!((lo, hi), (Some(lo), Some(hi)) if hi < lo) {
                    return Ok(Vec::new());
                }
                let first = lo.map_or(0, |v| self.partition_of(v));
                let last = hi.map_or(self.last(), |v| self.partition_of(v));
                (first..=last).collect()
            }
        };
        Ok(targets_with_suffix(targets, &suffixes))
    }
}

/// Fixed-width partitions between `range-lower` and `range-upper`.
#[derive(Debug)]
pub struct VolumeRangeShardingAlgorithm {
    partitions: RangePartitions,
}

impl VolumeRangeShardingAlgorithm {
    /// Type name.
    pub const TYPE: &'static str = "VOLUME_RANGE";

    /// Build from properties.
    pub fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>, ConfigError> {
        let lower = int_prop(Self::TYPE, props, "range-lower")?;
        let upper = int_prop(Self::TYPE, props, "range-upper")?;
        let volume = positive_prop(Self::TYPE, props, "sharding-volume")?;
        if upper <= lower {
            return Err(ConfigError::InvalidProperty {
                algorithm: Self::TYPE.to_string(),
                property: "range-upper".to_string(),
                reason: format!("must exceed range-lower {lower}"),
            });
        }
        let mut boundaries = Vec::new();
        let mut b = lower;
        while b < upper {
            boundaries.push(b);
            b = b.saturating_add(volume);
        }
        boundaries.push(upper);
        Ok(Arc::new(Self {
            partitions: RangePartitions { boundaries },
        }))
    }
}

impl ShardingAlgorithm for VolumeRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(
        &self,
        targets: &[String],
        value: &ShardingValue,
        ctx: &ShardingContext<'_>,
    ) -> Result<Vec<String>, RoutingError> {
        self.partitions.do_sharding(Self::TYPE, targets, value, ctx)
    }
}

/// Partitions split at explicit `sharding-ranges` boundaries.
#[derive(Debug)]
pub struct BoundaryRangeShardingAlgorithm {
    partitions: RangePartitions,
}

impl BoundaryRangeShardingAlgorithm {
    /// Type name.
    pub const TYPE: &'static str = "BOUNDARY_RANGE";

    /// Build from properties.
    pub fn create(props: &Props) -> Result<Arc<dyn ShardingAlgorithm>, ConfigError> {
        let raw = prop(Self::TYPE, props, "sharding-ranges")?;
        let mut boundaries = raw
            .split(',')
            .map(|s| {
                s.trim().parse::<i64>().map_err(|_| ConfigError::InvalidProperty {
                    algorithm: Self::TYPE.to_string(),
                    property: "sharding-ranges".to_string(),
                    reason: format!("'{}' is not an integer", s.trim()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        boundaries.sort_unstable();
        boundaries.dedup();
        Ok(Arc::new(Self {
            partitions: RangePartitions { boundaries },
        }))
    }
}

impl ShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(
        &self,
        targets: &[String],
        value: &ShardingValue,
        ctx: &ShardingContext<'_>,
    ) -> Result<Vec<String>, RoutingError> {
        self.partitions.do_sharding(Self::TYPE, targets, value, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ShardingLevel;

    fn ctx() -> ShardingContext<'static> {
        ShardingContext {
            logic_table: "orders",
            column: "user_id",
            level: ShardingLevel::Table,
        }
    }

    fn props(pairs: &[(&str, &str)]) -> Props {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn tables(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("orders_{i}")).collect()
    }

    #[test]
    fn test_numeric_suffix() {
        assert_eq!(numeric_suffix("orders_12"), Some(12));
        assert_eq!(numeric_suffix("ds0"), Some(0));
        assert_eq!(numeric_suffix("orders"), None);
    }

    #[test]
    fn test_mod_equality() {
        let algo = ModShardingAlgorithm::create(&props(&[("sharding-count", "4")])).unwrap();
        let result = algo
            .do_sharding(&tables(4), &ShardingValue::single(37), &ctx())
            .unwrap();
        assert_eq!(result, vec!["orders_1"]);
    }

    #[test]
    fn test_mod_narrow_and_wide_ranges() {
        let algo = ModShardingAlgorithm::create(&props(&[("sharding-count", "4")])).unwrap();
        let narrow = ShardingValue::Range {
            lower: Bound::Included(Value::Int(5)),
            upper: Bound::Excluded(Value::Int(7)),
        };
        assert_eq!(
            algo.do_sharding(&tables(4), &narrow, &ctx()).unwrap(),
            vec!["orders_1", "orders_2"]
        );
        let wide = ShardingValue::Range {
            lower: Bound::Included(Value::Int(0)),
            upper: Bound::Unbounded,
        };
        assert_eq!(algo.do_sharding(&tables(4), &wide, &ctx()).unwrap().len(), 4);
    }

    #[test]
    fn test_mod_rejects_text() {
        let algo = ModShardingAlgorithm::create(&props(&[("sharding-count", "4")])).unwrap();
        let err = algo
            .do_sharding(&tables(4), &ShardingValue::single("abc"), &ctx())
            .unwrap_err();
        assert!(matches!(err, RoutingError::IncompatibleValue { .. }));
    }

    #[test]
    fn test_mod_requires_count() {
        assert!(ModShardingAlgorithm::create(&props(&[])).is_err());
        assert!(ModShardingAlgorithm::create(&props(&[("sharding-count", "0")])).is_err());
    }

    #[test]
    fn test_hash_mod_is_deterministic_single_target() {
        let algo = HashModShardingAlgorithm::create(&props(&[("sharding-count", "4")])).unwrap();
        for v in 0..50 {
            let a = algo
                .do_sharding(&tables(4), &ShardingValue::single(v), &ctx())
                .unwrap();
            let b = algo
                .do_sharding(&tables(4), &ShardingValue::single(v), &ctx())
                .unwrap();
            assert_eq!(a.len(), 1);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_hash_mod_rejects_range() {
        let algo = HashModShardingAlgorithm::create(&props(&[("sharding-count", "4")])).unwrap();
        let range = ShardingValue::Range {
            lower: Bound::Included(Value::Int(1)),
            upper: Bound::Included(Value::Int(2)),
        };
        let err = algo.do_sharding(&tables(4), &range, &ctx()).unwrap_err();
        assert!(matches!(err, RoutingError::UnsupportedOperator { .. }));
    }

    #[test]
    fn test_inline_equality_and_range_policy() {
        let algo =
            InlineShardingAlgorithm::create(&props(&[("algorithm-expression", "orders_${user_id % 4}")]))
                .unwrap();
        assert_eq!(
            algo.do_sharding(&tables(4), &ShardingValue::List(vec![Value::Int(2), Value::Int(6)]), &ctx())
                .unwrap(),
            vec!["orders_2"]
        );
        let range = ShardingValue::Range {
            lower: Bound::Included(Value::Int(1)),
            upper: Bound::Unbounded,
        };
        assert!(algo.do_sharding(&tables(4), &range, &ctx()).is_err());

        let permissive = InlineShardingAlgorithm::create(&props(&[
            ("algorithm-expression", "orders_${user_id % 4}"),
            ("allow-range-query", "true"),
        ]))
        .unwrap();
        assert_eq!(permissive.do_sharding(&tables(4), &range, &ctx()).unwrap().len(), 4);
    }

    #[test]
    fn test_volume_range() {
        let algo = VolumeRangeShardingAlgorithm::create(&props(&[
            ("range-lower", "10"),
            ("range-upper", "40"),
            ("sharding-volume", "10"),
        ]))
        .unwrap();
        let targets = tables(5);
        assert_eq!(
            algo.do_sharding(&targets, &ShardingValue::single(5), &ctx()).unwrap(),
            vec!["orders_0"]
        );
        assert_eq!(
            algo.do_sharding(&targets, &ShardingValue::single(25), &ctx()).unwrap(),
            vec!["orders_2"]
        );
        assert_eq!(
            algo.do_sharding(&targets, &ShardingValue::single(99), &ctx()).unwrap(),
            vec!["orders_4"]
        );
        let range = ShardingValue::Range {
            lower: Bound::Included(Value::Int(15)),
            upper: Bound::Excluded(Value::Int(30)),
        };
        assert_eq!(
            algo.do_sharding(&targets, &range, &ctx()).unwrap(),
            vec!["orders_1", "orders_2"]
        );
    }

    #[test]
    fn test_boundary_range() {
        let algo =
            BoundaryRangeShardingAlgorithm::create(&props(&[("sharding-ranges", "100, 200")]))
                .unwrap();
        let targets = tables(3);
        assert_eq!(
            algo.do_sharding(&targets, &ShardingValue::single(150), &ctx()).unwrap(),
            vec!["orders_1"]
        );
        let range = ShardingValue::Range {
            lower: Bound::Unbounded,
            upper: Bound::Included(Value::Int(100)),
        };
        assert_eq!(
            algo.do_sharding(&targets, &range, &ctx()).unwrap(),
            vec!["orders_0", "orders_1"]
        );
    }

    #[test]
    fn test_boundary_range_over_epoch_seconds() {
        // 2024-01-01, 2024-02-01 and 2024-03-01 UTC.
        let algo = BoundaryRangeShardingAlgorithm::create(&props(&[(
            "sharding-ranges",
            "1704067200, 1706745600, 1709251200",
        )]))
        .unwrap();
        let targets = tables(4);
        assert_eq!(
            algo.do_sharding(&targets, &ShardingValue::single(1_705_000_000), &ctx()).unwrap(),
            vec!["orders_1"]
        );
        let mid_jan_to_mid_feb = ShardingValue::Range {
            lower: Bound::Included(Value::Int(1_705_276_800)),
            upper: Bound::Included(Value::Int(1_707_523_200)),
        };
        assert_eq!(
            algo.do_sharding(&targets, &mid_jan_to_mid_feb, &ctx()).unwrap(),
            vec!["orders_1", "orders_2"]
        );
    }
}
