//! Shared fixtures for the pipeline tests.

#![allow(dead_code)]

use shardline_kernel::domain::{Span, TableSegment, TimeSource};
use shardline_kernel::{
    AlgorithmConfig, AlgorithmRegistry, KeyGeneratorEnv, KeyGeneratorRegistry, ShardingRule,
    ShardingRuleConfig, StrategyConfig, TableRuleConfig,
};
use std::sync::Arc;

/// A clock stuck at one instant.
#[derive(Debug)]
pub struct FixedClock(pub u64);

impl TimeSource for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0
    }
}

/// Sharding rule used across the scenarios.
///
/// - `orders`: `ds_0.orders_${0..3}`, table by `orders_${user_id % 4}`
/// - `t_user`: `ds_0.t_user_${0..3}`, table by HASH_MOD 4 on `user_id`
/// - `t_order`: `ds_${0..1}.t_order`, database by MOD 2 on a generated
///   Snowflake `order_id`
pub fn rule() -> Arc<ShardingRule> {
    let config = ShardingRuleConfig::new(&["ds_0", "ds_1"])
        .table(
            TableRuleConfig::new("orders", "ds_0.orders_${0..3}")
                .with_table_strategy(StrategyConfig::standard("user_id", "orders_inline")),
        )
        .table(
            TableRuleConfig::new("t_user", "ds_0.t_user_${0..3}")
                .with_table_strategy(StrategyConfig::standard("user_id", "user_hash")),
        )
        .table(
            TableRuleConfig::new("t_order", "ds_${0..1}.t_order")
                .with_database_strategy(StrategyConfig::standard("order_id", "ds_mod"))
                .with_key_generate("order_id", "snowflake"),
        )
        .algorithm(
            "orders_inline",
            AlgorithmConfig::new("INLINE", &[("algorithm-expression", "orders_${user_id % 4}")]),
        )
        .algorithm(
            "user_hash",
            AlgorithmConfig::new("HASH_MOD", &[("sharding-count", "4")]),
        )
        .algorithm("ds_mod", AlgorithmConfig::new("MOD", &[("sharding-count", "2")]))
        .key_generator("snowflake", AlgorithmConfig::new("SNOWFLAKE", &[]))
        .default_data_source("ds_0");

    let key_generators = KeyGeneratorRegistry::with_builtins(KeyGeneratorEnv {
        time_source: Arc::new(FixedClock(1_700_000_000_000)),
        worker_id: 1,
    });
    Arc::new(
        ShardingRule::from_config(&config, &AlgorithmRegistry::with_builtins(), &key_generators)
            .expect("valid rule"),
    )
}

/// Span of the `nth` occurrence of `needle`.
pub fn span_nth(sql: &str, needle: &str, nth: usize) -> Span {
    let (start, _) = sql
        .match_indices(needle)
        .nth(nth)
        .unwrap_or_else(|| panic!("'{needle}' #{nth} not in '{sql}'"));
    Span::new(start, start + needle.len())
}

/// Span of the first occurrence of `needle`.
pub fn span(sql: &str, needle: &str) -> Span {
    span_nth(sql, needle, 0)
}

/// Table segment for the first occurrence of `name` as a whole word.
pub fn table(sql: &str, name: &str) -> TableSegment {
    let start = sql
        .match_indices(name)
        .map(|(i, _)| i)
        .find(|&i| {
            let before = sql[..i].chars().last();
            let after = sql[i + name.len()..].chars().next();
            let boundary = |c: Option<char>| !c.is_some_and(|c| c.is_alphanumeric() || c == '_');
            boundary(before) && boundary(after)
        })
        .unwrap_or_else(|| panic!("table '{name}' not in '{sql}'"));
    TableSegment::new(name, Span::new(start, start + name.len()))
}
