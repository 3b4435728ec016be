//! # Route Module
//!
//! Sharding-condition extraction and the routing engine.

pub mod condition;
pub mod engine;

pub use condition::{extract, ColumnCondition, ConditionGroup, ShardingConditions, MAX_CONDITION_GROUPS};
pub use engine::RoutingEngine;
