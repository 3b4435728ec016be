//! # Algorithms
//!
//! Built-in sharding algorithms, key generators, inline expressions and the
//! registries that name them.

pub mod builtin;
pub mod inline_expr;
pub mod key_generator;
pub mod registry;

pub use builtin::{
    numeric_suffix, BoundaryRangeShardingAlgorithm, HashModShardingAlgorithm,
    InlineShardingAlgorithm, ModShardingAlgorithm, Props, VolumeRangeShardingAlgorithm,
};
pub use inline_expr::{expand_inline, EvalError, InlineTemplate};
pub use key_generator::{SnowflakeKeyGenerator, SystemTimeSource, UuidKeyGenerator};
pub use registry::{
    AlgorithmFactory, AlgorithmRegistry, KeyGeneratorEnv, KeyGeneratorFactory,
    KeyGeneratorRegistry,
};
