//! # Shardline Kernel
//!
//! Transparent SQL sharding: one logical statement in, one logical result
//! out, with the physical fan-out in between.
//!
//! ## Pipeline
//!
//! ```text
//! ParsedStatement + params
//!        │
//!        ▼
//!   route    ── which (data source, actual table) units?
//!        ▼
//!   rewrite  ── per-unit SQL and parameters, derived columns, over-fetch
//!        ▼
//!   execute  ── concurrent per data source, per-unit timeout, cancellation
//!        ▼
//!   merge    ── pass-through, iterator, order-by, group-by, then DISTINCT
//!        │      and pagination
//!        ▼
//!   MergedResult / affected rows
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! shardline-kernel/
//! ├── domain/        # Values, statement model, rule, routes, errors
//! ├── algorithms/    # Built-in sharding algorithms, key generators, registries
//! ├── route/         # Condition extraction and the routing engine
//! ├── rewrite/       # SQL tokens, rewrite plan, SQL assembly
//! ├── execute/       # Execution coordinator and cancellation
//! ├── merge/         # Result merger and its stages
//! ├── ports/         # Inbound API and data-source port
//! ├── adapters/      # In-memory data sources
//! └── application/   # ShardingKernel service
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod execute;
pub mod merge;
pub mod ports;
pub mod rewrite;
pub mod route;

// Re-exports
pub use adapters::{InMemoryDataSources, MemoryQueryResult};
pub use algorithms::{AlgorithmRegistry, KeyGeneratorEnv, KeyGeneratorRegistry};
pub use application::ShardingKernel;
pub use config::{
    AlgorithmConfig, ExecutorConfig, KernelConfig, MergeConfig, ShardingRuleConfig,
    StrategyConfig, TableRuleConfig,
};
pub use domain::{
    ColumnMetadata, ConfigError, DataSourceError, ExecutionError, ExecutionUnit,
    ExecutionUnitError, KernelError, MergeError, ParsedStatement, RewriteError, RouteContext,
    RouteKind, RoutingError, ShardingAlgorithm, ShardingRule, SqlStatement, Value,
};
pub use execute::{CancelHandle, CancelSignal, ExecutionCoordinator};
pub use merge::{drain, MergeMode, MergedResult, ResultMerger};
pub use ports::{DataSourceExecutor, QueryResult, ShardingKernelApi, UnitOutput};
pub use rewrite::RewriteEngine;
pub use route::RoutingEngine;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
