//! Configuration for the sharding kernel.
//!
//! `KernelConfig` tunes the pipeline; `ShardingRuleConfig` describes the
//! logical-to-physical mapping and is turned into an immutable
//! `ShardingRule` by `ShardingRule::from_config`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

/// Execution coordinator settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutorConfig {
    /// Maximum data sources executing at the same time.
    pub max_parallelism: usize,
    /// Per-unit timeout in milliseconds.
    pub unit_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 16,
            unit_timeout_ms: 30_000,
        }
    }
}

/// Result merger settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MergeConfig {
    /// NULLs sort before every other value in ascending order (and after
    /// them in descending order) unless an ORDER BY item says otherwise.
    pub nulls_first: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { nulls_first: true }
    }
}

/// Top-level kernel configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct KernelConfig {
    /// Executor settings.
    pub executor: ExecutorConfig,
    /// Merge settings.
    pub merge: MergeConfig,
    /// Log every rewritten unit.
    pub sql_show: bool,
}

impl KernelConfig {
    /// Short timeouts and SQL logging for tests.
    pub fn for_testing() -> Self {
        Self {
            executor: ExecutorConfig {
                max_parallelism: 4,
                unit_timeout_ms: 1_000,
            },
            merge: MergeConfig::default(),
            sql_show: true,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SHARDLINE_MAX_PARALLELISM`: concurrent data sources (default: 16)
    /// - `SHARDLINE_UNIT_TIMEOUT_MS`: per-unit timeout (default: 30000)
    /// - `SHARDLINE_NULLS_FIRST`: NULLs sort first ascending (default: true)
    /// - `SHARDLINE_SQL_SHOW`: log rewritten SQL (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            executor: ExecutorConfig {
                max_parallelism: env::var("SHARDLINE_MAX_PARALLELISM")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(defaults.executor.max_parallelism),
                unit_timeout_ms: env::var("SHARDLINE_UNIT_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.executor.unit_timeout_ms),
            },
            merge: MergeConfig {
                nulls_first: env::var("SHARDLINE_NULLS_FIRST")
                    .map(|v| v.to_lowercase() != "false" && v != "0")
                    .unwrap_or(defaults.merge.nulls_first),
            },
            sql_show: env::var("SHARDLINE_SQL_SHOW")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.sql_show),
        }
    }
}

/// A named algorithm definition.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AlgorithmConfig {
    /// Registered type name.
    #[serde(rename = "type")]
    pub kind: String,
    /// String properties.
    #[serde(default)]
    pub props: HashMap<String, String>,
}

impl AlgorithmConfig {
    /// Definition with properties.
    pub fn new(kind: &str, props: &[(&str, &str)]) -> Self {
        Self {
            kind: kind.to_string(),
            props: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// How a level (database or table) is sharded.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// One column, one algorithm.
    Standard {
        /// Sharding column.
        column: String,
        /// Algorithm name.
        algorithm: String,
    },
    /// Several columns through one algorithm.
    Complex {
        /// Sharding columns.
        columns: Vec<String>,
        /// Algorithm name.
        algorithm: String,
    },
    /// Values come only from hints.
    Hint {
        /// Algorithm name.
        algorithm: String,
    },
    /// Not sharded at this level.
    None,
}

impl StrategyConfig {
    /// Standard strategy.
    pub fn standard(column: &str, algorithm: &str) -> Self {
        Self::Standard {
            column: column.to_string(),
            algorithm: algorithm.to_string(),
        }
    }
}

/// Generated-key column of a table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeyGenerateConfig {
    /// Column receiving generated values.
    pub column: String,
    /// Key generator name.
    pub generator: String,
}

/// One sharded logic table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TableRuleConfig {
    /// Logic table name.
    pub logic_table: String,
    /// Inline expression such as `ds_${0..1}.orders_${0..3}`. When absent,
    /// the table lives under its own name on every data source.
    #[serde(default)]
    pub actual_data_nodes: Option<String>,
    /// Database-level strategy (falls back to the default).
    #[serde(default)]
    pub database_strategy: Option<StrategyConfig>,
    /// Table-level strategy (falls back to the default).
    #[serde(default)]
    pub table_strategy: Option<StrategyConfig>,
    /// Generated key.
    #[serde(default)]
    pub key_generate: Option<KeyGenerateConfig>,
}

impl TableRuleConfig {
    /// Table rule with data nodes and no strategies.
    pub fn new(logic_table: &str, actual_data_nodes: &str) -> Self {
        Self {
            logic_table: logic_table.to_string(),
            actual_data_nodes: Some(actual_data_nodes.to_string()),
            database_strategy: None,
            table_strategy: None,
            key_generate: None,
        }
    }

    /// Builder: database strategy.
    pub fn with_database_strategy(mut self, strategy: StrategyConfig) -> Self {
        self.database_strategy = Some(strategy);
        self
    }

    /// Builder: table strategy.
    pub fn with_table_strategy(mut self, strategy: StrategyConfig) -> Self {
        self.table_strategy = Some(strategy);
        self
    }

    /// Builder: generated key.
    pub fn with_key_generate(mut self, column: &str, generator: &str) -> Self {
        self.key_generate = Some(KeyGenerateConfig {
            column: column.to_string(),
            generator: generator.to_string(),
        });
        self
    }
}

/// Complete sharding rule description.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ShardingRuleConfig {
    /// Data source names, in order.
    pub data_sources: Vec<String>,
    /// Sharded tables.
    #[serde(default)]
    pub tables: Vec<TableRuleConfig>,
    /// Groups of logic tables sharing identical partitioning.
    #[serde(default)]
    pub binding_groups: Vec<Vec<String>>,
    /// Tables replicated to every data source.
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    /// Data source for unsharded tables.
    #[serde(default)]
    pub default_data_source: Option<String>,
    /// Fallback database strategy.
    #[serde(default)]
    pub default_database_strategy: Option<StrategyConfig>,
    /// Fallback table strategy.
    #[serde(default)]
    pub default_table_strategy: Option<StrategyConfig>,
    /// Sharding algorithm definitions by name.
    #[serde(default)]
    pub algorithms: HashMap<String, AlgorithmConfig>,
    /// Key generator definitions by name.
    #[serde(default)]
    pub key_generators: HashMap<String, AlgorithmConfig>,
}

impl ShardingRuleConfig {
    /// Empty rule over the given data sources.
    pub fn new(data_sources: &[&str]) -> Self {
        Self {
            data_sources: data_sources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Builder: add a table.
    pub fn table(mut self, table: TableRuleConfig) -> Self {
        self.tables.push(table);
        self
    }

    /// Builder: define an algorithm.
    pub fn algorithm(mut self, name: &str, config: AlgorithmConfig) -> Self {
        self.algorithms.insert(name.to_string(), config);
        self
    }

    /// Builder: define a key generator.
    pub fn key_generator(mut self, name: &str, config: AlgorithmConfig) -> Self {
        self.key_generators.insert(name.to_string(), config);
        self
    }

    /// Builder: add a binding group.
    pub fn binding_group(mut self, tables: &[&str]) -> Self {
        self.binding_groups
            .push(tables.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Builder: add a broadcast table.
    pub fn broadcast_table(mut self, table: &str) -> Self {
        self.broadcast_tables.push(table.to_string());
        self
    }

    /// Builder: default data source.
    pub fn default_data_source(mut self, name: &str) -> Self {
        self.default_data_source = Some(name.to_string());
        self
    }
}
