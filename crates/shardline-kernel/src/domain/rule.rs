//! # Sharding Rule
//!
//! Immutable logical-to-physical mapping. Built once from a
//! `ShardingRuleConfig` and shared read-only (behind `Arc`) by every
//! concurrent routing call.

use super::errors::ConfigError;
use super::sharding::{KeyGenerator, ShardingAlgorithm};
use crate::algorithms::{expand_inline, AlgorithmRegistry, KeyGeneratorRegistry};
use crate::config::{ShardingRuleConfig, StrategyConfig, TableRuleConfig};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// One physical table: `data_source.table`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataNode {
    /// Data source name.
    pub data_source: String,
    /// Actual table name.
    pub table: String,
}

impl DataNode {
    /// Create a node.
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    /// Parse `ds.table`.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        match text.trim().split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() => Ok(Self::new(ds, table)),
            _ => Err(ConfigError::InvalidExpression {
                expression: text.to_string(),
                reason: "data node must be 'data_source.table'".to_string(),
            }),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

/// How one level picks its targets.
#[derive(Clone, Debug)]
pub enum ShardingStrategy {
    /// One column through one algorithm.
    Standard {
        /// Sharding column (lowercase).
        column: String,
        /// Algorithm.
        algorithm: Arc<dyn ShardingAlgorithm>,
    },
    /// Each column resolved independently, results unioned.
    Complex {
        /// Sharding columns (lowercase).
        columns: Vec<String>,
        /// Algorithm.
        algorithm: Arc<dyn ShardingAlgorithm>,
    },
    /// Values come only from hints.
    Hint {
        /// Algorithm.
        algorithm: Arc<dyn ShardingAlgorithm>,
    },
    /// Every target.
    None,
}

impl ShardingStrategy {
    /// Columns this strategy reads from predicates.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Standard { column, .. } => vec![column.as_str()],
            Self::Complex { columns, .. } => columns.iter().map(String::as_str).collect(),
            Self::Hint { .. } | Self::None => Vec::new(),
        }
    }

    /// Algorithm, if any.
    pub fn algorithm(&self) -> Option<&Arc<dyn ShardingAlgorithm>> {
        match self {
            Self::Standard { algorithm, .. }
            | Self::Complex { algorithm, .. }
            | Self::Hint { algorithm } => Some(algorithm),
            Self::None => None,
        }
    }

    /// Does this level never prune?
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Generated-key column binding.
#[derive(Clone, Debug)]
pub struct KeyGenerateRule {
    /// Column name (lowercase).
    pub column: String,
    /// Generator.
    pub generator: Arc<dyn KeyGenerator>,
}

/// Rule for one sharded logic table.
#[derive(Clone, Debug)]
pub struct TableRule {
    /// Logic table (lowercase).
    pub logic_table: String,
    /// Actual data nodes in configured order.
    pub data_nodes: Vec<DataNode>,
    /// Database-level strategy.
    pub database_strategy: ShardingStrategy,
    /// Table-level strategy.
    pub table_strategy: ShardingStrategy,
    /// Generated key, if configured.
    pub key_generate: Option<KeyGenerateRule>,
}

impl TableRule {
    /// Data sources in first-appearance order.
    pub fn data_sources(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.data_nodes
            .iter()
            .filter(|n| seen.insert(n.data_source.as_str()))
            .map(|n| n.data_source.clone())
            .collect()
    }

    /// Actual tables on one data source, in configured order.
    pub fn tables_in(&self, data_source: &str) -> Vec<String> {
        self.data_nodes
            .iter()
            .filter(|n| n.data_source == data_source)
            .map(|n| n.table.clone())
            .collect()
    }

    /// Every column either strategy reads.
    pub fn sharding_columns(&self) -> Vec<&str> {
        let mut cols = self.database_strategy.columns();
        for c in self.table_strategy.columns() {
            if !cols.contains(&c) {
                cols.push(c);
            }
        }
        cols
    }

    /// Index of a node in the configured list.
    pub fn position_of(&self, data_source: &str, table: &str) -> Option<usize> {
        self.data_nodes
            .iter()
            .position(|n| n.data_source == data_source && n.table.eq_ignore_ascii_case(table))
    }
}

/// Complete immutable sharding rule.
#[derive(Clone, Debug)]
pub struct ShardingRule {
    data_sources: Vec<String>,
    tables: HashMap<String, TableRule>,
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: HashSet<String>,
    default_data_source: Option<String>,
}

fn resolve_strategy(
    config: Option<&StrategyConfig>,
    algorithms: &HashMap<String, Arc<dyn ShardingAlgorithm>>,
) -> Result<ShardingStrategy, ConfigError> {
    let lookup = |name: &str| {
        algorithms
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownAlgorithm(name.to_string()))
    };
    Ok(match config {
        None | Some(StrategyConfig::None) => ShardingStrategy::None,
        Some(StrategyConfig::Standard { column, algorithm }) => ShardingStrategy::Standard {
            column: column.to_ascii_lowercase(),
            algorithm: lookup(algorithm)?,
        },
        Some(StrategyConfig::Complex { columns, algorithm }) => ShardingStrategy::Complex {
            columns: columns.iter().map(|c| c.to_ascii_lowercase()).collect(),
            algorithm: lookup(algorithm)?,
        },
        Some(StrategyConfig::Hint { algorithm }) => ShardingStrategy::Hint {
            algorithm: lookup(algorithm)?,
        },
    })
}

impl ShardingRule {
    /// Validate a configuration and build the rule.
    pub fn from_config(
        config: &ShardingRuleConfig,
        algorithms: &AlgorithmRegistry,
        key_generators: &KeyGeneratorRegistry,
    ) -> Result<Self, ConfigError> {
        let mut instances = HashMap::new();
        for (name, def) in &config.algorithms {
            instances.insert(name.clone(), algorithms.create(&def.kind, &def.props)?);
        }
        let mut generators = HashMap::new();
        for (name, def) in &config.key_generators {
            generators.insert(
                name.to_ascii_lowercase(),
                key_generators.create(&def.kind, &def.props)?,
            );
        }

        let known_ds: HashSet<&str> = config.data_sources.iter().map(String::as_str).collect();
        if let Some(ds) = &config.default_data_source {
            if !known_ds.contains(ds.as_str()) {
                return Err(ConfigError::UnknownDataSource {
                    table: "<default>".to_string(),
                    data_source: ds.clone(),
                });
            }
        }

        let mut tables = HashMap::new();
        for table in &config.tables {
            let rule = Self::build_table(
                table,
                config,
                &known_ds,
                &instances,
                &generators,
                key_generators,
            )?;
            tables.insert(rule.logic_table.clone(), rule);
        }

        let binding_groups: Vec<Vec<String>> = config
            .binding_groups
            .iter()
            .map(|g| g.iter().map(|t| t.to_ascii_lowercase()).collect())
            .collect();
        for group in &binding_groups {
            Self::validate_binding_group(group, &tables)?;
        }

        let rule = Self {
            data_sources: config.data_sources.clone(),
            tables,
            binding_groups,
            broadcast_tables: config
                .broadcast_tables
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            default_data_source: config.default_data_source.clone(),
        };

        info!(
            data_sources = rule.data_sources.len(),
            sharded_tables = rule.tables.len(),
            binding_groups = rule.binding_groups.len(),
            broadcast_tables = rule.broadcast_tables.len(),
            "Sharding rule loaded"
        );
        Ok(rule)
    }

    fn build_table(
        table: &TableRuleConfig,
        config: &ShardingRuleConfig,
        known_ds: &HashSet<&str>,
        algorithms: &HashMap<String, Arc<dyn ShardingAlgorithm>>,
        generators: &HashMap<String, Arc<dyn KeyGenerator>>,
        key_generators: &KeyGeneratorRegistry,
    ) -> Result<TableRule, ConfigError> {
        let logic_table = table.logic_table.to_ascii_lowercase();
        let data_nodes = match &table.actual_data_nodes {
            Some(expr) => expand_inline(expr)?
                .iter()
                .map(|n| DataNode::parse(n))
                .collect::<Result<Vec<_>, _>>()?,
            None => config
                .data_sources
                .iter()
                .map(|ds| DataNode::new(ds.clone(), logic_table.clone()))
                .collect(),
        };
        if data_nodes.is_empty() {
            return Err(ConfigError::NoDataNodes(logic_table));
        }
        if let Some(node) = data_nodes
            .iter()
            .find(|n| !known_ds.contains(n.data_source.as_str()))
        {
            return Err(ConfigError::UnknownDataSource {
                table: logic_table,
                data_source: node.data_source.clone(),
            });
        }

        let database_strategy = resolve_strategy(
            table
                .database_strategy
                .as_ref()
                .or(config.default_database_strategy.as_ref()),
            algorithms,
        )?;
        let table_strategy = resolve_strategy(
            table
                .table_strategy
                .as_ref()
                .or(config.default_table_strategy.as_ref()),
            algorithms,
        )?;

        let key_generate = match &table.key_generate {
            Some(kg) => {
                let generator = match generators.get(&kg.generator.to_ascii_lowercase()) {
                    Some(g) => g.clone(),
                    // Undeclared names fall back to a builtin type of that name.
                    None => key_generators.create(&kg.generator, &HashMap::new())?,
                };
                Some(KeyGenerateRule {
                    column: kg.column.to_ascii_lowercase(),
                    generator,
                })
            }
            None => None,
        };

        Ok(TableRule {
            logic_table,
            data_nodes,
            database_strategy,
            table_strategy,
            key_generate,
        })
    }

    fn validate_binding_group(
        group: &[String],
        tables: &HashMap<String, TableRule>,
    ) -> Result<(), ConfigError> {
        let rules = group
            .iter()
            .map(|name| {
                tables
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownTable(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let Some((first, rest)) = rules.split_first() else {
            return Ok(());
        };
        for other in rest {
            if first.data_nodes.len() != other.data_nodes.len() {
                return Err(ConfigError::MisalignedBinding {
                    left: first.logic_table.clone(),
                    right: other.logic_table.clone(),
                    reason: format!(
                        "{} vs {} data nodes",
                        first.data_nodes.len(),
                        other.data_nodes.len()
                    ),
                });
            }
            let same_sources = first
                .data_nodes
                .iter()
                .zip(&other.data_nodes)
                .all(|(a, b)| a.data_source == b.data_source);
            if !same_sources {
                return Err(ConfigError::MisalignedBinding {
                    left: first.logic_table.clone(),
                    right: other.logic_table.clone(),
                    reason: "data sources differ by position".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Rule for a sharded logic table.
    pub fn table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.tables.get(&logic_table.to_ascii_lowercase())
    }

    /// Is the table sharded?
    pub fn is_sharded(&self, logic_table: &str) -> bool {
        self.table_rule(logic_table).is_some()
    }

    /// Is the table replicated to every data source?
    pub fn is_broadcast(&self, logic_table: &str) -> bool {
        self.broadcast_tables
            .contains(&logic_table.to_ascii_lowercase())
    }

    /// Index of the binding group containing the table.
    pub fn binding_group_of(&self, logic_table: &str) -> Option<usize> {
        let name = logic_table.to_ascii_lowercase();
        self.binding_groups.iter().position(|g| g.contains(&name))
    }

    /// Are both tables in the same binding group?
    pub fn are_bound(&self, left: &str, right: &str) -> bool {
        match (self.binding_group_of(left), self.binding_group_of(right)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Configured data sources.
    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    /// Data source for unsharded tables.
    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlgorithmConfig;

    fn orders_config() -> ShardingRuleConfig {
        ShardingRuleConfig::new(&["ds_0", "ds_1"])
            .table(
                TableRuleConfig::new("orders", "ds_${0..1}.orders_${0..1}")
                    .with_database_strategy(StrategyConfig::standard("user_id", "db_mod"))
                    .with_table_strategy(StrategyConfig::standard("order_id", "t_mod"))
                    .with_key_generate("order_id", "snowflake"),
            )
            .table(
                TableRuleConfig::new("order_item", "ds_${0..1}.order_item_${0..1}")
                    .with_database_strategy(StrategyConfig::standard("user_id", "db_mod"))
                    .with_table_strategy(StrategyConfig::standard("order_id", "t_mod")),
            )
            .algorithm("db_mod", AlgorithmConfig::new("MOD", &[("sharding-count", "2")]))
            .algorithm("t_mod", AlgorithmConfig::new("MOD", &[("sharding-count", "2")]))
            .binding_group(&["orders", "order_item"])
            .broadcast_table("t_config")
            .default_data_source("ds_0")
    }

    fn build(config: &ShardingRuleConfig) -> Result<ShardingRule, ConfigError> {
        ShardingRule::from_config(
            config,
            &AlgorithmRegistry::with_builtins(),
            &KeyGeneratorRegistry::default(),
        )
    }

    #[test]
    fn test_build_orders_rule() {
        let rule = build(&orders_config()).unwrap();
        let orders = rule.table_rule("ORDERS").unwrap();
        assert_eq!(orders.data_nodes.len(), 4);
        assert_eq!(orders.data_nodes[1], DataNode::new("ds_0", "orders_1"));
        assert_eq!(orders.data_sources(), vec!["ds_0", "ds_1"]);
        assert_eq!(orders.tables_in("ds_1"), vec!["orders_0", "orders_1"]);
        assert_eq!(orders.sharding_columns(), vec!["user_id", "order_id"]);
        assert!(orders.key_generate.is_some());
        assert!(rule.are_bound("orders", "order_item"));
        assert!(rule.is_broadcast("t_config"));
        assert!(!rule.is_sharded("t_config"));
        assert_eq!(rule.default_data_source(), Some("ds_0"));
    }

    #[test]
    fn test_nodes_default_to_every_data_source() {
        let config = ShardingRuleConfig::new(&["ds_0", "ds_1"]).table(TableRuleConfig {
            logic_table: "users".into(),
            actual_data_nodes: None,
            database_strategy: None,
            table_strategy: None,
            key_generate: None,
        });
        let rule = build(&config).unwrap();
        let users = rule.table_rule("users").unwrap();
        assert_eq!(
            users.data_nodes,
            vec![DataNode::new("ds_0", "users"), DataNode::new("ds_1", "users")]
        );
        assert!(users.database_strategy.is_none());
    }

    #[test]
    fn test_default_strategy_fallback() {
        let mut config = ShardingRuleConfig::new(&["ds_0"])
            .table(TableRuleConfig::new("t", "ds_0.t_${0..3}"))
            .algorithm("m", AlgorithmConfig::new("MOD", &[("sharding-count", "4")]));
        config.default_table_strategy = Some(StrategyConfig::standard("id", "m"));
        let rule = build(&config).unwrap();
        assert_eq!(rule.table_rule("t").unwrap().table_strategy.columns(), vec!["id"]);
    }

    #[test]
    fn test_unknown_algorithm_reference() {
        let config = ShardingRuleConfig::new(&["ds_0"]).table(
            TableRuleConfig::new("t", "ds_0.t_0")
                .with_table_strategy(StrategyConfig::standard("id", "missing")),
        );
        assert_eq!(
            build(&config).unwrap_err(),
            ConfigError::UnknownAlgorithm("missing".into())
        );
    }

    #[test]
    fn test_unknown_data_source() {
        let config = ShardingRuleConfig::new(&["ds_0"]).table(TableRuleConfig::new("t", "ds_9.t_0"));
        assert!(matches!(
            build(&config),
            Err(ConfigError::UnknownDataSource { .. })
        ));
    }

    #[test]
    fn test_misaligned_binding_group() {
        let config = ShardingRuleConfig::new(&["ds_0", "ds_1"])
            .table(TableRuleConfig::new("a", "ds_${0..1}.a_${0..1}"))
            .table(TableRuleConfig::new("b", "ds_0.b_${0..3}"))
            .binding_group(&["a", "b"]);
        assert!(matches!(
            build(&config),
            Err(ConfigError::MisalignedBinding { .. })
        ));

        let config = ShardingRuleConfig::new(&["ds_0"])
            .table(TableRuleConfig::new("a", "ds_0.a_0"))
            .binding_group(&["a", "ghost"]);
        assert_eq!(
            build(&config).unwrap_err(),
            ConfigError::UnknownTable("ghost".into())
        );
    }

    #[test]
    fn test_data_node_parse() {
        assert_eq!(
            DataNode::parse("ds_0.orders_1").unwrap().to_string(),
            "ds_0.orders_1"
        );
        assert!(DataNode::parse("orders_1").is_err());
    }
}
