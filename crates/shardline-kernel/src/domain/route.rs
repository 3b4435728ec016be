//! # Route Artifacts
//!
//! What the routing engine produces and the rewrite engine consumes. Scoped
//! to a single statement execution.

use super::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logic table to actual table binding inside one route unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableMapper {
    /// Logic table (lowercase).
    pub logic_table: String,
    /// Actual table.
    pub actual_table: String,
}

impl TableMapper {
    /// Create a mapper.
    pub fn new(logic_table: impl Into<String>, actual_table: impl Into<String>) -> Self {
        Self {
            logic_table: logic_table.into(),
            actual_table: actual_table.into(),
        }
    }
}

/// One physical destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUnit {
    /// Data source name.
    pub data_source: String,
    /// Table bindings on that data source.
    pub table_mappers: Vec<TableMapper>,
    /// INSERT rows (by index) sent to this unit. Empty for other statements.
    pub insert_rows: Vec<usize>,
}

impl RouteUnit {
    /// Unit with mappers.
    pub fn new(data_source: impl Into<String>, table_mappers: Vec<TableMapper>) -> Self {
        Self {
            data_source: data_source.into(),
            table_mappers,
            insert_rows: Vec::new(),
        }
    }

    /// Actual table bound to a logic table here.
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.table_mappers
            .iter()
            .find(|m| m.logic_table.eq_ignore_ascii_case(logic_table))
            .map(|m| m.actual_table.as_str())
    }

    /// Identity used for uniqueness: data source plus every actual table.
    pub fn identity(&self) -> (String, Vec<String>) {
        (
            self.data_source.clone(),
            self.table_mappers
                .iter()
                .map(|m| m.actual_table.to_ascii_lowercase())
                .collect(),
        )
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables: Vec<&str> = self
            .table_mappers
            .iter()
            .map(|m| m.actual_table.as_str())
            .collect();
        write!(f, "{}[{}]", self.data_source, tables.join(","))
    }
}

/// How the route was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteKind {
    /// No sharded table: the default data source.
    Default,
    /// Pruned to exactly one unit.
    Single,
    /// Pruned to several units.
    Pruned,
    /// At least one table could not be pruned, or the statement targets
    /// every node by nature (DDL, broadcast writes).
    Broadcast,
    /// Non-aligned join expanded to the product of combinations.
    Cartesian,
}

impl RouteKind {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Single => "single",
            Self::Pruned => "pruned",
            Self::Broadcast => "broadcast",
            Self::Cartesian => "cartesian",
        }
    }
}

/// Keys generated for an INSERT whose key column was omitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedKey {
    /// Key column.
    pub column: String,
    /// One value per INSERT row.
    pub values: Vec<Value>,
}

/// Routing result for one statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteContext {
    /// Units in deterministic order.
    pub units: Vec<RouteUnit>,
    /// Classification.
    pub kind: RouteKind,
    /// Generated INSERT keys.
    pub generated_key: Option<GeneratedKey>,
}

impl RouteContext {
    /// Context without generated keys.
    pub fn new(units: Vec<RouteUnit>, kind: RouteKind) -> Self {
        Self {
            units,
            kind,
            generated_key: None,
        }
    }

    /// Exactly one unit?
    pub fn is_single_unit(&self) -> bool {
        self.units.len() == 1
    }

    /// Distinct data sources in unit order.
    pub fn data_sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !out.contains(&unit.data_source.as_str()) {
                out.push(unit.data_source.as_str());
            }
        }
        out
    }
}

/// A route unit with its rewritten SQL and parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    /// Position in the statement's unit list; results are keyed by it.
    pub index: usize,
    /// Destination.
    pub route_unit: RouteUnit,
    /// Rewritten SQL.
    pub sql: String,
    /// Rewritten parameters.
    pub parameters: Vec<Value>,
}

impl ExecutionUnit {
    /// Data source name.
    pub fn data_source(&self) -> &str {
        &self.route_unit.data_source
    }
}
