//! In-Memory Data Sources
//!
//! Implements `DataSourceExecutor` over fixture rows keyed by
//! `(data source, actual table)`. No SQL is interpreted except a trailing
//! `LIMIT n [OFFSET m]`, so fixtures hold each node's rows already in the
//! order the statement asks for.
//!
//! Failures, delays and broken streams can be injected per node.

use crate::domain::{ColumnMetadata, DataSourceError, ExecutionUnit, Value};
use crate::ports::{DataSourceExecutor, QueryResult, UnitOutput};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Rows held in memory.
#[derive(Clone, Debug)]
pub struct MemoryQueryResult {
    columns: Vec<ColumnMetadata>,
    rows: Vec<Vec<Value>>,
    cursor: Option<usize>,
    fail_at: Option<usize>,
}

impl MemoryQueryResult {
    /// Result with labelled columns.
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| ColumnMetadata::new(*c)).collect(),
            rows,
            cursor: None,
            fail_at: None,
        }
    }

    /// Fail when advancing onto row `row`.
    pub fn failing_at(mut self, row: usize) -> Self {
        self.fail_at = Some(row);
        self
    }
}

impl QueryResult for MemoryQueryResult {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool, DataSourceError> {
        let next = self.cursor.map_or(0, |c| c + 1);
        if self.fail_at == Some(next) {
            return Err(DataSourceError::Stream(format!("stream broke at row {next}")));
        }
        if next < self.rows.len() {
            self.cursor = Some(next);
            Ok(true)
        } else {
            self.cursor = Some(self.rows.len());
            Ok(false)
        }
    }

    fn value(&self, index: usize) -> Option<&Value> {
        self.cursor
            .and_then(|c| self.rows.get(c))
            .and_then(|row| row.get(index))
    }
}

/// A connection handed out by `InMemoryDataSources`.
#[derive(Debug)]
pub struct MemoryConnection {
    /// Unique per acquisition.
    pub id: u64,
    /// Data source it belongs to.
    pub data_source: String,
}

/// One unit as the data source saw it.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutedUnit {
    /// Unit index.
    pub index: usize,
    /// Data source.
    pub data_source: String,
    /// Connection used.
    pub connection: u64,
    /// SQL text.
    pub sql: String,
    /// Parameters.
    pub parameters: Vec<Value>,
}

#[derive(Default)]
struct State {
    fixtures: HashMap<(String, String), MemoryQueryResult>,
    affected: HashMap<(String, String), u64>,
    failures: HashMap<(String, String), DataSourceError>,
    broken_connections: HashSet<String>,
    delays: HashMap<String, Duration>,
    executed: Vec<ExecutedUnit>,
    cancelled: Vec<usize>,
    released: Vec<u64>,
}

/// In-memory data sources for tests and local runs.
#[derive(Default)]
pub struct InMemoryDataSources {
    state: RwLock<State>,
    connections: AtomicU64,
}

fn key(data_source: &str, table: &str) -> (String, String) {
    (data_source.to_string(), table.to_ascii_lowercase())
}

impl InMemoryDataSources {
    /// No fixtures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows a node returns for queries.
    pub fn with_rows(
        self,
        data_source: &str,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.set_result(data_source, table, MemoryQueryResult::new(columns, rows));
        self
    }

    /// Replace the result a node returns for queries.
    pub fn set_result(&self, data_source: &str, table: &str, result: MemoryQueryResult) {
        self.state
            .write()
            .fixtures
            .insert(key(data_source, table), result);
    }

    /// Update count a node returns for mutations.
    pub fn set_affected(&self, data_source: &str, table: &str, affected: u64) {
        self.state
            .write()
            .affected
            .insert(key(data_source, table), affected);
    }

    /// Make every statement on a node fail.
    pub fn fail_on(&self, data_source: &str, table: &str, message: &str) {
        self.state.write().failures.insert(
            key(data_source, table),
            DataSourceError::Statement(message.to_string()),
        );
    }

    /// Make connection acquisition fail.
    pub fn break_connection(&self, data_source: &str) {
        self.state
            .write()
            .broken_connections
            .insert(data_source.to_string());
    }

    /// Delay every statement on a data source.
    pub fn delay(&self, data_source: &str, delay: Duration) {
        self.state
            .write()
            .delays
            .insert(data_source.to_string(), delay);
    }

    /// Units submitted so far, in submission order.
    pub fn executed(&self) -> Vec<ExecutedUnit> {
        self.state.read().executed.clone()
    }

    /// Indices of cancelled units.
    pub fn cancelled(&self) -> Vec<usize> {
        self.state.read().cancelled.clone()
    }

    /// Connections acquired so far.
    pub fn acquired(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Ids of released connections.
    pub fn released(&self) -> Vec<u64> {
        self.state.read().released.clone()
    }
}

/// Apply a trailing `LIMIT n [OFFSET m]`; `?` operands take the trailing
/// parameters in order.
fn apply_limit(sql: &str, parameters: &[Value], rows: &mut Vec<Vec<Value>>) {
    let upper = sql.to_ascii_uppercase();
    let Some(at) = upper.rfind(" LIMIT ") else {
        return;
    };
    let words: Vec<&str> = sql[at + 7..].split_whitespace().collect();
    let placeholders = words.iter().filter(|w| **w == "?").count();
    let mut trailing = parameters
        .iter()
        .skip(parameters.len().saturating_sub(placeholders));
    let mut operand = |word: &str| -> Option<usize> {
        if word == "?" {
            trailing
                .next()
                .and_then(Value::as_i64)
                .and_then(|n| usize::try_from(n).ok())
        } else {
            word.parse().ok()
        }
    };

    let limit = words.first().and_then(|w| operand(w));
    let offset = match (words.get(1), words.get(2)) {
        (Some(kw), Some(w)) if kw.eq_ignore_ascii_case("OFFSET") => operand(w).unwrap_or(0),
        _ => 0,
    };
    let kept: Vec<Vec<Value>> = rows
        .drain(..)
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    *rows = kept;
}

#[async_trait]
impl DataSourceExecutor for InMemoryDataSources {
    type Connection = MemoryConnection;

    async fn acquire(&self, data_source: &str) -> Result<MemoryConnection, DataSourceError> {
        if self.state.read().broken_connections.contains(data_source) {
            return Err(DataSourceError::Connection {
                data_source: data_source.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let id = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(data_source, connection = id, "Connection acquired");
        Ok(MemoryConnection {
            id,
            data_source: data_source.to_string(),
        })
    }

    async fn execute(
        &self,
        connection: &mut MemoryConnection,
        unit: &ExecutionUnit,
    ) -> Result<UnitOutput, DataSourceError> {
        let table = unit
            .route_unit
            .table_mappers
            .first()
            .map(|m| m.actual_table.clone())
            .unwrap_or_default();
        let node = key(unit.data_source(), &table);

        let delay = {
            let mut state = self.state.write();
            state.executed.push(ExecutedUnit {
                index: unit.index,
                data_source: unit.data_source().to_string(),
                connection: connection.id,
                sql: unit.sql.clone(),
                parameters: unit.parameters.clone(),
            });
            state.delays.get(unit.data_source()).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.read();
        if let Some(error) = state.failures.get(&node) {
            return Err(error.clone());
        }
        let is_query = unit.sql.trim_start().to_ascii_uppercase().starts_with("SELECT");
        if !is_query {
            let affected = state.affected.get(&node).copied().unwrap_or_else(|| {
                unit.route_unit.insert_rows.len().max(1) as u64
            });
            return Ok(UnitOutput::Affected(affected));
        }

        let mut result = state
            .fixtures
            .get(&node)
            .cloned()
            .unwrap_or_else(|| MemoryQueryResult::new(&[], Vec::new()));
        apply_limit(&unit.sql, &unit.parameters, &mut result.rows);
        Ok(UnitOutput::Rows(Box::new(result)))
    }

    async fn cancel(&self, unit: &ExecutionUnit) {
        debug!(unit = unit.index, data_source = unit.data_source(), "Unit cancelled");
        self.state.write().cancelled.push(unit.index);
    }

    async fn release(&self, connection: MemoryConnection) {
        self.state.write().released.push(connection.id);
    }
}
