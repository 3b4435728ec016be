//! # Outbound Ports
//!
//! The connection/execution capability the kernel consumes. Drivers,
//! pools and dialect codecs live behind these traits.

use crate::domain::{ColumnMetadata, DataSourceError, ExecutionUnit, Value};
use async_trait::async_trait;

/// Forward-only cursor over one unit's rows.
pub trait QueryResult: Send {
    /// Column metadata, available before the first `next()`.
    fn columns(&self) -> &[ColumnMetadata];

    /// Advance to the next row; `false` at end of stream.
    fn next(&mut self) -> Result<bool, DataSourceError>;

    /// Value of a column in the current row.
    fn value(&self, index: usize) -> Option<&Value>;
}

/// What executing one unit produced.
pub enum UnitOutput {
    /// A row stream.
    Rows(Box<dyn QueryResult>),
    /// An update count.
    Affected(u64),
}

impl std::fmt::Debug for UnitOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rows(rows) => f
                .debug_struct("Rows")
                .field("columns", &rows.columns().len())
                .finish(),
            Self::Affected(n) => f.debug_tuple("Affected").field(n).finish(),
        }
    }
}

/// Data-source executor - outbound port.
///
/// One connection serves every unit of a data source within a statement,
/// sequentially. Distinct data sources are driven concurrently.
#[async_trait]
pub trait DataSourceExecutor: Send + Sync {
    /// Connection handle.
    type Connection: Send + 'static;

    /// Acquire a connection to a data source.
    async fn acquire(&self, data_source: &str) -> Result<Self::Connection, DataSourceError>;

    /// Execute one unit on a connection.
    async fn execute(
        &self,
        connection: &mut Self::Connection,
        unit: &ExecutionUnit,
    ) -> Result<UnitOutput, DataSourceError>;

    /// Ask the node to abandon an in-flight unit.
    async fn cancel(&self, unit: &ExecutionUnit);

    /// Return a connection.
    async fn release(&self, connection: Self::Connection);
}
