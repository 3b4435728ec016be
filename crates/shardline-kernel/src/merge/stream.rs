//! Row cursors shared by every merge stage.

use crate::domain::{ColumnMetadata, MergeError, Value};
use crate::ports::QueryResult;

/// A source of whole rows. Every merge stage is one, wrapping the stage
/// before it.
pub trait RowCursor: Send {
    /// Full column layout, derived columns included.
    fn columns(&self) -> &[ColumnMetadata];

    /// The next row, or `None` at end of stream.
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, MergeError>;
}

/// One unit's row stream.
pub struct UnitStream {
    unit: usize,
    result: Box<dyn QueryResult>,
    columns: Vec<ColumnMetadata>,
}

impl UnitStream {
    /// Wrap a unit's result.
    pub fn new(unit: usize, result: Box<dyn QueryResult>) -> Self {
        let columns = result.columns().to_vec();
        Self {
            unit,
            result,
            columns,
        }
    }

    /// Index of the producing unit.
    pub fn unit(&self) -> usize {
        self.unit
    }
}

impl RowCursor for UnitStream {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, MergeError> {
        let advanced = self.result.next().map_err(|source| MergeError::Stream {
            unit: self.unit,
            source,
        })?;
        if !advanced {
            return Ok(None);
        }
        let row = (0..self.columns.len())
            .map(|i| self.result.value(i).cloned().unwrap_or_default())
            .collect();
        Ok(Some(row))
    }
}

/// Rows already in memory.
pub struct BufferedRows {
    columns: Vec<ColumnMetadata>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl BufferedRows {
    /// Emit `rows` in order.
    pub fn new(columns: Vec<ColumnMetadata>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }
}

impl RowCursor for BufferedRows {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, MergeError> {
        Ok(self.rows.next())
    }
}

/// Drain a cursor.
pub fn collect_rows(cursor: &mut dyn RowCursor) -> Result<Vec<Vec<Value>>, MergeError> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.next_row()? {
        rows.push(row);
    }
    Ok(rows)
}
