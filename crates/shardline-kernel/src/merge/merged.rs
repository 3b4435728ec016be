//! The caller-facing merged cursor.

use super::stream::RowCursor;
use crate::domain::{ColumnMetadata, MergeError, Value};

/// How the unit streams were combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MergeMode {
    /// A single stream, forwarded as is.
    PassThrough,
    /// Streams concatenated in unit order.
    Iterator,
    /// Heap merge on ORDER BY.
    OrderBy,
    /// Heap merge on the group key, folding consecutive groups.
    StreamGroupBy,
    /// Buffered grouping.
    MemoryGroupBy,
}

impl MergeMode {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::Iterator => "iterator",
            Self::OrderBy => "order_by",
            Self::StreamGroupBy => "stream_group_by",
            Self::MemoryGroupBy => "memory_group_by",
        }
    }
}

/// Forward-only cursor over a statement's merged rows.
///
/// Behaves like the result set of the same statement against a single
/// unsharded database. Columns added by the rewrite are not visible.
pub trait MergedResult: Send {
    /// Visible column metadata.
    fn columns(&self) -> &[ColumnMetadata];

    /// Move to the next row; `false` once exhausted.
    fn advance(&mut self) -> Result<bool, MergeError>;

    /// Value of a visible column in the current row.
    fn value(&self, index: usize) -> Result<&Value, MergeError>;
}

/// `MergedResult` over a stack of merge stages.
pub struct MergedRows {
    cursor: Box<dyn RowCursor>,
    visible: usize,
    mode: MergeMode,
    current: Option<Vec<Value>>,
    exhausted: bool,
}

impl MergedRows {
    /// Expose the first `visible` columns of `cursor`.
    pub fn new(cursor: Box<dyn RowCursor>, visible: usize, mode: MergeMode) -> Self {
        let visible = visible.min(cursor.columns().len());
        Self {
            cursor,
            visible,
            mode,
            current: None,
            exhausted: false,
        }
    }

    /// Merge mode chosen for the statement.
    pub fn mode(&self) -> MergeMode {
        self.mode
    }
}

impl MergedResult for MergedRows {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.cursor.columns()[..self.visible]
    }

    fn advance(&mut self) -> Result<bool, MergeError> {
        if self.exhausted {
            return Ok(false);
        }
        self.current = self.cursor.next_row()?;
        self.exhausted = self.current.is_none();
        Ok(!self.exhausted)
    }

    fn value(&self, index: usize) -> Result<&Value, MergeError> {
        let row = self.current.as_ref().ok_or(MergeError::NoCurrentRow)?;
        if index >= self.visible {
            return Err(MergeError::ColumnOutOfRange {
                index,
                count: self.visible,
            });
        }
        row.get(index).ok_or(MergeError::ColumnOutOfRange {
            index,
            count: self.visible,
        })
    }
}

/// Read every remaining row's visible values.
pub fn drain(result: &mut dyn MergedResult) -> Result<Vec<Vec<Value>>, MergeError> {
    let width = result.columns().len();
    let mut rows = Vec::new();
    while result.advance()? {
        let row = (0..width)
            .map(|i| result.value(i).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::stream::BufferedRows;

    fn merged() -> MergedRows {
        let cursor = BufferedRows::new(
            vec![ColumnMetadata::new("v"), ColumnMetadata::new("AVG_DERIVED_COUNT_0")],
            vec![vec![Value::Int(1), Value::Int(9)], vec![Value::Int(2), Value::Int(9)]],
        );
        MergedRows::new(Box::new(cursor), 1, MergeMode::Iterator)
    }

    #[test]
    fn test_hides_derived_columns() {
        let mut rows = merged();
        assert_eq!(rows.columns(), &[ColumnMetadata::new("v")]);
        assert_eq!(rows.value(0), Err(MergeError::NoCurrentRow));
        assert!(rows.advance().unwrap());
        assert_eq!(rows.value(0), Ok(&Value::Int(1)));
        assert_eq!(
            rows.value(1),
            Err(MergeError::ColumnOutOfRange { index: 1, count: 1 })
        );
    }

    #[test]
    fn test_stays_exhausted() {
        let mut rows = merged();
        assert_eq!(drain(&mut rows).unwrap().len(), 2);
        assert!(!rows.advance().unwrap());
        assert!(!rows.advance().unwrap());
        assert_eq!(rows.mode(), MergeMode::Iterator);
    }
}
