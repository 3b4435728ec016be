//! Post-merge stages: DISTINCT, then pagination.

use super::stream::RowCursor;
use crate::domain::{ColumnMetadata, MergeError, PaginationSpec, Value};
use std::collections::HashSet;

/// Drops rows whose visible columns were already emitted.
pub struct DistinctStage {
    inner: Box<dyn RowCursor>,
    visible: usize,
    seen: HashSet<Vec<Value>>,
}

impl DistinctStage {
    /// Deduplicate on the first `visible` columns.
    pub fn new(inner: Box<dyn RowCursor>, visible: usize) -> Self {
        Self {
            inner,
            visible,
            seen: HashSet::new(),
        }
    }
}

impl RowCursor for DistinctStage {
    fn columns(&self) -> &[ColumnMetadata] {
        self.inner.columns()
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, MergeError> {
        while let Some(row) = self.inner.next_row()? {
            let key: Vec<Value> = row.iter().take(self.visible).cloned().collect();
            if self.seen.insert(key) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

/// Applies the statement's real offset and row count.
pub struct PaginationStage {
    inner: Box<dyn RowCursor>,
    skip: u64,
    remaining: Option<u64>,
}

impl PaginationStage {
    /// Wrap `inner`.
    pub fn new(inner: Box<dyn RowCursor>, pagination: PaginationSpec) -> Self {
        Self {
            inner,
            skip: pagination.offset,
            remaining: pagination.row_count,
        }
    }
}

impl RowCursor for PaginationStage {
    fn columns(&self) -> &[ColumnMetadata] {
        self.inner.columns()
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, MergeError> {
        while self.skip > 0 {
            if self.inner.next_row()?.is_none() {
                self.skip = 0;
                return Ok(None);
            }
            self.skip -= 1;
        }
        match self.remaining {
            Some(0) => Ok(None),
            Some(n) => {
                let row = self.inner.next_row()?;
                if row.is_some() {
                    self.remaining = Some(n - 1);
                }
                Ok(row)
            }
            None => self.inner.next_row(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::stream::{collect_rows, BufferedRows};

    fn numbers(values: &[i64]) -> Box<dyn RowCursor> {
        Box::new(BufferedRows::new(
            vec![ColumnMetadata::new("v"), ColumnMetadata::new("ORDER_BY_DERIVED_0")],
            values
                .iter()
                .enumerate()
                .map(|(i, v)| vec![Value::Int(*v), Value::Int(i as i64)])
                .collect(),
        ))
    }

    fn firsts(rows: Vec<Vec<Value>>) -> Vec<i64> {
        rows.iter().filter_map(|r| r[0].as_i64()).collect()
    }

    #[test]
    fn test_distinct_ignores_derived_columns() {
        let mut stage = DistinctStage::new(numbers(&[1, 1, 2, 1, 3, 2]), 1);
        assert_eq!(firsts(collect_rows(&mut stage).unwrap()), vec![1, 2, 3]);
    }

    #[test]
    fn test_pagination() {
        let page = |offset, row_count| {
            let mut stage =
                PaginationStage::new(numbers(&[0, 1, 2, 3, 4, 5]), PaginationSpec { offset, row_count });
            firsts(collect_rows(&mut stage).unwrap())
        };
        assert_eq!(page(2, Some(3)), vec![2, 3, 4]);
        assert_eq!(page(0, None), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(page(4, None), vec![4, 5]);
        assert!(page(10, Some(3)).is_empty());
        assert!(page(0, Some(0)).is_empty());
    }
}
