//! Iterator merge: streams drained one after another, in unit order.

use super::stream::{RowCursor, UnitStream};
use crate::domain::{ColumnMetadata, MergeError, Value};
use std::collections::VecDeque;

/// Concatenation of unit streams.
pub struct IteratorMerge {
    columns: Vec<ColumnMetadata>,
    streams: VecDeque<UnitStream>,
}

impl IteratorMerge {
    /// Streams must already be in unit order.
    pub fn new(columns: Vec<ColumnMetadata>, streams: Vec<UnitStream>) -> Self {
        Self {
            columns,
            streams: streams.into(),
        }
    }
}

impl RowCursor for IteratorMerge {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, MergeError> {
        while let Some(stream) = self.streams.front_mut() {
            if let Some(row) = stream.next_row()? {
                return Ok(Some(row));
            }
            self.streams.pop_front();
        }
        Ok(None)
    }
}
