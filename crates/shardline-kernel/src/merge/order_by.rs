//! # Order-By Merge
//!
//! K-way merge of individually sorted streams. A binary heap holds the
//! current row of every live stream; each emitted row costs O(log N).
//!
//! Rows that compare equal come out in stream (unit) order, so the output
//! is fully determined by the input streams and the comparator.

use super::comparator::RowComparator;
use super::stream::{RowCursor, UnitStream};
use crate::domain::{ColumnMetadata, MergeError, Value};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

struct Head {
    row: Vec<Value>,
    stream: usize,
    comparator: Arc<RowComparator>,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    // BinaryHeap is a max-heap: the smallest row must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare(&self.row, &other.row)
            .then(self.stream.cmp(&other.stream))
            .reverse()
    }
}

/// Globally ordered merge of sorted streams.
pub struct OrderByMerge {
    columns: Vec<ColumnMetadata>,
    streams: Vec<UnitStream>,
    comparator: Arc<RowComparator>,
    heap: BinaryHeap<Head>,
    primed: bool,
}

impl OrderByMerge {
    /// Streams must each be sorted by `comparator`.
    pub fn new(
        columns: Vec<ColumnMetadata>,
        streams: Vec<UnitStream>,
        comparator: RowComparator,
    ) -> Self {
        let heap = BinaryHeap::with_capacity(streams.len());
        Self {
            columns,
            streams,
            comparator: Arc::new(comparator),
            heap,
            primed: false,
        }
    }

    fn refill(&mut self, stream: usize) -> Result<(), MergeError> {
        if let Some(row) = self.streams[stream].next_row()? {
            self.heap.push(Head {
                row,
                stream,
                comparator: Arc::clone(&self.comparator),
            });
        }
        Ok(())
    }
}

impl RowCursor for OrderByMerge {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, MergeError> {
        if !self.primed {
            self.primed = true;
            for stream in 0..self.streams.len() {
                self.refill(stream)?;
            }
        }
        let Some(head) = self.heap.pop() else {
            return Ok(None);
        };
        self.refill(head.stream)?;
        Ok(Some(head.row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryQueryResult;
    use crate::domain::{ColumnTarget, OrderSpec};
    use crate::merge::stream::collect_rows;

    fn stream(unit: usize, rows: &[(i64, &str)]) -> UnitStream {
        let rows = rows
            .iter()
            .map(|(k, tag)| vec![Value::Int(*k), Value::from(*tag)])
            .collect();
        UnitStream::new(unit, Box::new(MemoryQueryResult::new(&["k", "tag"], rows)))
    }

    fn merge(streams: Vec<UnitStream>, spec: OrderSpec) -> Vec<(i64, String)> {
        let columns = vec![ColumnMetadata::new("k"), ColumnMetadata::new("tag")];
        let comparator = RowComparator::new(&[spec], &columns, true).unwrap();
        let mut merge = OrderByMerge::new(columns, streams, comparator);
        collect_rows(&mut merge)
            .unwrap()
            .into_iter()
            .map(|r| (r[0].as_i64().unwrap(), r[1].to_string()))
            .collect()
    }

    #[test]
    fn test_ascending_merge_with_stable_ties() {
        let out = merge(
            vec![
                stream(0, &[(1, "a"), (4, "a"), (4, "a2")]),
                stream(1, &[(2, "b"), (4, "b")]),
                stream(2, &[]),
                stream(3, &[(0, "d"), (5, "d")]),
            ],
            OrderSpec::asc(ColumnTarget::Index(0)),
        );
        let expected: Vec<(i64, String)> = [
            (0, "d"),
            (1, "a"),
            (2, "b"),
            (4, "a"),
            (4, "a2"),
            (4, "b"),
            (5, "d"),
        ]
        .iter()
        .map(|(k, t)| (*k, t.to_string()))
        .collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_descending_merge() {
        let out = merge(
            vec![stream(0, &[(9, "a"), (3, "a")]), stream(1, &[(7, "b"), (1, "b")])],
            OrderSpec::desc(ColumnTarget::Label("k".into())),
        );
        let keys: Vec<i64> = out.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![9, 7, 3, 1]);
    }

    #[test]
    fn test_stream_error_surfaces() {
        let columns = vec![ColumnMetadata::new("k")];
        let broken = MemoryQueryResult::new(&["k"], vec![vec![Value::Int(1)], vec![Value::Int(2)]])
            .failing_at(1);
        let comparator =
            RowComparator::new(&[OrderSpec::asc(ColumnTarget::Index(0))], &columns, true).unwrap();
        let mut merge = OrderByMerge::new(
            columns,
            vec![UnitStream::new(0, Box::new(broken))],
            comparator,
        );
        assert!(matches!(merge.next_row(), Err(MergeError::Stream { unit: 0, .. })));
    }
}
