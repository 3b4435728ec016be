//! # Group-By Merge
//!
//! Two strategies:
//!
//! - **Stream**: input arrives sorted by the group key (the order-by merge
//!   over shards that were asked to sort by it), so consecutive equal keys
//!   fold into one row and nothing is buffered beyond the current group.
//! - **Memory**: input is drained, grouped in a hash map keyed by the group
//!   values, then sorted by the statement's ORDER BY if it has one.

use super::aggregation::{Accumulator, ResolvedAggregation};
use super::comparator::RowComparator;
use super::stream::RowCursor;
use crate::domain::{AggregationSpec, ColumnMetadata, MergeError, Value};
use std::collections::HashMap;
use std::vec;

struct Group {
    row: Vec<Value>,
    accumulators: Vec<Accumulator>,
}

/// Folds rows into groups.
struct Aggregator {
    aggregations: Vec<ResolvedAggregation>,
}

impl Aggregator {
    fn new(specs: &[AggregationSpec], columns: &[ColumnMetadata]) -> Result<Self, MergeError> {
        let aggregations = specs
            .iter()
            .map(|spec| ResolvedAggregation::resolve(spec, columns))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { aggregations })
    }

    fn empty(&self, row: Vec<Value>) -> Group {
        Group {
            row,
            accumulators: self.aggregations.iter().map(|a| a.accumulator()).collect(),
        }
    }

    fn start(&self, row: Vec<Value>) -> Result<Group, MergeError> {
        let mut group = self.empty(row);
        let first = group.row.clone();
        self.fold(&mut group, &first)?;
        Ok(group)
    }

    fn fold(&self, group: &mut Group, row: &[Value]) -> Result<(), MergeError> {
        for (aggregation, acc) in self.aggregations.iter().zip(&mut group.accumulators) {
            aggregation.fold(acc, row)?;
        }
        Ok(())
    }

    fn finish(&self, group: Group) -> Vec<Value> {
        let mut row = group.row;
        for (aggregation, acc) in self.aggregations.iter().zip(&group.accumulators) {
            aggregation.finish(acc, &mut row);
        }
        row
    }
}

fn key_of(row: &[Value], indices: &[usize]) -> Vec<Value> {
    indices
        .iter()
        .map(|i| row.get(*i).cloned().unwrap_or_default())
        .collect()
}

fn same_key(left: &[Value], right: &[Value], indices: &[usize]) -> bool {
    indices.iter().all(|i| left.get(*i) == right.get(*i))
}

/// Group-by over input sorted by the group key.
pub struct StreamGroupByMerge {
    inner: Box<dyn RowCursor>,
    keys: Vec<usize>,
    aggregator: Aggregator,
    pending: Option<Vec<Value>>,
}

impl StreamGroupByMerge {
    /// `keys` are the group column indices; `inner` must be sorted by them.
    pub fn new(
        inner: Box<dyn RowCursor>,
        keys: Vec<usize>,
        aggregations: &[AggregationSpec],
    ) -> Result<Self, MergeError> {
        let aggregator = Aggregator::new(aggregations, inner.columns())?;
        Ok(Self {
            inner,
            keys,
            aggregator,
            pending: None,
        })
    }
}

impl RowCursor for StreamGroupByMerge {
    fn columns(&self) -> &[ColumnMetadata] {
        self.inner.columns()
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, MergeError> {
        let first = match self.pending.take() {
            Some(row) => row,
            None => match self.inner.next_row()? {
                Some(row) => row,
                None => return Ok(None),
            },
        };
        let mut group = self.aggregator.start(first)?;
        while let Some(row) = self.inner.next_row()? {
            if same_key(&group.row, &row, &self.keys) {
                self.aggregator.fold(&mut group, &row)?;
            } else {
                self.pending = Some(row);
                break;
            }
        }
        Ok(Some(self.aggregator.finish(group)))
    }
}

/// Group-by that buffers the whole input.
pub struct MemoryGroupByMerge {
    inner: Box<dyn RowCursor>,
    keys: Vec<usize>,
    aggregator: Aggregator,
    order: Option<RowComparator>,
    output: Option<vec::IntoIter<Vec<Value>>>,
}

impl MemoryGroupByMerge {
    /// Without group keys every row folds into a single group, which is
    /// emitted even when the input is empty.
    pub fn new(
        inner: Box<dyn RowCursor>,
        keys: Vec<usize>,
        aggregations: &[AggregationSpec],
        order: Option<RowComparator>,
    ) -> Result<Self, MergeError> {
        let aggregator = Aggregator::new(aggregations, inner.columns())?;
        Ok(Self {
            inner,
            keys,
            aggregator,
            order,
            output: None,
        })
    }

    fn build(&mut self) -> Result<Vec<Vec<Value>>, MergeError> {
        let mut positions: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();
        while let Some(row) = self.inner.next_row()? {
            let key = key_of(&row, &self.keys);
            match positions.get(&key) {
                Some(&at) => self.aggregator.fold(&mut groups[at], &row)?,
                None => {
                    positions.insert(key, groups.len());
                    groups.push(self.aggregator.start(row)?);
                }
            }
        }
        if groups.is_empty() && self.keys.is_empty() {
            let width = self.inner.columns().len();
            groups.push(self.aggregator.empty(vec![Value::Null; width]));
        }

        let mut rows: Vec<Vec<Value>> = groups
            .into_iter()
            .map(|g| self.aggregator.finish(g))
            .collect();
        if let Some(order) = &self.order {
            rows.sort_by(|a, b| order.compare(a, b));
        }
        Ok(rows)
    }
}

impl RowCursor for MemoryGroupByMerge {
    fn columns(&self) -> &[ColumnMetadata] {
        self.inner.columns()
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, MergeError> {
        if self.output.is_none() {
            let rows = self.build()?;
            self.output = Some(rows.into_iter());
        }
        Ok(self.output.as_mut().and_then(Iterator::next))
    }
}
