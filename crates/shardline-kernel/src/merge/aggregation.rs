//! # Aggregation
//!
//! Combines per-shard partial aggregates. COUNT and SUM add up, MIN and MAX
//! keep running extrema, and AVG is rebuilt from the derived SUM and COUNT
//! columns at emission time rather than from per-shard averages.

use crate::domain::{AggregationKind, AggregationSpec, ColumnMetadata, MergeError, Value};
use std::cmp::Ordering;

/// Column positions of one aggregate.
#[derive(Clone, Debug)]
pub struct ResolvedAggregation {
    kind: AggregationKind,
    index: usize,
    avg_columns: Option<(usize, usize)>,
}

impl ResolvedAggregation {
    /// Resolve a spec against the column layout.
    pub fn resolve(spec: &AggregationSpec, columns: &[ColumnMetadata]) -> Result<Self, MergeError> {
        let avg_columns = match &spec.avg_derived {
            Some((count, sum)) => Some((count.resolve(columns)?, sum.resolve(columns)?)),
            None => None,
        };
        Ok(Self {
            kind: spec.kind,
            index: spec.target.resolve(columns)?,
            avg_columns,
        })
    }

    /// A fresh accumulator.
    pub fn accumulator(&self) -> Accumulator {
        match (self.kind, self.avg_columns) {
            (AggregationKind::Count, _) => Accumulator::Count(0),
            (AggregationKind::Sum, _) => Accumulator::Sum(Value::Null),
            (AggregationKind::Min, _) => Accumulator::Extreme(Value::Null, Ordering::Less),
            (AggregationKind::Max, _) => Accumulator::Extreme(Value::Null, Ordering::Greater),
            (AggregationKind::Avg, Some(_)) => Accumulator::Avg {
                count: 0,
                sum: Value::Null,
            },
            // No derived columns: the unit was never rewritten, so its AVG
            // is already final. Only one partial can arrive.
            (AggregationKind::Avg, None) => Accumulator::Extreme(Value::Null, Ordering::Greater),
        }
    }

    /// Fold one row into `acc`.
    pub fn fold(&self, acc: &mut Accumulator, row: &[Value]) -> Result<(), MergeError> {
        let cell = |index: usize| row.get(index).unwrap_or(&Value::Null);
        match acc {
            Accumulator::Count(total) => {
                let partial = cell(self.index);
                if !partial.is_null() {
                    let n = partial.as_i64().ok_or_else(|| mismatch("COUNT", *total, partial))?;
                    *total = total.saturating_add(n);
                }
            }
            Accumulator::Sum(total) => *total = add("SUM", total, cell(self.index))?,
            Accumulator::Extreme(current, wanted) => {
                let partial = cell(self.index);
                if !partial.is_null()
                    && (current.is_null() || partial.compare(current) == *wanted)
                {
                    *current = partial.clone();
                }
            }
            Accumulator::Avg { count, sum } => {
                if let Some((count_index, sum_index)) = self.avg_columns {
                    let partial = cell(count_index);
                    if !partial.is_null() {
                        *count += partial
                            .as_i64()
                            .ok_or_else(|| mismatch("AVG", &Value::Int(*count), partial))?;
                    }
                    *sum = add("AVG", sum, cell(sum_index))?;
                }
            }
        }
        Ok(())
    }

    /// Write the final values into `row`.
    pub fn finish(&self, acc: &Accumulator, row: &mut [Value]) {
        let value = match acc {
            Accumulator::Count(total) => Value::Int(*total),
            Accumulator::Sum(total) => total.clone(),
            Accumulator::Extreme(current, _) => current.clone(),
            Accumulator::Avg { count, sum } => {
                if let Some((count_index, sum_index)) = self.avg_columns {
                    set(row, count_index, Value::Int(*count));
                    set(row, sum_index, sum.clone());
                }
                match sum.as_f64() {
                    Some(total) if *count > 0 => Value::Float(total / *count as f64),
                    _ => Value::Null,
                }
            }
        };
        set(row, self.index, value);
    }
}

/// Running state of one aggregate.
#[derive(Clone, Debug, PartialEq)]
pub enum Accumulator {
    /// Total of partial counts.
    Count(i64),
    /// Total of partial sums; NULL until a non-NULL partial arrives.
    Sum(Value),
    /// Running minimum (`Less`) or maximum (`Greater`).
    Extreme(Value, Ordering),
    /// Totals of the derived COUNT and SUM columns.
    Avg {
        /// Rows averaged.
        count: i64,
        /// Their sum.
        sum: Value,
    },
}

fn set(row: &mut [Value], index: usize, value: Value) {
    if let Some(slot) = row.get_mut(index) {
        *slot = value;
    }
}

fn mismatch(function: &str, left: impl ToString, right: &Value) -> MergeError {
    MergeError::Aggregation {
        function: function.to_string(),
        left: left.to_string(),
        right: right.to_string(),
    }
}

fn add(function: &str, total: &Value, partial: &Value) -> Result<Value, MergeError> {
    match (total, partial) {
        (_, Value::Null) => Ok(total.clone()),
        (Value::Null, Value::Int(_) | Value::Float(_)) => Ok(partial.clone()),
        (Value::Int(a), Value::Int(b)) => Ok(a
            .checked_add(*b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::Float(*a as f64 + *b as f64))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => Ok(Value::Float(
            total.as_f64().unwrap_or_default() + partial.as_f64().unwrap_or_default(),
        )),
        _ => Err(mismatch(function, total, partial)),
    }
}
