//! # Select Shape
//!
//! The parts of a SELECT the merger needs, resolved against the rewritten
//! projection list.

use super::errors::MergeError;
use super::result::ColumnMetadata;
use super::statement::{AggregationKind, SortDirection};
use serde::{Deserialize, Serialize};

/// A result column, by position or by label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnTarget {
    /// Zero-based column index.
    Index(usize),
    /// Column label, matched case-insensitively.
    Label(String),
}

impl ColumnTarget {
    /// Resolve to a column index.
    pub fn resolve(&self, columns: &[ColumnMetadata]) -> Result<usize, MergeError> {
        match self {
            Self::Index(i) if *i < columns.len() => Ok(*i),
            Self::Index(i) => Err(MergeError::UnknownColumn(format!("#{}", i + 1))),
            Self::Label(label) => columns
                .iter()
                .position(|c| c.label.eq_ignore_ascii_case(label))
                .ok_or_else(|| MergeError::UnknownColumn(label.clone())),
        }
    }
}

/// One sort key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Column.
    pub target: ColumnTarget,
    /// Direction.
    pub direction: SortDirection,
    /// Explicit NULL placement.
    pub nulls_first: Option<bool>,
}

impl OrderSpec {
    /// Ascending key.
    pub fn asc(target: ColumnTarget) -> Self {
        Self {
            target,
            direction: SortDirection::Asc,
            nulls_first: None,
        }
    }

    /// Descending key.
    pub fn desc(target: ColumnTarget) -> Self {
        Self {
            target,
            direction: SortDirection::Desc,
            nulls_first: None,
        }
    }
}

/// One aggregate column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    /// Function.
    pub kind: AggregationKind,
    /// Visible column.
    pub target: ColumnTarget,
    /// For AVG: the derived COUNT and SUM columns.
    pub avg_derived: Option<(ColumnTarget, ColumnTarget)>,
}

/// Final offset / limit, applied after merging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSpec {
    /// Rows to skip.
    pub offset: u64,
    /// Rows to return.
    pub row_count: Option<u64>,
}

/// Statement shape consumed by the merger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectShape {
    /// Sort keys, including an ORDER BY appended for GROUP BY.
    pub order_by: Vec<OrderSpec>,
    /// Grouping keys.
    pub group_by: Vec<OrderSpec>,
    /// Aggregates.
    pub aggregations: Vec<AggregationSpec>,
    /// SELECT DISTINCT.
    pub distinct: bool,
    /// Offset / limit.
    pub pagination: Option<PaginationSpec>,
    /// Trailing columns added by the rewrite, hidden from the caller.
    pub derived_columns: usize,
    /// Shards return rows sorted by the group key.
    pub stream_group_by: bool,
}

impl SelectShape {
    /// Needs grouping (GROUP BY or bare aggregates)?
    pub fn needs_grouping(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregations.is_empty()
    }
}
