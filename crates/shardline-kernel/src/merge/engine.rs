//! # Result Merger
//!
//! Picks a merge mode from the statement shape and stacks the stages:
//!
//! ```text
//! one stream            -> pass-through
//! GROUP BY, streamable  -> order-by merge -> stream group-by
//! GROUP BY / aggregates -> iterator merge -> memory group-by
//! ORDER BY              -> order-by merge
//! otherwise             -> iterator merge
//!                          then DISTINCT, then pagination
//! ```

use super::comparator::RowComparator;
use super::decorator::{DistinctStage, PaginationStage};
use super::group_by::{MemoryGroupByMerge, StreamGroupByMerge};
use super::iterator::IteratorMerge;
use super::merged::{MergeMode, MergedRows};
use super::order_by::OrderByMerge;
use super::stream::{BufferedRows, RowCursor, UnitStream};
use crate::config::MergeConfig;
use crate::domain::{MergeError, SelectShape};
use crate::execute::UnitResult;
use crate::ports::UnitOutput;
use shardline_telemetry::metrics::MERGES;
use tracing::debug;

/// Merges per-unit results into one.
#[derive(Clone, Debug, Default)]
pub struct ResultMerger {
    config: MergeConfig,
}

impl ResultMerger {
    /// Create a merger.
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Merge row streams. Any failed unit fails the merge.
    pub fn merge_query(
        &self,
        results: Vec<UnitResult>,
        shape: &SelectShape,
    ) -> Result<MergedRows, MergeError> {
        let mut streams = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(UnitOutput::Rows(rows)) => streams.push(UnitStream::new(index, rows)),
                Ok(UnitOutput::Affected(_)) => return Err(MergeError::MixedResults),
                Err(error) => return Err(MergeError::UnitFailed(error)),
            }
        }

        let Some(first) = streams.first() else {
            return Ok(MergedRows::new(
                Box::new(BufferedRows::new(Vec::new(), Vec::new())),
                0,
                MergeMode::PassThrough,
            ));
        };
        let columns = first.columns().to_vec();
        for stream in &streams[1..] {
            if stream.columns().len() != columns.len() {
                return Err(MergeError::ColumnMismatch {
                    unit: stream.unit(),
                    expected: columns.len(),
                    got: stream.columns().len(),
                });
            }
        }
        let visible = columns.len().saturating_sub(shape.derived_columns);
        let stream_count = streams.len();

        let (mode, mut cursor): (MergeMode, Box<dyn RowCursor>) = if stream_count == 1 {
            let single = streams.remove(0);
            (MergeMode::PassThrough, Box::new(single))
        } else if shape.needs_grouping() {
            let keys = RowComparator::new(&shape.group_by, &columns, self.config.nulls_first)?;
            if shape.stream_group_by && !shape.group_by.is_empty() {
                // Shards sort by the ORDER BY, whose targets are the group keys
                // but whose directions may differ.
                let order =
                    RowComparator::new(&shape.order_by, &columns, self.config.nulls_first)?;
                let sorted = OrderByMerge::new(columns.clone(), streams, order);
                let merge =
                    StreamGroupByMerge::new(Box::new(sorted), keys.indices(), &shape.aggregations)?;
                (MergeMode::StreamGroupBy, Box::new(merge))
            } else {
                let order = if shape.order_by.is_empty() {
                    None
                } else {
                    Some(RowComparator::new(
                        &shape.order_by,
                        &columns,
                        self.config.nulls_first,
                    )?)
                };
                let all = IteratorMerge::new(columns.clone(), streams);
                let merge = MemoryGroupByMerge::new(
                    Box::new(all),
                    keys.indices(),
                    &shape.aggregations,
                    order,
                )?;
                (MergeMode::MemoryGroupBy, Box::new(merge))
            }
        } else if !shape.order_by.is_empty() {
            let comparator =
                RowComparator::new(&shape.order_by, &columns, self.config.nulls_first)?;
            (
                MergeMode::OrderBy,
                Box::new(OrderByMerge::new(columns.clone(), streams, comparator)),
            )
        } else {
            (
                MergeMode::Iterator,
                Box::new(IteratorMerge::new(columns.clone(), streams)),
            )
        };

        if mode != MergeMode::PassThrough {
            if shape.distinct {
                cursor = Box::new(DistinctStage::new(cursor, visible));
            }
            if let Some(pagination) = shape.pagination {
                cursor = Box::new(PaginationStage::new(cursor, pagination));
            }
        }

        MERGES.with_label_values(&[mode.label()]).inc();
        debug!(
            mode = mode.label(),
            streams = stream_count,
            columns = visible,
            "Merging unit results"
        );
        Ok(MergedRows::new(cursor, visible, mode))
    }

    /// Sum update counts.
    pub fn merge_update(&self, results: Vec<UnitResult>) -> Result<u64, MergeError> {
        let mut total = 0u64;
        for result in results {
            match result {
                Ok(UnitOutput::Affected(n)) => total = total.saturating_add(n),
                Ok(UnitOutput::Rows(_)) => return Err(MergeError::MixedResults),
                Err(error) => return Err(MergeError::UnitFailed(error)),
            }
        }
        Ok(total)
    }
}
