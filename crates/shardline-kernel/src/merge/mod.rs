//! # Merge
//!
//! Turns the per-unit results of one statement into a single result.

pub mod aggregation;
pub mod comparator;
pub mod decorator;
pub mod engine;
pub mod group_by;
pub mod iterator;
pub mod merged;
pub mod order_by;
pub mod stream;

pub use engine::ResultMerger;
pub use merged::{drain, MergeMode, MergedResult, MergedRows};
pub use stream::RowCursor;
