//! Result metadata.

use serde::{Deserialize, Serialize};

/// One result column.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Column label as reported by the data source.
    pub label: String,
}

impl ColumnMetadata {
    /// Column with a label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}
