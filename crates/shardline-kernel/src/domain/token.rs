//! # SQL Tokens
//!
//! A token marks a span of the original SQL text (or a zero-width insertion
//! point) and knows what to put there for a given route unit.

use super::route::RouteUnit;
use super::statement::Span;
use serde::{Deserialize, Serialize};

/// One VALUES row of a rewritten INSERT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsertValueRow {
    /// Original row text up to, not including, the closing `)`.
    pub head: String,
    /// Generated key to append, already rendered (`?` or a literal).
    pub key: Option<String>,
}

impl InsertValueRow {
    fn render(&self) -> String {
        match &self.key {
            Some(key) => format!("{}, {})", self.head, key),
            None => format!("{})", self.head),
        }
    }
}

/// What a token stands for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    /// A logic table name, replaced by the unit's actual table.
    Table {
        /// Logic table.
        logic_table: String,
        /// Text as written.
        original: String,
    },
    /// A literal OFFSET, rewritten for over-fetch.
    Offset {
        /// Replacement.
        value: u64,
    },
    /// A literal LIMIT row count, rewritten for over-fetch.
    RowCount {
        /// Replacement.
        value: u64,
    },
    /// Derived columns appended to the select list.
    DerivedProjections {
        /// Text starting with `, `.
        text: String,
    },
    /// ORDER BY appended after GROUP BY.
    OrderByAppend {
        /// Text starting with a space.
        text: String,
    },
    /// Generated-key column appended to the INSERT column list.
    GeneratedKeyColumn {
        /// Column name.
        column: String,
    },
    /// The whole VALUES list, reduced to the unit's rows.
    InsertValues {
        /// Every row, indexed like the statement.
        rows: Vec<InsertValueRow>,
    },
}

impl TokenKind {
    /// Role name, for logs.
    pub fn role(&self) -> &'static str {
        match self {
            Self::Table { .. } => "table",
            Self::Offset { .. } => "offset",
            Self::RowCount { .. } => "row-count",
            Self::DerivedProjections { .. } => "derived-projection",
            Self::OrderByAppend { .. } => "order-by",
            Self::GeneratedKeyColumn { .. } => "generated-key",
            Self::InsertValues { .. } => "insert-values",
        }
    }
}

/// A tagged span of SQL text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SqlToken {
    /// Covered text; zero-width for insertions.
    pub span: Span,
    /// Role and replacement data.
    pub kind: TokenKind,
}

impl SqlToken {
    /// Create a token.
    pub fn new(span: Span, kind: TokenKind) -> Self {
        Self { span, kind }
    }

    /// Replacement text for `unit`.
    pub fn render(&self, unit: &RouteUnit) -> String {
        match &self.kind {
            TokenKind::Table {
                logic_table,
                original,
            } => unit
                .actual_table(logic_table)
                .map_or_else(|| original.clone(), str::to_string),
            TokenKind::Offset { value } | TokenKind::RowCount { value } => value.to_string(),
            TokenKind::DerivedProjections { text } | TokenKind::OrderByAppend { text } => {
                text.clone()
            }
            TokenKind::GeneratedKeyColumn { column } => format!(", {column}"),
            TokenKind::InsertValues { rows } => {
                let rendered: Vec<String> = if unit.insert_rows.is_empty() {
                    rows.iter().map(InsertValueRow::render).collect()
                } else {
                    unit.insert_rows
                        .iter()
                        .filter_map(|i| rows.get(*i))
                        .map(InsertValueRow::render)
                        .collect()
                };
                rendered.join(", ")
            }
        }
    }
}
