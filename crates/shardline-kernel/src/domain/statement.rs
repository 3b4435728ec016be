//! # Parsed Statement Model
//!
//! The abstract syntax tree handed to the kernel by an external SQL parser.
//! Statements are a closed set of variants; every segment that the rewrite
//! engine may touch carries its byte span in the original SQL text.

use super::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Half-open byte range `[start, stop)` in the original SQL text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Span {
    /// First byte.
    pub start: usize,
    /// One past the last byte.
    pub stop: usize,
}

impl Span {
    /// Create a span.
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    /// Zero-width span, used as an insertion point.
    pub fn at(offset: usize) -> Self {
        Self {
            start: offset,
            stop: offset,
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    /// True for insertion points.
    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }
}

/// A table reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSegment {
    /// Logic table name as written.
    pub name: String,
    /// Optional alias.
    pub alias: Option<String>,
    /// Span of the name only.
    pub span: Span,
}

impl TableSegment {
    /// Table reference without alias.
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            alias: None,
            span,
        }
    }

    /// Builder: set alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Does `owner` refer to this table (by alias or name)?
    pub fn is_named(&self, owner: &str) -> bool {
        self.alias
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(owner))
            || self.name.eq_ignore_ascii_case(owner)
    }
}

/// A column reference, optionally qualified.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSegment {
    /// Table name or alias qualifier.
    pub owner: Option<String>,
    /// Column name.
    pub name: String,
}

impl ColumnSegment {
    /// Unqualified column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            owner: None,
            name: name.into(),
        }
    }

    /// Qualified column.
    pub fn qualified(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            name: name.into(),
        }
    }

    /// SQL text of the reference.
    pub fn text(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}", owner, self.name),
            None => self.name.clone(),
        }
    }
}

/// Right-hand side of a predicate or an insert value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExprValue {
    /// Literal value.
    Literal(Value),
    /// Positional `?` parameter, zero-based.
    Parameter(usize),
    /// Any other expression (function call, column, arithmetic).
    Complex,
}

/// Comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>` / `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// WHERE-clause predicate tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// `column <op> value`
    Compare {
        /// Left-hand column.
        column: ColumnSegment,
        /// Operator.
        op: CompareOp,
        /// Right-hand value.
        value: ExprValue,
    },
    /// `column [NOT] IN (...)`
    In {
        /// Column.
        column: ColumnSegment,
        /// Listed values.
        values: Vec<ExprValue>,
        /// `NOT IN`
        negated: bool,
    },
    /// `column BETWEEN low AND high`
    Between {
        /// Column.
        column: ColumnSegment,
        /// Lower bound (inclusive).
        low: ExprValue,
        /// Upper bound (inclusive).
        high: ExprValue,
    },
    /// Conjunction.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
    /// Anything involving a subquery.
    Subquery,
    /// Any predicate the router cannot use (LIKE, column = column, ...).
    Other,
}

impl Predicate {
    /// `column = value`
    pub fn eq(column: ColumnSegment, value: ExprValue) -> Self {
        Self::Compare {
            column,
            op: CompareOp::Eq,
            value,
        }
    }
}

/// Aggregate function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationKind {
    /// COUNT
    Count,
    /// SUM
    Sum,
    /// MIN
    Min,
    /// MAX
    Max,
    /// AVG
    Avg,
}

impl AggregationKind {
    /// SQL function name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
        }
    }
}

/// One item of the select list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Plain column.
    Column {
        /// Column reference.
        column: ColumnSegment,
        /// Alias.
        alias: Option<String>,
    },
    /// Aggregate call.
    Aggregation {
        /// Function.
        kind: AggregationKind,
        /// Argument text, `*` for `COUNT(*)`.
        argument: String,
        /// Alias.
        alias: Option<String>,
    },
    /// `*` or `t.*`
    Star {
        /// Qualifier.
        owner: Option<String>,
    },
    /// Any other expression.
    Expression {
        /// Expression text.
        text: String,
        /// Alias.
        alias: Option<String>,
    },
}

impl Projection {
    /// Column label the data source reports for this projection.
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Column { column, alias } => {
                Some(alias.clone().unwrap_or_else(|| column.name.clone()))
            }
            Self::Aggregation {
                kind,
                argument,
                alias,
            } => Some(
                alias
                    .clone()
                    .unwrap_or_else(|| format!("{}({})", kind.name(), argument)),
            ),
            Self::Star { .. } => None,
            Self::Expression { text, alias } => Some(alias.clone().unwrap_or_else(|| text.clone())),
        }
    }
}

/// The select list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct ProjectionsSegment {
    /// Items in order.
    pub items: Vec<Projection>,
    /// `SELECT DISTINCT`
    pub distinct: bool,
    /// Offset just past the last item; derived columns are inserted here.
    pub stop: usize,
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// SQL keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// What an ORDER BY item refers to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderTarget {
    /// A column or alias.
    Column(ColumnSegment),
    /// A 1-based select-list position.
    Position(usize),
}

/// One ORDER BY item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByItem {
    /// Sort key.
    pub target: OrderTarget,
    /// Direction.
    pub direction: SortDirection,
    /// Explicit `NULLS FIRST` / `NULLS LAST`.
    pub nulls_first: Option<bool>,
}

impl OrderByItem {
    /// Ascending item on a column.
    pub fn asc(column: ColumnSegment) -> Self {
        Self {
            target: OrderTarget::Column(column),
            direction: SortDirection::Asc,
            nulls_first: None,
        }
    }

    /// Descending item on a column.
    pub fn desc(column: ColumnSegment) -> Self {
        Self {
            target: OrderTarget::Column(column),
            direction: SortDirection::Desc,
            nulls_first: None,
        }
    }
}

/// ORDER BY clause.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OrderBySegment {
    /// Items in order.
    pub items: Vec<OrderByItem>,
}

/// GROUP BY clause.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GroupBySegment {
    /// Grouping columns.
    pub items: Vec<ColumnSegment>,
    /// Offset where a generated ORDER BY would be inserted (end of the
    /// GROUP BY / HAVING clauses).
    pub stop: usize,
}

/// LIMIT or OFFSET operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaginationKind {
    /// Literal number.
    Literal(u64),
    /// Bound parameter.
    Parameter(usize),
}

/// LIMIT or OFFSET operand with its position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationValue {
    /// Literal or parameter.
    pub kind: PaginationKind,
    /// Span of the operand text.
    pub span: Span,
}

/// LIMIT / OFFSET clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PaginationSegment {
    /// OFFSET operand.
    pub offset: Option<PaginationValue>,
    /// LIMIT operand.
    pub row_count: Option<PaginationValue>,
}

/// SELECT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct SelectStatement {
    /// Select list.
    pub projections: ProjectionsSegment,
    /// FROM and JOIN table references.
    pub tables: Vec<TableSegment>,
    /// Qualifiers written with the table's logic name (`orders.id`), renamed
    /// along with the table.
    pub owners: Vec<TableSegment>,
    /// WHERE.
    pub where_clause: Option<Predicate>,
    /// GROUP BY.
    pub group_by: Option<GroupBySegment>,
    /// ORDER BY.
    pub order_by: Option<OrderBySegment>,
    /// LIMIT / OFFSET.
    pub pagination: Option<PaginationSegment>,
}

/// One VALUES row of an INSERT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsertRow {
    /// Values in column order. `Complex` values never bind parameters.
    pub values: Vec<ExprValue>,
    /// Span from `(` through `)`.
    pub span: Span,
}

impl InsertRow {
    /// Parameter indices bound by this row, in order.
    pub fn parameter_indices(&self) -> Vec<usize> {
        self.values
            .iter()
            .filter_map(|v| match v {
                ExprValue::Parameter(i) => Some(*i),
                _ => None,
            })
            .collect()
    }
}

/// INSERT ... VALUES.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsertStatement {
    /// Target table.
    pub table: TableSegment,
    /// Explicit column list.
    pub columns: Vec<ColumnSegment>,
    /// Offset of the `)` closing the column list.
    pub columns_stop: usize,
    /// VALUES rows.
    pub rows: Vec<InsertRow>,
}

/// UPDATE.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatement {
    /// Target table.
    pub table: TableSegment,
    /// Qualifiers naming the table.
    pub owners: Vec<TableSegment>,
    /// WHERE.
    pub where_clause: Option<Predicate>,
}

/// DELETE.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteStatement {
    /// Target table.
    pub table: TableSegment,
    /// Qualifiers naming the table.
    pub owners: Vec<TableSegment>,
    /// WHERE.
    pub where_clause: Option<Predicate>,
}

/// CREATE / ALTER / DROP / TRUNCATE.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DdlStatement {
    /// Tables the statement touches.
    pub tables: Vec<TableSegment>,
}

/// Closed set of supported statements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SqlStatement {
    /// SELECT
    Select(SelectStatement),
    /// INSERT
    Insert(InsertStatement),
    /// UPDATE
    Update(UpdateStatement),
    /// DELETE
    Delete(DeleteStatement),
    /// DDL
    Ddl(DdlStatement),
}

impl SqlStatement {
    /// Statement keyword, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Select(_) => "SELECT",
            Self::Insert(_) => "INSERT",
            Self::Update(_) => "UPDATE",
            Self::Delete(_) => "DELETE",
            Self::Ddl(_) => "DDL",
        }
    }

    /// Is this a query (as opposed to a mutation or DDL)?
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Select(_))
    }

    /// Table references (not owner qualifiers), in textual order.
    pub fn tables(&self) -> Vec<&TableSegment> {
        match self {
            Self::Select(s) => s.tables.iter().collect(),
            Self::Insert(s) => vec![&s.table],
            Self::Update(s) => vec![&s.table],
            Self::Delete(s) => vec![&s.table],
            Self::Ddl(s) => s.tables.iter().collect(),
        }
    }

    /// Every segment whose text is a logic table name to be renamed.
    pub fn table_tokens(&self) -> Vec<&TableSegment> {
        let mut out = self.tables();
        match self {
            Self::Select(s) => out.extend(s.owners.iter()),
            Self::Update(s) => out.extend(s.owners.iter()),
            Self::Delete(s) => out.extend(s.owners.iter()),
            _ => {}
        }
        out
    }

    /// WHERE clause, if any.
    pub fn where_clause(&self) -> Option<&Predicate> {
        match self {
            Self::Select(s) => s.where_clause.as_ref(),
            Self::Update(s) => s.where_clause.as_ref(),
            Self::Delete(s) => s.where_clause.as_ref(),
            Self::Insert(_) | Self::Ddl(_) => None,
        }
    }
}

/// Caller-supplied sharding values that bypass predicate extraction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardingHints {
    /// Database-level values per logic table.
    pub database: HashMap<String, Vec<Value>>,
    /// Table-level values per logic table.
    pub table: HashMap<String, Vec<Value>>,
}

impl ShardingHints {
    /// Add a database-level hint.
    pub fn add_database_value(&mut self, table: &str, value: impl Into<Value>) {
        self.database
            .entry(table.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Add a table-level hint.
    pub fn add_table_value(&mut self, table: &str, value: impl Into<Value>) {
        self.table
            .entry(table.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Database-level hint values.
    pub fn database_values(&self, table: &str) -> Option<&[Value]> {
        self.database
            .get(&table.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// Table-level hint values.
    pub fn table_values(&self, table: &str) -> Option<&[Value]> {
        self.table.get(&table.to_ascii_lowercase()).map(Vec::as_slice)
    }

    /// No hints at all?
    pub fn is_empty(&self) -> bool {
        self.database.is_empty() && self.table.is_empty()
    }
}

/// Output of the external parser: SQL text, AST and hints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatement {
    /// Original SQL text.
    pub sql: String,
    /// Syntax tree.
    pub statement: SqlStatement,
    /// Hint values.
    pub hints: ShardingHints,
}

impl ParsedStatement {
    /// Statement without hints.
    pub fn new(sql: impl Into<String>, statement: SqlStatement) -> Self {
        Self {
            sql: sql.into(),
            statement,
            hints: ShardingHints::default(),
        }
    }

    /// Builder: attach hints.
    pub fn with_hints(mut self, hints: ShardingHints) -> Self {
        self.hints = hints;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_segment_is_named() {
        let t = TableSegment::new("orders", Span::new(14, 20)).with_alias("o");
        assert!(t.is_named("o"));
        assert!(t.is_named("ORDERS"));
        assert!(!t.is_named("order_item"));
    }

    #[test]
    fn test_projection_labels() {
        let count = Projection::Aggregation {
            kind: AggregationKind::Count,
            argument: "*".into(),
            alias: None,
        };
        assert_eq!(count.label().as_deref(), Some("COUNT(*)"));
        let col = Projection::Column {
            column: ColumnSegment::qualified("o", "user_id"),
            alias: Some("uid".into()),
        };
        assert_eq!(col.label().as_deref(), Some("uid"));
        assert_eq!(Projection::Star { owner: None }.label(), None);
    }

    #[test]
    fn test_table_tokens_include_owners() {
        let stmt = SqlStatement::Select(SelectStatement {
            tables: vec![TableSegment::new("orders", Span::new(20, 26))],
            owners: vec![TableSegment::new("orders", Span::new(7, 13))],
            ..Default::default()
        });
        assert_eq!(stmt.tables().len(), 1);
        assert_eq!(stmt.table_tokens().len(), 2);
    }

    #[test]
    fn test_hints_are_case_insensitive() {
        let mut hints = ShardingHints::default();
        hints.add_table_value("Orders", 3);
        assert_eq!(hints.table_values("orders"), Some(&[Value::Int(3)][..]));
        assert!(hints.database_values("orders").is_none());
    }

    #[test]
    fn test_insert_row_parameters() {
        let row = InsertRow {
            values: vec![
                ExprValue::Parameter(2),
                ExprValue::Literal(Value::Int(1)),
                ExprValue::Parameter(3),
            ],
            span: Span::new(0, 10),
        };
        assert_eq!(row.parameter_indices(), vec![2, 3]);
    }
}
