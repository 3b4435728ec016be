//! # Token Generation
//!
//! Walks a parsed statement and produces the tokens the builder substitutes,
//! the parameter adjustments that go with them, and the select shape the
//! merger consumes.
//!
//! Multi-unit SELECTs are rewritten for merging:
//! - `AVG(x)` gets `COUNT(x)` and `SUM(x)` derived columns.
//! - ORDER BY / GROUP BY columns missing from the select list are appended.
//! - GROUP BY without ORDER BY gets `ORDER BY <group columns> ASC`.
//! - LIMIT / OFFSET become `LIMIT offset + count OFFSET 0`, or fetch every
//!   row when grouping happens in memory.

use crate::domain::{
    invariant_non_overlapping_tokens, AggregationKind, AggregationSpec, ColumnSegment,
    ColumnTarget, InsertStatement, InsertValueRow, OrderSpec, OrderTarget, PaginationKind,
    PaginationSpec, PaginationValue, ParsedStatement, Projection, RewriteError, RouteContext,
    RouteUnit, SelectShape, SelectStatement, SortDirection, Span, SqlStatement, SqlToken,
    TokenKind, Value,
};
use std::collections::HashSet;

/// Row count that stands for "every row".
pub const MAX_ROW_COUNT: u64 = i32::MAX as u64;

/// Parameter positions of a rewritten multi-row INSERT.
#[derive(Clone, Debug, Default, PartialEq)]
struct InsertLayout {
    /// Parameters before the VALUES list.
    prefix: Vec<usize>,
    /// Parameters of each row.
    rows: Vec<Vec<usize>>,
    /// Parameters after the VALUES list.
    suffix: Vec<usize>,
    /// Generated key per row, bound as a parameter.
    keys: Option<Vec<Value>>,
}

/// Everything the rewrite of one statement needs, shared by all units.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RewritePlan {
    /// Tokens sorted by position.
    pub tokens: Vec<SqlToken>,
    /// Merge shape; default for non-SELECTs and single-unit routes.
    pub shape: SelectShape,
    overrides: Vec<(usize, Value)>,
    insert: Option<InsertLayout>,
}

impl RewritePlan {
    /// Parameters for one unit.
    pub fn parameters_for(&self, unit: &RouteUnit, params: &[Value]) -> Vec<Value> {
        let Some(layout) = &self.insert else {
            let mut out = params.to_vec();
            for (index, value) in &self.overrides {
                if let Some(slot) = out.get_mut(*index) {
                    *slot = value.clone();
                }
            }
            return out;
        };

        let rows: Vec<usize> = if unit.insert_rows.is_empty() {
            (0..layout.rows.len()).collect()
        } else {
            unit.insert_rows.clone()
        };
        let pick = |i: &usize| params.get(*i).cloned();

        let mut out: Vec<Value> = layout.prefix.iter().filter_map(pick).collect();
        for row in rows {
            if let Some(indices) = layout.rows.get(row) {
                out.extend(indices.iter().filter_map(pick));
            }
            if let Some(key) = layout.keys.as_ref().and_then(|k| k.get(row)) {
                out.push(key.clone());
            }
        }
        out.extend(layout.suffix.iter().filter_map(pick));
        out
    }
}

/// Build the rewrite plan for a routed statement.
pub fn generate(
    parsed: &ParsedStatement,
    params: &[Value],
    route: &RouteContext,
) -> Result<RewritePlan, RewriteError> {
    let mut plan = RewritePlan {
        tokens: parsed
            .statement
            .table_tokens()
            .into_iter()
            .map(|t| {
                SqlToken::new(
                    t.span,
                    TokenKind::Table {
                        logic_table: t.name.to_ascii_lowercase(),
                        original: t.name.clone(),
                    },
                )
            })
            .collect(),
        ..Default::default()
    };

    match &parsed.statement {
        SqlStatement::Select(select) if !route.is_single_unit() => {
            select_rewrite(select, params, &mut plan)?;
        }
        SqlStatement::Insert(insert) => {
            plan.insert = insert_rewrite(&parsed.sql, insert, params, route, &mut plan.tokens)?;
        }
        _ => {}
    }

    plan.tokens.sort_by_key(|t| (t.span.start, t.span.stop));
    invariant_non_overlapping_tokens(&plan.tokens, parsed.sql.len())?;
    Ok(plan)
}

/// Derived columns appended to the select list.
#[derive(Default)]
struct Derived {
    text: String,
    /// (expression, label) pairs already appended.
    columns: Vec<(String, String)>,
}

impl Derived {
    fn push(&mut self, expression: String, label: String) -> ColumnTarget {
        if let Some((_, existing)) = self
            .columns
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(&expression))
        {
            return ColumnTarget::Label(existing.clone());
        }
        self.text.push_str(&format!(", {expression} AS {label}"));
        self.columns.push((expression, label.clone()));
        ColumnTarget::Label(label)
    }
}

fn matches_projection(projection: &Projection, column: &ColumnSegment) -> bool {
    match projection {
        Projection::Column { column: c, alias } => {
            let by_alias = column.owner.is_none()
                && alias
                    .as_deref()
                    .is_some_and(|a| a.eq_ignore_ascii_case(&column.name));
            let same_owner = match (&c.owner, &column.owner) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => true,
            };
            by_alias || (same_owner && c.name.eq_ignore_ascii_case(&column.name))
        }
        Projection::Aggregation { .. } | Projection::Expression { .. } => {
            column.owner.is_none()
                && projection
                    .label()
                    .is_some_and(|l| l.eq_ignore_ascii_case(&column.name))
        }
        Projection::Star { .. } => false,
    }
}

/// Target for the projection at `index`: by position unless a `*` precedes
/// it, in which case the real position is unknown until execution.
fn target_at(items: &[Projection], index: usize) -> ColumnTarget {
    let star_before = items[..index]
        .iter()
        .any(|p| matches!(p, Projection::Star { .. }));
    match items[index].label() {
        Some(label) if star_before => ColumnTarget::Label(label),
        _ => ColumnTarget::Index(index),
    }
}

fn column_target(
    items: &[Projection],
    column: &ColumnSegment,
    derived: &mut Derived,
    prefix: &str,
    ordinal: &mut usize,
) -> ColumnTarget {
    if let Some(index) = items.iter().position(|p| matches_projection(p, column)) {
        return target_at(items, index);
    }
    if items.iter().any(|p| matches!(p, Projection::Star { .. })) {
        return ColumnTarget::Label(column.name.clone());
    }
    let label = format!("{prefix}_{ordinal}");
    *ordinal += 1;
    derived.push(column.text(), label)
}

fn pagination_number(value: &PaginationValue, params: &[Value]) -> Result<u64, RewriteError> {
    match value.kind {
        PaginationKind::Literal(n) => Ok(n),
        PaginationKind::Parameter(index) => {
            let bound = params.get(index).ok_or(RewriteError::MissingParameter {
                index,
                bound: params.len(),
            })?;
            bound
                .as_i64()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| RewriteError::InvalidPagination(format!("parameter {index} = {bound}")))
        }
    }
}

fn select_rewrite(
    select: &SelectStatement,
    params: &[Value],
    plan: &mut RewritePlan,
) -> Result<(), RewriteError> {
    let items = &select.projections.items;
    let mut derived = Derived::default();
    let shape = &mut plan.shape;
    shape.distinct = select.projections.distinct;

    let mut avg_ordinal = 0;
    for (index, projection) in items.iter().enumerate() {
        let Projection::Aggregation { kind, argument, .. } = projection else {
            continue;
        };
        let avg_derived = (*kind == AggregationKind::Avg).then(|| {
            let count = derived.push(
                format!("COUNT({argument})"),
                format!("AVG_DERIVED_COUNT_{avg_ordinal}"),
            );
            let sum = derived.push(
                format!("SUM({argument})"),
                format!("AVG_DERIVED_SUM_{avg_ordinal}"),
            );
            avg_ordinal += 1;
            (count, sum)
        });
        shape.aggregations.push(AggregationSpec {
            kind: *kind,
            target: target_at(items, index),
            avg_derived,
        });
    }

    let mut order_ordinal = 0;
    if let Some(order_by) = &select.order_by {
        for item in &order_by.items {
            let target = match &item.target {
                OrderTarget::Position(p) => ColumnTarget::Index(p.saturating_sub(1)),
                OrderTarget::Column(column) => column_target(
                    items,
                    column,
                    &mut derived,
                    "ORDER_BY_DERIVED",
                    &mut order_ordinal,
                ),
            };
            shape.order_by.push(OrderSpec {
                target,
                direction: item.direction,
                nulls_first: item.nulls_first,
            });
        }
    }

    let mut group_ordinal = 0;
    if let Some(group_by) = select.group_by.as_ref().filter(|g| !g.items.is_empty()) {
        for column in &group_by.items {
            let target = column_target(
                items,
                column,
                &mut derived,
                "GROUP_BY_DERIVED",
                &mut group_ordinal,
            );
            shape.group_by.push(OrderSpec::asc(target));
        }

        if shape.order_by.is_empty() {
            let keys: Vec<String> = group_by
                .items
                .iter()
                .map(|c| format!("{} {}", c.text(), SortDirection::Asc.keyword()))
                .collect();
            plan.tokens.push(SqlToken::new(
                Span::at(group_by.stop),
                TokenKind::OrderByAppend {
                    text: format!(" ORDER BY {}", keys.join(", ")),
                },
            ));
            shape.order_by = shape.group_by.clone();
            shape.stream_group_by = true;
        } else {
            shape.stream_group_by = shape.order_by.len() == shape.group_by.len()
                && shape
                    .order_by
                    .iter()
                    .zip(&shape.group_by)
                    .all(|(o, g)| o.target == g.target);
        }
    }

    if !derived.text.is_empty() {
        shape.derived_columns = derived.columns.len();
        plan.tokens.push(SqlToken::new(
            Span::at(select.projections.stop),
            TokenKind::DerivedProjections { text: derived.text },
        ));
    }

    if let Some(pagination) = &select.pagination {
        let offset = pagination
            .offset
            .as_ref()
            .map(|v| pagination_number(v, params))
            .transpose()?
            .unwrap_or(0);
        let row_count = pagination
            .row_count
            .as_ref()
            .map(|v| pagination_number(v, params))
            .transpose()?;
        shape.pagination = Some(PaginationSpec { offset, row_count });

        let fetch_all = shape.distinct || (!shape.group_by.is_empty() && !shape.stream_group_by);
        if let Some(value) = pagination.offset {
            rewrite_pagination(value, 0, true, plan);
        }
        if let (Some(value), Some(count)) = (pagination.row_count, row_count) {
            let rewritten = if fetch_all {
                MAX_ROW_COUNT
            } else {
                offset.saturating_add(count)
            };
            rewrite_pagination(value, rewritten, false, plan);
        }
    }
    Ok(())
}

fn rewrite_pagination(value: PaginationValue, rewritten: u64, is_offset: bool, plan: &mut RewritePlan) {
    match value.kind {
        PaginationKind::Literal(_) => {
            let kind = if is_offset {
                TokenKind::Offset { value: rewritten }
            } else {
                TokenKind::RowCount { value: rewritten }
            };
            plan.tokens.push(SqlToken::new(value.span, kind));
        }
        PaginationKind::Parameter(index) => {
            let bound = Value::Int(i64::try_from(rewritten).unwrap_or(i64::MAX));
            plan.overrides.push((index, bound));
        }
    }
}

fn insert_rewrite(
    sql: &str,
    insert: &InsertStatement,
    params: &[Value],
    route: &RouteContext,
    tokens: &mut Vec<SqlToken>,
) -> Result<Option<InsertLayout>, RewriteError> {
    let keys = route.generated_key.as_ref();
    if insert.rows.is_empty() || (route.is_single_unit() && keys.is_none()) {
        return Ok(None);
    }

    let row_params: Vec<Vec<usize>> = insert.rows.iter().map(|r| r.parameter_indices()).collect();
    if let Some(index) = row_params.iter().flatten().find(|i| **i >= params.len()) {
        return Err(RewriteError::MissingParameter {
            index: *index,
            bound: params.len(),
        });
    }
    let parameterised = row_params.iter().any(|r| !r.is_empty());

    if let Some(key) = keys {
        tokens.push(SqlToken::new(
            Span::at(insert.columns_stop),
            TokenKind::GeneratedKeyColumn {
                column: key.column.clone(),
            },
        ));
    }

    let mut rows = Vec::with_capacity(insert.rows.len());
    for (index, row) in insert.rows.iter().enumerate() {
        let span = row.span;
        let head = sql
            .get(span.start..span.stop.saturating_sub(1))
            .filter(|_| span.stop > span.start)
            .ok_or(RewriteError::SpanOutOfBounds {
                start: span.start,
                stop: span.stop,
                len: sql.len(),
            })?;
        let key = keys.and_then(|k| k.values.get(index)).map(|v| {
            if parameterised {
                "?".to_string()
            } else {
                v.to_sql_literal()
            }
        });
        rows.push(InsertValueRow {
            head: head.to_string(),
            key,
        });
    }
    let start = insert.rows.first().map_or(0, |r| r.span.start);
    let stop = insert.rows.last().map_or(0, |r| r.span.stop);
    tokens.push(SqlToken::new(
        Span::new(start, stop),
        TokenKind::InsertValues { rows },
    ));

    let owned: HashSet<usize> = row_params.iter().flatten().copied().collect();
    let first_owned = owned.iter().min().copied();
    let (prefix, suffix): (Vec<usize>, Vec<usize>) = (0..params.len())
        .filter(|i| !owned.contains(i))
        .partition(|i| first_owned.is_some_and(|f| *i < f));

    Ok(Some(InsertLayout {
        prefix,
        rows: row_params,
        suffix,
        keys: if parameterised {
            keys.map(|k| k.values.clone())
        } else {
            None
        },
    }))
}
