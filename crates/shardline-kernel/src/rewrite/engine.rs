//! # Rewrite Engine
//!
//! Turns a routed statement into one `ExecutionUnit` per route unit.

use super::builder::assemble;
use super::generator::generate;
use crate::domain::{ExecutionUnit, ParsedStatement, RewriteError, RouteContext, SelectShape, Value};
use tracing::{debug, info};

/// Rewritten units plus the shape the merger needs.
#[derive(Clone, Debug, PartialEq)]
pub struct RewriteResult {
    /// Units in route order; `index` matches the position.
    pub units: Vec<ExecutionUnit>,
    /// Merge shape.
    pub shape: SelectShape,
}

/// Rewrite engine.
#[derive(Clone, Debug, Default)]
pub struct RewriteEngine {
    sql_show: bool,
}

impl RewriteEngine {
    /// Create an engine; `sql_show` logs every rewritten unit at info.
    pub fn new(sql_show: bool) -> Self {
        Self { sql_show }
    }

    /// Rewrite for every unit of `route`.
    pub fn rewrite(
        &self,
        parsed: &ParsedStatement,
        params: &[Value],
        route: &RouteContext,
    ) -> Result<RewriteResult, RewriteError> {
        let plan = generate(parsed, params, route)?;
        debug!(
            tokens = plan.tokens.len(),
            derived_columns = plan.shape.derived_columns,
            units = route.units.len(),
            "Rewrite plan ready"
        );

        let mut units = Vec::with_capacity(route.units.len());
        for (index, route_unit) in route.units.iter().enumerate() {
            let sql = assemble(&parsed.sql, &plan.tokens, |t| t.render(route_unit))?;
            let parameters = plan.parameters_for(route_unit, params);
            if self.sql_show {
                info!(
                    unit = index,
                    data_source = %route_unit.data_source,
                    sql = %sql,
                    parameters = parameters.len(),
                    "Actual SQL"
                );
            }
            units.push(ExecutionUnit {
                index,
                route_unit: route_unit.clone(),
                sql,
                parameters,
            });
        }
        Ok(RewriteResult {
            units,
            shape: plan.shape,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ColumnSegment, DeleteStatement, ExprValue, Predicate, RouteKind, RouteUnit,
        SelectStatement, Span, SqlStatement, TableMapper, TableSegment, TokenKind,
    };

    fn join_statement() -> ParsedStatement {
        let sql = "SELECT orders.id FROM orders JOIN order_item ON orders.id = order_item.order_id";
        let select = SelectStatement {
            tables: vec![
                TableSegment::new("orders", Span::new(22, 28)),
                TableSegment::new("order_item", Span::new(34, 44)),
            ],
            owners: vec![
                TableSegment::new("orders", Span::new(7, 13)),
                TableSegment::new("orders", Span::new(48, 54)),
                TableSegment::new("order_item", Span::new(60, 70)),
            ],
            ..Default::default()
        };
        ParsedStatement::new(sql, SqlStatement::Select(select))
    }

    #[test]
    fn test_identity_law() {
        let parsed = join_statement();
        let route = RouteContext::new(
            vec![RouteUnit::new("ds_0", Vec::new())],
            RouteKind::Default,
        );
        let plan = generate(&parsed, &[], &route).unwrap();
        assert_eq!(plan.tokens.len(), 5);
        let original = assemble(&parsed.sql, &plan.tokens, |t| match &t.kind {
            TokenKind::Table { logic_table, .. } => logic_table.clone(),
            _ => parsed.sql[t.span.start..t.span.stop].to_string(),
        })
        .unwrap();
        assert_eq!(original, parsed.sql);
    }

    #[test]
    fn test_owners_renamed_with_tables() {
        let parsed = join_statement();
        let route = RouteContext::new(
            vec![
                RouteUnit::new(
                    "ds_0",
                    vec![
                        TableMapper::new("orders", "orders_0"),
                        TableMapper::new("order_item", "order_item_0"),
                    ],
                ),
                RouteUnit::new(
                    "ds_1",
                    vec![
                        TableMapper::new("orders", "orders_1"),
                        TableMapper::new("order_item", "order_item_1"),
                    ],
                ),
            ],
            RouteKind::Broadcast,
        );
        let result = RewriteEngine::new(true).rewrite(&parsed, &[], &route).unwrap();
        assert_eq!(result.units.len(), 2);
        assert_eq!(result.units[1].index, 1);
        assert_eq!(
            result.units[1].sql,
            "SELECT orders_1.id FROM orders_1 JOIN order_item_1 ON orders_1.id = order_item_1.order_id"
        );
        assert_eq!(result.shape, SelectShape::default());
    }

    #[test]
    fn test_parameters_pass_through() {
        let sql = "DELETE FROM orders WHERE user_id = ?";
        let parsed = ParsedStatement::new(
            sql,
            SqlStatement::Delete(DeleteStatement {
                table: TableSegment::new("orders", Span::new(12, 18)),
                owners: Vec::new(),
                where_clause: Some(Predicate::eq(
                    ColumnSegment::new("user_id"),
                    ExprValue::Parameter(0),
                )),
            }),
        );
        let route = RouteContext::new(
            vec![RouteUnit::new("ds_1", vec![TableMapper::new("orders", "orders_1")])],
            RouteKind::Single,
        );
        let result = RewriteEngine::default()
            .rewrite(&parsed, &[Value::Int(37)], &route)
            .unwrap();
        assert_eq!(result.units[0].sql, "DELETE FROM orders_1 WHERE user_id = ?");
        assert_eq!(result.units[0].parameters, vec![Value::Int(37)]);
    }

    #[test]
    fn test_overlapping_tokens_rejected() {
        let sql = "SELECT * FROM orders";
        let select = SelectStatement {
            tables: vec![TableSegment::new("orders", Span::new(14, 20))],
            owners: vec![TableSegment::new("orders", Span::new(15, 20))],
            ..Default::default()
        };
        let parsed = ParsedStatement::new(sql, SqlStatement::Select(select));
        let route = RouteContext::new(vec![RouteUnit::new("ds_0", Vec::new())], RouteKind::Default);
        assert!(matches!(
            RewriteEngine::default().rewrite(&parsed, &[], &route),
            Err(RewriteError::OverlappingTokens { .. })
        ));
    }
}
