//! # Routing Engine
//!
//! Computes the physical data nodes a statement must touch.
//!
//! ## Algorithm
//!
//! 1. Extract sharding conditions from the WHERE clause (or take hints).
//! 2. Per sharded table and condition group, resolve the database strategy
//!    to data sources and then the table strategy to actual tables.
//! 3. Align binding tables position by position; fall back to the
//!    cartesian product of per-table placements when they do not align.
//! 4. Attach broadcast and unsharded tables to every unit.
//!
//! Unit order is the configured data-node order of the first sharded table.

use super::condition::{self, ColumnCondition, ConditionGroup, ShardingConditions};
use crate::domain::{
    invariant_unique_route_units, ExprValue, GeneratedKey, InsertStatement, ParsedStatement,
    RouteContext, RouteKind, RouteUnit, RoutingError, ShardingContext, ShardingHints,
    ShardingLevel, ShardingRule, ShardingStrategy, ShardingValue, SqlStatement, TableMapper,
    TableRule, TableSegment, Value,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one strategy level for one condition group.
enum LevelOutcome {
    /// Pruned to these targets.
    Targets(Vec<String>),
    /// No condition: every target.
    All,
    /// Contradictory condition: nothing.
    Nothing,
}

/// Route of one sharded table.
struct TableRoute<'r> {
    rule: &'r TableRule,
    /// Indices into `rule.data_nodes`, ascending.
    positions: Vec<usize>,
    /// Some condition group left the table without any sharding condition.
    unconstrained: bool,
    /// Every node was selected without pruning.
    full: bool,
}

/// A table's (or aligned binding group's) presence on one data source.
#[derive(Clone)]
struct Placement {
    data_source: String,
    mappers: Vec<TableMapper>,
}

/// Routing engine over an immutable, shared rule.
#[derive(Clone)]
pub struct RoutingEngine {
    rule: Arc<ShardingRule>,
}

impl RoutingEngine {
    /// Create an engine.
    pub fn new(rule: Arc<ShardingRule>) -> Self {
        Self { rule }
    }

    /// The rule in use.
    pub fn rule(&self) -> &ShardingRule {
        &self.rule
    }

    /// Route a parsed statement with its bound parameters.
    pub fn route(
        &self,
        parsed: &ParsedStatement,
        params: &[Value],
    ) -> Result<RouteContext, RoutingError> {
        let context = match &parsed.statement {
            SqlStatement::Insert(insert) => self.route_insert(insert, &parsed.hints, params)?,
            statement => self.route_tables(statement, &parsed.hints, params)?,
        };
        debug_assert!(invariant_unique_route_units(&context.units));
        debug!(
            statement = parsed.statement.kind(),
            kind = context.kind.label(),
            units = context.units.len(),
            "Statement routed"
        );
        Ok(context)
    }

    /// SELECT, UPDATE, DELETE and DDL.
    fn route_tables(
        &self,
        statement: &SqlStatement,
        hints: &ShardingHints,
        params: &[Value],
    ) -> Result<RouteContext, RoutingError> {
        let tables = statement.tables();
        let (sharded, broadcast, single) = self.classify(&tables);
        if sharded.is_empty() {
            return self.route_unsharded(statement.is_query(), &broadcast, &single);
        }

        let is_ddl = matches!(statement, SqlStatement::Ddl(_));
        let conditions = if is_ddl {
            ShardingConditions::None
        } else {
            condition::extract(statement.where_clause(), &tables, &self.rule, params)?
        };

        let mut routes = Vec::with_capacity(sharded.len());
        for table in &sharded {
            let rule = self
                .rule
                .table_rule(&table.name)
                .ok_or_else(|| RoutingError::EmptyRoute(table.name.clone()))?;
            let route = if is_ddl {
                Self::full_route(rule)
            } else {
                self.route_table(rule, &conditions, hints)?
            };

            if matches!(statement, SqlStatement::Update(_) | SqlStatement::Delete(_))
                && route.unconstrained
                && rule.data_nodes.len() > 1
            {
                return Err(RoutingError::UnroutableMutation {
                    kind: statement.kind().to_string(),
                    table: rule.logic_table.clone(),
                });
            }
            if route.unconstrained && rule.data_nodes.len() > 1 && !is_ddl {
                warn!(
                    table = %rule.logic_table,
                    nodes = rule.data_nodes.len(),
                    "No usable sharding condition, broadcasting to every data node"
                );
            }
            routes.push(route);
        }

        let broadcast_route = routes.iter().any(|r| r.full);
        let (sets, misaligned) = self.align(&routes);
        let mut cartesian = sets.len() > 1;
        if misaligned {
            warn!(
                tables = ?sharded.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "Binding tables not aligned, routing the cartesian product"
            );
        }
        if !single.is_empty() {
            cartesian = true;
            warn!(
                unsharded = ?single.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "Sharded table joined with unsharded tables, routing the cartesian product"
            );
        }

        let mut units = Self::combine(sets);
        if units.is_empty() {
            return Err(RoutingError::EmptyRoute(sharded[0].name.clone()));
        }
        for unit in &mut units {
            for t in broadcast.iter().chain(single.iter()) {
                unit.table_mappers.push(Self::identity_mapper(t));
            }
        }

        let kind = if units.len() == 1 {
            RouteKind::Single
        } else if cartesian {
            RouteKind::Cartesian
        } else if broadcast_route {
            RouteKind::Broadcast
        } else {
            RouteKind::Pruned
        };
        Ok(RouteContext::new(units, kind))
    }

    /// Split referenced tables into sharded, broadcast and unsharded,
    /// each deduplicated by name in textual order.
    fn classify<'s>(
        &self,
        tables: &[&'s TableSegment],
    ) -> (
        Vec<&'s TableSegment>,
        Vec<&'s TableSegment>,
        Vec<&'s TableSegment>,
    ) {
        let mut seen = HashSet::new();
        let (mut sharded, mut broadcast, mut single) = (Vec::new(), Vec::new(), Vec::new());
        for table in tables {
            if !seen.insert(table.name.to_ascii_lowercase()) {
                continue;
            }
            if self.rule.is_sharded(&table.name) {
                sharded.push(*table);
            } else if self.rule.is_broadcast(&table.name) {
                broadcast.push(*table);
            } else {
                single.push(*table);
            }
        }
        (sharded, broadcast, single)
    }

    fn identity_mapper(table: &TableSegment) -> TableMapper {
        TableMapper::new(table.name.to_ascii_lowercase(), table.name.clone())
    }

    /// Statements touching no sharded table.
    fn route_unsharded(
        &self,
        is_query: bool,
        broadcast: &[&TableSegment],
        single: &[&TableSegment],
    ) -> Result<RouteContext, RoutingError> {
        let mappers: Vec<TableMapper> = broadcast
            .iter()
            .chain(single.iter())
            .map(|t| Self::identity_mapper(t))
            .collect();

        if single.is_empty() && !broadcast.is_empty() && !is_query {
            let units: Vec<RouteUnit> = self
                .rule
                .data_sources()
                .iter()
                .map(|ds| RouteUnit::new(ds.clone(), mappers.clone()))
                .collect();
            if units.is_empty() {
                return Err(RoutingError::EmptyRoute(broadcast[0].name.clone()));
            }
            let kind = if units.len() == 1 {
                RouteKind::Single
            } else {
                RouteKind::Broadcast
            };
            return Ok(RouteContext::new(units, kind));
        }

        let data_source = match (self.rule.default_data_source(), single.first()) {
            (Some(ds), _) => ds.to_string(),
            (None, Some(table)) => return Err(RoutingError::NoDefaultDataSource(table.name.clone())),
            (None, None) => self
                .rule
                .data_sources()
                .first()
                .cloned()
                .ok_or_else(|| RoutingError::NoDefaultDataSource("<none>".to_string()))?,
        };
        Ok(RouteContext::new(
            vec![RouteUnit::new(data_source, mappers)],
            RouteKind::Default,
        ))
    }

    fn full_route(rule: &TableRule) -> TableRoute<'_> {
        TableRoute {
            rule,
            positions: (0..rule.data_nodes.len()).collect(),
            unconstrained: true,
            full: true,
        }
    }

    /// Route one sharded table through its strategies.
    fn route_table<'r>(
        &self,
        rule: &'r TableRule,
        conditions: &ShardingConditions,
        hints: &ShardingHints,
    ) -> Result<TableRoute<'r>, RoutingError> {
        let db_hint = hints.database_values(&rule.logic_table);
        let table_hint = hints.table_values(&rule.logic_table);
        let groups: Vec<Option<&ConditionGroup>> = match conditions {
            _ if db_hint.is_some() || table_hint.is_some() => vec![None],
            ShardingConditions::Groups(groups) => groups.iter().map(Some).collect(),
            ShardingConditions::None | ShardingConditions::TooComplex => vec![None],
        };

        let all_sources = rule.data_sources();
        let mut selected = vec![false; rule.data_nodes.len()];
        let mut unconstrained = false;
        let mut live_groups = 0usize;

        for group in groups {
            let db = resolve_level(
                &rule.database_strategy,
                ShardingLevel::Database,
                rule,
                &all_sources,
                group,
                db_hint,
            )?;
            let (sources, db_all) = match db {
                LevelOutcome::Nothing => continue,
                LevelOutcome::All => (all_sources.clone(), true),
                LevelOutcome::Targets(t) => (t, false),
            };

            let mut table_all = true;
            let mut group_live = false;
            for ds in &sources {
                let tables = rule.tables_in(ds);
                let chosen = match resolve_level(
                    &rule.table_strategy,
                    ShardingLevel::Table,
                    rule,
                    &tables,
                    group,
                    table_hint,
                )? {
                    LevelOutcome::Nothing => continue,
                    LevelOutcome::All => tables,
                    LevelOutcome::Targets(t) => {
                        table_all = false;
                        t
                    }
                };
                group_live = true;
                for table in chosen {
                    if let Some(p) = rule.position_of(ds, &table) {
                        selected[p] = true;
                    }
                }
            }
            if group_live || sources.is_empty() {
                live_groups += 1;
            }
            if db_all && table_all && group_live {
                unconstrained = true;
            }
        }

        if live_groups == 0 {
            debug!(table = %rule.logic_table, "Contradictory sharding conditions, routing every node");
            return Ok(TableRoute {
                rule,
                positions: (0..rule.data_nodes.len()).collect(),
                unconstrained: false,
                full: true,
            });
        }

        let positions: Vec<usize> = selected
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.then_some(i))
            .collect();
        if positions.is_empty() {
            return Err(RoutingError::EmptyRoute(rule.logic_table.clone()));
        }
        let full = unconstrained && positions.len() == rule.data_nodes.len();
        debug!(
            table = %rule.logic_table,
            nodes = positions.len(),
            unconstrained,
            "Table routed"
        );
        Ok(TableRoute {
            rule,
            positions,
            unconstrained,
            full,
        })
    }

    /// Group routes into placement sets: aligned binding groups become one
    /// set, every other table its own set.
    fn align(&self, routes: &[TableRoute<'_>]) -> (Vec<Vec<Placement>>, bool) {
        let mut sets = Vec::new();
        let mut misaligned = false;
        let mut done = vec![false; routes.len()];

        for i in 0..routes.len() {
            if done[i] {
                continue;
            }
            let group = self.rule.binding_group_of(&routes[i].rule.logic_table);
            let members: Vec<usize> = (i..routes.len())
                .filter(|j| {
                    !done[*j]
                        && (*j == i
                            || group.is_some()
                                && self.rule.binding_group_of(&routes[*j].rule.logic_table)
                                    == group)
                })
                .collect();
            members.iter().for_each(|j| done[*j] = true);

            let constrained: Vec<&Vec<usize>> = members
                .iter()
                .map(|j| &routes[*j])
                .filter(|r| !r.unconstrained)
                .map(|r| &r.positions)
                .collect();
            let aligned = constrained.windows(2).all(|w| w[0] == w[1]);

            if members.len() > 1 && aligned {
                let primary = routes[members[0]].rule;
                let positions: Vec<usize> = match constrained.first() {
                    Some(p) => (*p).clone(),
                    None => routes[members[0]].positions.clone(),
                };
                sets.push(
                    positions
                        .iter()
                        .map(|p| Placement {
                            data_source: primary.data_nodes[*p].data_source.clone(),
                            mappers: members
                                .iter()
                                .map(|j| {
                                    let rule = routes[*j].rule;
                                    TableMapper::new(
                                        rule.logic_table.clone(),
                                        rule.data_nodes[*p].table.clone(),
                                    )
                                })
                                .collect(),
                        })
                        .collect(),
                );
            } else {
                misaligned |= members.len() > 1;
                for j in members {
                    let route = &routes[j];
                    sets.push(
                        route
                            .positions
                            .iter()
                            .map(|p| {
                                let node = &route.rule.data_nodes[*p];
                                Placement {
                                    data_source: node.data_source.clone(),
                                    mappers: vec![TableMapper::new(
                                        route.rule.logic_table.clone(),
                                        node.table.clone(),
                                    )],
                                }
                            })
                            .collect(),
                    );
                }
            }
        }
        (sets, misaligned)
    }

    /// One unit per placement, or per same-data-source combination of
    /// placements when several sets are involved.
    fn combine(sets: Vec<Vec<Placement>>) -> Vec<RouteUnit> {
        let mut iter = sets.into_iter();
        let Some(first) = iter.next() else {
            return Vec::new();
        };
        let rest: Vec<Vec<Placement>> = iter.collect();
        if rest.is_empty() {
            return first
                .into_iter()
                .map(|p| RouteUnit::new(p.data_source, p.mappers))
                .collect();
        }

        let mut data_sources: Vec<String> = Vec::new();
        for p in &first {
            if !data_sources.contains(&p.data_source) {
                data_sources.push(p.data_source.clone());
            }
        }

        let mut units = Vec::new();
        for ds in data_sources {
            let mut combos: Vec<Vec<TableMapper>> = first
                .iter()
                .filter(|p| p.data_source == ds)
                .map(|p| p.mappers.clone())
                .collect();
            for set in &rest {
                let here: Vec<&Placement> = set.iter().filter(|p| p.data_source == ds).collect();
                combos = combos
                    .iter()
                    .flat_map(|prefix| {
                        here.iter().map(move |p| {
                            let mut m = prefix.clone();
                            m.extend(p.mappers.iter().cloned());
                            m
                        })
                    })
                    .collect();
            }
            units.extend(combos.into_iter().map(|m| RouteUnit::new(ds.clone(), m)));
        }
        units
    }

    /// INSERT: every row to exactly one node.
    fn route_insert(
        &self,
        insert: &InsertStatement,
        hints: &ShardingHints,
        params: &[Value],
    ) -> Result<RouteContext, RoutingError> {
        let Some(rule) = self.rule.table_rule(&insert.table.name) else {
            let table = &insert.table;
            return if self.rule.is_broadcast(&table.name) {
                self.route_unsharded(false, &[table], &[])
            } else {
                self.route_unsharded(false, &[], &[table])
            };
        };
        if insert.rows.is_empty() {
            return Err(RoutingError::EmptyRoute(rule.logic_table.clone()));
        }

        let generated_key = match &rule.key_generate {
            // Without a column list the key position is unknown.
            Some(kg)
                if !insert.columns.is_empty()
                    && !insert
                        .columns
                        .iter()
                        .any(|c| c.name.eq_ignore_ascii_case(&kg.column)) =>
            {
                let values = (0..insert.rows.len())
                    .map(|_| {
                        kg.generator
                            .generate()
                            .map_err(|e| RoutingError::KeyGeneration {
                                table: rule.logic_table.clone(),
                                column: kg.column.clone(),
                                reason: e.to_string(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Some(GeneratedKey {
                    column: kg.column.clone(),
                    values,
                })
            }
            _ => None,
        };

        let sharding_columns = rule.sharding_columns();
        let is_sharding = |name: &str| sharding_columns.iter().any(|c| c.eq_ignore_ascii_case(name));

        let mut rows_by_position: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (row_index, row) in insert.rows.iter().enumerate() {
            let mut group = ConditionGroup::default();
            for (column, value) in insert.columns.iter().zip(&row.values) {
                if !is_sharding(&column.name) {
                    continue;
                }
                let value = match value {
                    ExprValue::Literal(v) => v.clone(),
                    ExprValue::Parameter(i) => {
                        params
                            .get(*i)
                            .cloned()
                            .ok_or(RoutingError::MissingParameter {
                                index: *i,
                                bound: params.len(),
                            })?
                    }
                    ExprValue::Complex => continue,
                };
                group.add(
                    &rule.logic_table,
                    &column.name,
                    ColumnCondition::Value(ShardingValue::List(vec![value])),
                );
            }
            if let Some(key) = &generated_key {
                if is_sharding(&key.column) {
                    if let Some(v) = key.values.get(row_index) {
                        group.add(
                            &rule.logic_table,
                            &key.column,
                            ColumnCondition::Value(ShardingValue::List(vec![v.clone()])),
                        );
                    }
                }
            }

            let route =
                self.route_table(rule, &ShardingConditions::Groups(vec![group]), hints)?;
            if route.positions.len() != 1 {
                return Err(RoutingError::AmbiguousInsertRow {
                    row: row_index,
                    table: rule.logic_table.clone(),
                    resolved: route.positions.len(),
                });
            }
            rows_by_position
                .entry(route.positions[0])
                .or_default()
                .push(row_index);
        }

        let units: Vec<RouteUnit> = rows_by_position
            .into_iter()
            .map(|(position, rows)| {
                let node = &rule.data_nodes[position];
                let mut unit = RouteUnit::new(
                    node.data_source.clone(),
                    vec![TableMapper::new(rule.logic_table.clone(), node.table.clone())],
                );
                unit.insert_rows = rows;
                unit
            })
            .collect();
        let kind = if units.len() == 1 {
            RouteKind::Single
        } else {
            RouteKind::Pruned
        };
        Ok(RouteContext {
            units,
            kind,
            generated_key,
        })
    }
}

/// Keep `targets` order, filtered to names the algorithm returned.
fn in_target_order(targets: &[String], chosen: &[String]) -> Vec<String> {
    targets
        .iter()
        .filter(|t| chosen.iter().any(|c| c.eq_ignore_ascii_case(t)))
        .cloned()
        .collect()
}

fn resolve_level(
    strategy: &ShardingStrategy,
    level: ShardingLevel,
    rule: &TableRule,
    targets: &[String],
    group: Option<&ConditionGroup>,
    hint: Option<&[Value]>,
) -> Result<LevelOutcome, RoutingError> {
    let Some(algorithm) = strategy.algorithm() else {
        return Ok(LevelOutcome::All);
    };

    if let Some(values) = hint {
        let ctx = ShardingContext {
            logic_table: &rule.logic_table,
            column: strategy.columns().first().copied().unwrap_or(""),
            level,
        };
        let chosen =
            algorithm.do_sharding(targets, &ShardingValue::List(values.to_vec()), &ctx)?;
        return Ok(LevelOutcome::Targets(in_target_order(targets, &chosen)));
    }

    let Some(group) = group else {
        return Ok(LevelOutcome::All);
    };

    let mut chosen: Vec<String> = Vec::new();
    let mut constrained = false;
    for column in strategy.columns() {
        match group.get(&rule.logic_table, column) {
            None => {}
            Some(ColumnCondition::AlwaysFalse) => return Ok(LevelOutcome::Nothing),
            Some(ColumnCondition::Value(value)) => {
                constrained = true;
                let ctx = ShardingContext {
                    logic_table: &rule.logic_table,
                    column,
                    level,
                };
                for name in algorithm.do_sharding(targets, value, &ctx)? {
                    if !chosen.contains(&name) {
                        chosen.push(name);
                    }
                }
            }
        }
    }
    if !constrained {
        return Ok(LevelOutcome::All);
    }
    Ok(LevelOutcome::Targets(in_target_order(targets, &chosen)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{AlgorithmRegistry, KeyGeneratorRegistry};
    use crate::config::{AlgorithmConfig, ShardingRuleConfig, StrategyConfig, TableRuleConfig};
    use crate::domain::{
        ColumnSegment, CompareOp, DdlStatement, DeleteStatement, InsertRow, Predicate,
        SelectStatement, Span, UpdateStatement,
    };

    /// orders/order_item: ds by user_id % 2, table by order_id % 2.
    /// t_user: table by user_id via HASH_MOD over 4 tables on ds_0.
    fn engine() -> RoutingEngine {
        let config = ShardingRuleConfig::new(&["ds_0", "ds_1"])
            .table(
                TableRuleConfig::new("orders", "ds_${0..1}.orders_${0..1}")
                    .with_database_strategy(StrategyConfig::standard("user_id", "db_mod"))
                    .with_table_strategy(StrategyConfig::standard("order_id", "t_mod")),
            )
            .table(
                TableRuleConfig::new("order_item", "ds_${0..1}.order_item_${0..1}")
                    .with_database_strategy(StrategyConfig::standard("user_id", "db_mod"))
                    .with_table_strategy(StrategyConfig::standard("order_id", "t_mod")),
            )
            .table(
                TableRuleConfig::new("t_user", "ds_0.t_user_${0..3}")
                    .with_table_strategy(StrategyConfig::standard("user_id", "hash")),
            )
            .algorithm("db_mod", AlgorithmConfig::new("MOD", &[("sharding-count", "2")]))
            .algorithm("t_mod", AlgorithmConfig::new("MOD", &[("sharding-count", "2")]))
            .algorithm("hash", AlgorithmConfig::new("HASH_MOD", &[("sharding-count", "4")]))
            .binding_group(&["orders", "order_item"])
            .broadcast_table("t_dict")
            .default_data_source("ds_0");
        let rule = ShardingRule::from_config(
            &config,
            &AlgorithmRegistry::with_builtins(),
            &KeyGeneratorRegistry::default(),
        )
        .unwrap();
        RoutingEngine::new(Arc::new(rule))
    }

    fn table(name: &str) -> TableSegment {
        TableSegment::new(name, Span::new(0, name.len()))
    }

    fn eq(column: &str, v: i64) -> Predicate {
        Predicate::eq(ColumnSegment::new(column), ExprValue::Literal(Value::Int(v)))
    }

    fn select(tables: &[&str], where_clause: Option<Predicate>) -> ParsedStatement {
        ParsedStatement::new(
            "",
            SqlStatement::Select(SelectStatement {
                tables: tables.iter().map(|t| table(t)).collect(),
                where_clause,
                ..Default::default()
            }),
        )
    }

    fn described(ctx: &RouteContext) -> Vec<String> {
        ctx.units.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn test_fully_pruned_select() {
        let ctx = engine()
            .route(
                &select(&["orders"], Some(Predicate::And(vec![eq("user_id", 3), eq("order_id", 4)]))),
                &[],
            )
            .unwrap();
        assert_eq!(described(&ctx), vec!["ds_1[orders_0]"]);
        assert_eq!(ctx.kind, RouteKind::Single);
    }

    #[test]
    fn test_database_only_pruning() {
        let ctx = engine()
            .route(&select(&["orders"], Some(eq("user_id", 2))), &[])
            .unwrap();
        assert_eq!(described(&ctx), vec!["ds_0[orders_0]", "ds_0[orders_1]"]);
        assert_eq!(ctx.kind, RouteKind::Pruned);
    }

    #[test]
    fn test_broadcast_without_condition() {
        let ctx = engine().route(&select(&["orders"], None), &[]).unwrap();
        assert_eq!(ctx.units.len(), 4);
        assert_eq!(ctx.kind, RouteKind::Broadcast);
        assert_eq!(
            described(&ctx),
            vec![
                "ds_0[orders_0]",
                "ds_0[orders_1]",
                "ds_1[orders_0]",
                "ds_1[orders_1]"
            ]
        );
    }

    #[test]
    fn test_or_branch_without_condition_broadcasts() {
        let pred = Predicate::Or(vec![eq("user_id", 1), eq("status", 1)]);
        let ctx = engine().route(&select(&["orders"], Some(pred)), &[]).unwrap();
        assert_eq!(ctx.units.len(), 4);
    }

    #[test]
    fn test_in_list_unions_targets() {
        let pred = Predicate::In {
            column: ColumnSegment::new("user_id"),
            values: vec![
                ExprValue::Literal(Value::Int(1)),
                ExprValue::Parameter(0),
            ],
            negated: false,
        };
        let ctx = engine()
            .route(&select(&["t_user"], Some(pred)), &[Value::Int(1)])
            .unwrap();
        assert_eq!(ctx.units.len(), 1);
    }

    #[test]
    fn test_hash_range_is_rejected() {
        let pred = Predicate::Compare {
            column: ColumnSegment::new("user_id"),
            op: CompareOp::Gt,
            value: ExprValue::Literal(Value::Int(5)),
        };
        let err = engine()
            .route(&select(&["t_user"], Some(pred)), &[])
            .unwrap_err();
        assert!(matches!(err, RoutingError::UnsupportedOperator { .. }));
    }

    #[test]
    fn test_contradiction_routes_every_node() {
        let pred = Predicate::And(vec![eq("user_id", 1), eq("user_id", 2)]);
        let ctx = engine().route(&select(&["orders"], Some(pred)), &[]).unwrap();
        assert_eq!(ctx.units.len(), 4);
    }

    #[test]
    fn test_reversed_between_routes_every_node() {
        let pred = Predicate::Between {
            column: ColumnSegment::new("user_id"),
            low: ExprValue::Literal(Value::Int(10)),
            high: ExprValue::Literal(Value::Int(5)),
        };
        let ctx = engine().route(&select(&["orders"], Some(pred)), &[]).unwrap();
        assert_eq!(ctx.units.len(), 4);
    }

    #[test]
    fn test_hints_bypass_predicates() {
        let mut hints = ShardingHints::default();
        hints.add_database_value("orders", 1);
        hints.add_table_value("orders", 1);
        let parsed = select(&["orders"], Some(eq("user_id", 0))).with_hints(hints);
        let ctx = engine().route(&parsed, &[]).unwrap();
        assert_eq!(described(&ctx), vec!["ds_1[orders_1]"]);
    }

    #[test]
    fn test_binding_tables_align() {
        let pred = Predicate::And(vec![eq("user_id", 1), eq("order_id", 1)]);
        let ctx = engine()
            .route(&select(&["orders", "order_item"], Some(pred)), &[])
            .unwrap();
        assert_eq!(described(&ctx), vec!["ds_1[orders_1,order_item_1]"]);
    }

    #[test]
    fn test_binding_tables_broadcast_together() {
        let ctx = engine()
            .route(&select(&["orders", "order_item"], None), &[])
            .unwrap();
        assert_eq!(ctx.units.len(), 4);
        assert_eq!(ctx.kind, RouteKind::Broadcast);
        assert_eq!(described(&ctx)[3], "ds_1[orders_1,order_item_1]");
    }

    #[test]
    fn test_unbound_tables_are_cartesian() {
        let ctx = engine()
            .route(&select(&["orders", "t_user"], Some(eq("order_id", 0))), &[])
            .unwrap();
        // orders_0 on ds_0 and ds_1; t_user only on ds_0 (4 tables, unconstrained).
        assert_eq!(ctx.kind, RouteKind::Cartesian);
        assert_eq!(ctx.units.len(), 4);
        assert!(ctx.units.iter().all(|u| u.data_source == "ds_0"));
    }

    #[test]
    fn test_broadcast_table_joins_every_unit() {
        let ctx = engine()
            .route(&select(&["orders", "t_dict"], Some(eq("user_id", 1))), &[])
            .unwrap();
        assert_eq!(ctx.units.len(), 2);
        assert!(ctx
            .units
            .iter()
            .all(|u| u.actual_table("t_dict") == Some("t_dict")));
    }

    #[test]
    fn test_unsharded_tables() {
        let ctx = engine().route(&select(&["t_single"], None), &[]).unwrap();
        assert_eq!(described(&ctx), vec!["ds_0[t_single]"]);
        assert_eq!(ctx.kind, RouteKind::Default);

        let ctx = engine().route(&select(&["t_dict"], None), &[]).unwrap();
        assert_eq!(ctx.units.len(), 1);

        let parsed = ParsedStatement::new(
            "",
            SqlStatement::Delete(DeleteStatement {
                table: table("t_dict"),
                owners: Vec::new(),
                where_clause: None,
            }),
        );
        let ctx = engine().route(&parsed, &[]).unwrap();
        assert_eq!(ctx.units.len(), 2);
        assert_eq!(ctx.kind, RouteKind::Broadcast);
    }

    #[test]
    fn test_unroutable_mutation() {
        let parsed = ParsedStatement::new(
            "",
            SqlStatement::Update(UpdateStatement {
                table: table("orders"),
                owners: Vec::new(),
                where_clause: Some(eq("status", 1)),
            }),
        );
        let err = engine().route(&parsed, &[]).unwrap_err();
        assert_eq!(
            err,
            RoutingError::UnroutableMutation {
                kind: "UPDATE".into(),
                table: "orders".into()
            }
        );

        let parsed = ParsedStatement::new(
            "",
            SqlStatement::Delete(DeleteStatement {
                table: table("orders"),
                owners: Vec::new(),
                where_clause: Some(Predicate::And(vec![eq("user_id", 1), eq("order_id", 2)])),
            }),
        );
        assert_eq!(engine().route(&parsed, &[]).unwrap().units.len(), 1);
    }

    #[test]
    fn test_ddl_routes_every_node() {
        let parsed = ParsedStatement::new(
            "",
            SqlStatement::Ddl(DdlStatement {
                tables: vec![table("orders")],
            }),
        );
        let ctx = engine().route(&parsed, &[]).unwrap();
        assert_eq!(ctx.units.len(), 4);
        assert_eq!(ctx.kind, RouteKind::Broadcast);
    }

    fn insert(rows: Vec<Vec<ExprValue>>) -> ParsedStatement {
        ParsedStatement::new(
            "",
            SqlStatement::Insert(InsertStatement {
                table: table("orders"),
                columns: vec![ColumnSegment::new("user_id"), ColumnSegment::new("order_id")],
                columns_stop: 0,
                rows: rows
                    .into_iter()
                    .map(|values| InsertRow {
                        values,
                        span: Span::new(0, 0),
                    })
                    .collect(),
            }),
        )
    }

    #[test]
    fn test_insert_rows_grouped_by_node() {
        let lit = |v| ExprValue::Literal(Value::Int(v));
        let parsed = insert(vec![
            vec![lit(1), lit(1)],
            vec![lit(0), lit(0)],
            vec![ExprValue::Parameter(0), ExprValue::Parameter(1)],
        ]);
        let ctx = engine()
            .route(&parsed, &[Value::Int(3), Value::Int(5)])
            .unwrap();
        assert_eq!(described(&ctx), vec!["ds_0[orders_0]", "ds_1[orders_1]"]);
        assert_eq!(ctx.units[0].insert_rows, vec![1]);
        assert_eq!(ctx.units[1].insert_rows, vec![0, 2]);
        assert!(ctx.generated_key.is_none());
    }

    #[test]
    fn test_insert_row_must_resolve_to_one_node() {
        let parsed = insert(vec![vec![
            ExprValue::Literal(Value::Int(1)),
            ExprValue::Complex,
        ]]);
        let err = engine().route(&parsed, &[]).unwrap_err();
        assert_eq!(
            err,
            RoutingError::AmbiguousInsertRow {
                row: 0,
                table: "orders".into(),
                resolved: 2
            }
        );
    }
}
