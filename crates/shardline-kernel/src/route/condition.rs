//! # Sharding Condition Extraction
//!
//! Normalises a WHERE clause into OR-of-AND groups and keeps, per group, the
//! value constraint on each sharding column. Predicates the router cannot
//! use (`<>`, `NOT IN`, `LIKE`, subqueries, column-to-column comparisons)
//! are dropped, which only ever widens the route.

use crate::domain::{
    CompareOp, ColumnSegment, ExprValue, Predicate, RoutingError, ShardingRule, ShardingValue,
    TableSegment, Value,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Bound;

/// Upper bound on OR-of-AND groups before giving up and broadcasting.
pub const MAX_CONDITION_GROUPS: usize = 64;

/// Constraint on one column inside one AND group.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnCondition {
    /// Sharding value to hand to the algorithm.
    Value(ShardingValue),
    /// Contradictory conditions; the group matches nothing.
    AlwaysFalse,
}

/// One AND group: `(logic table, column) -> condition`, both lowercase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConditionGroup {
    conditions: HashMap<(String, String), ColumnCondition>,
}

impl ConditionGroup {
    /// Condition on a column of a table.
    pub fn get(&self, table: &str, column: &str) -> Option<&ColumnCondition> {
        self.conditions
            .get(&(table.to_ascii_lowercase(), column.to_ascii_lowercase()))
    }

    /// Does the group constrain any column of `table`?
    pub fn constrains(&self, table: &str) -> bool {
        let table = table.to_ascii_lowercase();
        self.conditions.keys().any(|(t, _)| *t == table)
    }

    /// Add a condition, intersecting with any existing one.
    pub fn add(&mut self, table: &str, column: &str, condition: ColumnCondition) {
        let key = (table.to_ascii_lowercase(), column.to_ascii_lowercase());
        let merged = match self.conditions.remove(&key) {
            Some(existing) => intersect(existing, condition),
            None => condition,
        };
        self.conditions.insert(key, merged);
    }
}

/// Result of extraction.
#[derive(Clone, Debug, PartialEq)]
pub enum ShardingConditions {
    /// No WHERE clause, or nothing usable in it.
    None,
    /// OR-of-AND groups. A group without a condition for a table means that
    /// table is unconstrained for the group.
    Groups(Vec<ConditionGroup>),
    /// Too many groups to enumerate.
    TooComplex,
}

/// Atom of a normalised predicate.
#[derive(Clone, Debug)]
struct Atom {
    column: ColumnSegment,
    condition: ColumnCondition,
}

fn resolve(value: &ExprValue, params: &[Value]) -> Result<Option<Value>, RoutingError> {
    match value {
        ExprValue::Literal(v) => Ok(Some(v.clone())),
        ExprValue::Parameter(i) => params
            .get(*i)
            .cloned()
            .map(Some)
            .ok_or(RoutingError::MissingParameter {
                index: *i,
                bound: params.len(),
            }),
        ExprValue::Complex => Ok(None),
    }
}

fn atom(predicate: &Predicate, params: &[Value]) -> Result<Option<Atom>, RoutingError> {
    let made = |column: &ColumnSegment, value: ShardingValue| Atom {
        column: column.clone(),
        condition: match &value {
            ShardingValue::Range { lower, upper } if range_is_empty(lower, upper) => {
                ColumnCondition::AlwaysFalse
            }
            _ => ColumnCondition::Value(value),
        },
    };
    Ok(match predicate {
        Predicate::Compare { column, op, value } => {
            let Some(v) = resolve(value, params)? else {
                return Ok(None);
            };
            let range = |lower, upper| ShardingValue::Range { lower, upper };
            match op {
                CompareOp::Eq => Some(made(column, ShardingValue::List(vec![v]))),
                CompareOp::Ne => None,
                CompareOp::Lt => Some(made(column, range(Bound::Unbounded, Bound::Excluded(v)))),
                CompareOp::Le => Some(made(column, range(Bound::Unbounded, Bound::Included(v)))),
                CompareOp::Gt => Some(made(column, range(Bound::Excluded(v), Bound::Unbounded))),
                CompareOp::Ge => Some(made(column, range(Bound::Included(v), Bound::Unbounded))),
            }
        }
        Predicate::In {
            column,
            values,
            negated: false,
        } => {
            let mut resolved = Vec::with_capacity(values.len());
            for v in values {
                match resolve(v, params)? {
                    Some(v) if !resolved.contains(&v) => resolved.push(v),
                    Some(_) => {}
                    None => return Ok(None),
                }
            }
            Some(made(column, ShardingValue::List(resolved)))
        }
        Predicate::Between { column, low, high } => {
            match (resolve(low, params)?, resolve(high, params)?) {
                (Some(lo), Some(hi)) => Some(made(
                    column,
                    ShardingValue::Range {
                        lower: Bound::Included(lo),
                        upper: Bound::Included(hi),
                    },
                )),
                _ => None,
            }
        }
        _ => None,
    })
}

/// Disjunctive normal form: each inner Vec is one conjunction of atoms.
fn normalise(
    predicate: &Predicate,
    params: &[Value],
) -> Result<Option<Vec<Vec<Atom>>>, RoutingError> {
    match predicate {
        Predicate::And(children) => {
            let mut acc: Vec<Vec<Atom>> = vec![Vec::new()];
            for child in children {
                let Some(child_groups) = normalise(child, params)? else {
                    return Ok(None);
                };
                if acc.len() * child_groups.len() > MAX_CONDITION_GROUPS {
                    return Ok(None);
                }
                acc = acc
                    .iter()
                    .flat_map(|left| {
                        child_groups.iter().map(move |right| {
                            let mut merged = left.clone();
                            merged.extend(right.iter().cloned());
                            merged
                        })
                    })
                    .collect();
            }
            Ok(Some(acc))
        }
        Predicate::Or(children) => {
            let mut acc = Vec::new();
            for child in children {
                let Some(child_groups) = normalise(child, params)? else {
                    return Ok(None);
                };
                acc.extend(child_groups);
                if acc.len() > MAX_CONDITION_GROUPS {
                    return Ok(None);
                }
            }
            Ok(Some(acc))
        }
        other => Ok(Some(vec![atom(other, params)?.into_iter().collect()])),
    }
}

/// Sharded tables for which the atom's column is a sharding column.
fn owners_of<'a>(
    column: &ColumnSegment,
    tables: &'a [&TableSegment],
    rule: &ShardingRule,
) -> Vec<&'a str> {
    let shards_on = |t: &TableSegment| {
        rule.table_rule(&t.name).is_some_and(|r| {
            r.sharding_columns()
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&column.name))
        })
    };
    let candidates: Vec<&'a TableSegment> = match &column.owner {
        Some(owner) => tables
            .iter()
            .copied()
            .filter(|t| t.is_named(owner))
            .take(1)
            .collect(),
        None => tables.to_vec(),
    };
    let mut owners: Vec<&'a str> = Vec::new();
    for table in candidates {
        if shards_on(table) && !owners.iter().any(|o| o.eq_ignore_ascii_case(&table.name)) {
            owners.push(table.name.as_str());
        }
    }
    owners
}

/// Extract sharding conditions from a WHERE clause.
pub fn extract(
    where_clause: Option<&Predicate>,
    tables: &[&TableSegment],
    rule: &ShardingRule,
    params: &[Value],
) -> Result<ShardingConditions, RoutingError> {
    let Some(predicate) = where_clause else {
        return Ok(ShardingConditions::None);
    };
    let Some(conjunctions) = normalise(predicate, params)? else {
        return Ok(ShardingConditions::TooComplex);
    };

    let mut groups = Vec::with_capacity(conjunctions.len());
    for atoms in conjunctions {
        let mut group = ConditionGroup::default();
        for atom in atoms {
            for table in owners_of(&atom.column, tables, rule) {
                group.add(table, &atom.column.name, atom.condition.clone());
            }
        }
        groups.push(group);
    }
    if groups.iter().all(|g| g.conditions.is_empty()) {
        return Ok(ShardingConditions::None);
    }
    Ok(ShardingConditions::Groups(groups))
}

fn lower_in(value: &Value, lower: &Bound<Value>) -> bool {
    match lower {
        Bound::Included(l) => value.compare(l) != Ordering::Less,
        Bound::Excluded(l) => value.compare(l) == Ordering::Greater,
        Bound::Unbounded => true,
    }
}

fn upper_in(value: &Value, upper: &Bound<Value>) -> bool {
    match upper {
        Bound::Included(u) => value.compare(u) != Ordering::Greater,
        Bound::Excluded(u) => value.compare(u) == Ordering::Less,
        Bound::Unbounded => true,
    }
}

fn tighter_lower(a: Bound<Value>, b: Bound<Value>) -> Bound<Value> {
    match (&a, &b) {
        (Bound::Unbounded, _) => b,
        (_, Bound::Unbounded) => a,
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
            match x.compare(y) {
                Ordering::Greater => a,
                Ordering::Less => b,
                Ordering::Equal if matches!(a, Bound::Excluded(_)) => a,
                Ordering::Equal => b,
            }
        }
    }
}

fn tighter_upper(a: Bound<Value>, b: Bound<Value>) -> Bound<Value> {
    match (&a, &b) {
        (Bound::Unbounded, _) => b,
        (_, Bound::Unbounded) => a,
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
            match x.compare(y) {
                Ordering::Less => a,
                Ordering::Greater => b,
                Ordering::Equal if matches!(a, Bound::Excluded(_)) => a,
                Ordering::Equal => b,
            }
        }
    }
}

fn range_is_empty(lower: &Bound<Value>, upper: &Bound<Value>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l.compare(u) == Ordering::Greater,
        (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => {
            l.compare(u) != Ordering::Less
        }
        _ => false,
    }
}

/// Conjunction of two conditions on the same column.
fn intersect(a: ColumnCondition, b: ColumnCondition) -> ColumnCondition {
    use ColumnCondition::{AlwaysFalse, Value as V};
    let (a, b) = match (a, b) {
        (AlwaysFalse, _) | (_, AlwaysFalse) => return AlwaysFalse,
        (V(a), V(b)) => (a, b),
    };
    let result = match (a, b) {
        (ShardingValue::List(x), ShardingValue::List(y)) => {
            ShardingValue::List(x.into_iter().filter(|v| y.contains(v)).collect())
        }
        (ShardingValue::List(x), ShardingValue::Range { lower, upper })
        | (ShardingValue::Range { lower, upper }, ShardingValue::List(x)) => ShardingValue::List(
            x.into_iter()
                .filter(|v| lower_in(v, &lower) && upper_in(v, &upper))
                .collect(),
        ),
        (
            ShardingValue::Range {
                lower: l1,
                upper: u1,
            },
            ShardingValue::Range {
                lower: l2,
                upper: u2,
            },
        ) => {
            let lower = tighter_lower(l1, l2);
            let upper = tighter_upper(u1, u2);
            if range_is_empty(&lower, &upper) {
                return AlwaysFalse;
            }
            ShardingValue::Range { lower, upper }
        }
    };
    match result {
        ShardingValue::List(values) if values.is_empty() => AlwaysFalse,
        other => V(other),
    }
}
