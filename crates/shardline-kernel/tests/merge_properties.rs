//! Property tests for result merging: splitting a sorted dataset across
//! any number of streams never changes what the merger returns.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shardline_kernel::domain::{
    AggregationKind, AggregationSpec, ColumnTarget, OrderSpec, PaginationSpec, SelectShape,
};
use std::collections::BTreeMap;
use shardline_kernel::execute::UnitResult;
use shardline_kernel::{drain, MemoryQueryResult, MergeConfig, ResultMerger, UnitOutput, Value};

const COLUMNS: [&str; 2] = ["score", "id"];

fn order_by_score_then_id() -> Vec<OrderSpec> {
    vec![
        OrderSpec::asc(ColumnTarget::Label("score".into())),
        OrderSpec::asc(ColumnTarget::Label("id".into())),
    ]
}

/// Rows `(score, id)` sorted by the merge order, ids unique.
fn dataset(scores: &[Option<i64>]) -> Vec<Vec<Value>> {
    let mut rows: Vec<Vec<Value>> = scores
        .iter()
        .enumerate()
        .map(|(id, score)| {
            let score = score.map(Value::Int).unwrap_or(Value::Null);
            vec![score, Value::Int(id as i64)]
        })
        .collect();
    // NULL sorts first for ascending keys by default.
    rows.sort_by(|a, b| {
        let key = |row: &Vec<Value>| (row[0].as_i64(), row[1].as_i64());
        key(a).cmp(&key(b))
    });
    rows
}

/// Deal rows to `streams` streams at random, preserving order within each.
fn split(rows: &[Vec<Value>], streams: usize, seed: u64) -> Vec<Vec<Vec<Value>>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = vec![Vec::new(); streams];
    for row in rows {
        out[rng.gen_range(0..streams)].push(row.clone());
    }
    out
}

fn results(streams: Vec<Vec<Vec<Value>>>) -> Vec<UnitResult> {
    streams
        .into_iter()
        .map(|rows| {
            Ok(UnitOutput::Rows(Box::new(MemoryQueryResult::new(&COLUMNS, rows))))
        })
        .collect()
}

/// Per-shard `GROUP BY key` partial counts, sorted as the shard would.
fn grouped_shards(
    keys: &[i64],
    streams: usize,
    seed: u64,
    descending: bool,
) -> Vec<Vec<Vec<Value>>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut partials = vec![BTreeMap::<i64, i64>::new(); streams];
    for key in keys {
        *partials[rng.gen_range(0..streams)].entry(*key).or_default() += 1;
    }
    partials
        .into_iter()
        .map(|counts| {
            let mut rows: Vec<Vec<Value>> = counts
                .into_iter()
                .map(|(key, count)| vec![Value::Int(key), Value::Int(count)])
                .collect();
            if descending {
                rows.reverse();
            }
            rows
        })
        .collect()
}

fn grouped_count(descending: bool) -> SelectShape {
    let key = ColumnTarget::Label("user_id".into());
    let order = if descending {
        OrderSpec::desc(key.clone())
    } else {
        OrderSpec::asc(key.clone())
    };
    SelectShape {
        order_by: vec![order],
        group_by: vec![OrderSpec::asc(key)],
        aggregations: vec![AggregationSpec {
            kind: AggregationKind::Count,
            target: ColumnTarget::Index(1),
            avg_derived: None,
        }],
        stream_group_by: true,
        ..Default::default()
    }
}

fn merge_grouped(streams: Vec<Vec<Vec<Value>>>, shape: &SelectShape) -> Vec<Vec<Value>> {
    let merger = ResultMerger::new(MergeConfig::default());
    let results = streams
        .into_iter()
        .map(|rows| {
            Ok(UnitOutput::Rows(Box::new(MemoryQueryResult::new(
                &["user_id", "COUNT(*)"],
                rows,
            ))))
        })
        .collect();
    let mut merged = merger.merge_query(results, shape).unwrap();
    drain(&mut merged).unwrap()
}

fn merge(streams: Vec<Vec<Vec<Value>>>, shape: &SelectShape) -> Vec<Vec<Value>> {
    let merger = ResultMerger::new(MergeConfig::default());
    let mut merged = merger.merge_query(results(streams), shape).unwrap();
    drain(&mut merged).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// ORDER BY merge of any split equals the sorted dataset.
    #[test]
    fn prop_order_by_merge_is_split_independent(
        scores in proptest::collection::vec(proptest::option::weighted(0.9, -50i64..50), 0..60),
        streams in 2usize..6,
        seed in any::<u64>(),
    ) {
        let rows = dataset(&scores);
        let shape = SelectShape {
            order_by: order_by_score_then_id(),
            ..Default::default()
        };

        let whole = merge(vec![rows.clone()], &shape);
        let pair = merge(split(&rows, 2, seed), &shape);
        let many = merge(split(&rows, streams, seed), &shape);

        prop_assert_eq!(&whole, &rows);
        prop_assert_eq!(&pair, &rows);
        prop_assert_eq!(&many, &rows);
    }

    /// Over-fetched pages trimmed by the merger equal the global page.
    #[test]
    fn prop_paginated_merge_matches_global_page(
        scores in proptest::collection::vec(0i64..1_000, 0..80),
        seed in any::<u64>(),
    ) {
        let rows = dataset(&scores.into_iter().map(Some).collect::<Vec<_>>());
        let (offset, row_count) = (5usize, 10usize);
        // Each node returns its first offset + row_count rows.
        let streams: Vec<Vec<Vec<Value>>> = split(&rows, 3, seed)
            .into_iter()
            .map(|mut s| {
                s.truncate(offset + row_count);
                s
            })
            .collect();
        let shape = SelectShape {
            order_by: order_by_score_then_id(),
            pagination: Some(PaginationSpec {
                offset: offset as u64,
                row_count: Some(row_count as u64),
            }),
            ..Default::default()
        };

        let page = merge(streams, &shape);
        let expected: Vec<Vec<Value>> = rows.into_iter().skip(offset).take(row_count).collect();
        prop_assert_eq!(page, expected);
    }

    /// Stream group-by of any split equals the unsharded grouping, in
    /// either key direction.
    #[test]
    fn prop_stream_group_by_is_split_independent(
        keys in proptest::collection::vec(0i64..12, 0..80),
        streams in 2usize..6,
        seed in any::<u64>(),
        descending in any::<bool>(),
    ) {
        let shape = grouped_count(descending);
        let whole = grouped_shards(&keys, 1, seed, descending);
        let expected = whole[0].clone();

        let pair = grouped_shards(&keys, 2, seed, descending);
        let many = grouped_shards(&keys, streams, seed, descending);

        prop_assert_eq!(merge_grouped(whole, &shape), expected.clone());
        prop_assert_eq!(merge_grouped(pair, &shape), expected.clone());
        prop_assert_eq!(merge_grouped(many, &shape), expected);
    }
}
