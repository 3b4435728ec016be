//! Row ordering for ORDER BY and GROUP BY keys.

use crate::domain::{ColumnMetadata, MergeError, OrderSpec, SortDirection, Value};
use std::cmp::Ordering;

#[derive(Clone, Debug)]
struct SortKey {
    index: usize,
    descending: bool,
    nulls_first: bool,
}

/// Compares rows on resolved sort keys.
#[derive(Clone, Debug)]
pub struct RowComparator {
    keys: Vec<SortKey>,
}

impl RowComparator {
    /// Resolve `specs` against the column layout.
    ///
    /// Without an explicit `NULLS FIRST/LAST`, NULL placement follows
    /// `nulls_first` for ascending keys and the reverse for descending ones.
    pub fn new(
        specs: &[OrderSpec],
        columns: &[ColumnMetadata],
        nulls_first: bool,
    ) -> Result<Self, MergeError> {
        let keys = specs
            .iter()
            .map(|spec| {
                let ascending = spec.direction == SortDirection::Asc;
                Ok(SortKey {
                    index: spec.target.resolve(columns)?,
                    descending: !ascending,
                    nulls_first: spec.nulls_first.unwrap_or(nulls_first == ascending),
                })
            })
            .collect::<Result<Vec<_>, MergeError>>()?;
        Ok(Self { keys })
    }

    /// Key column indices.
    pub fn indices(&self) -> Vec<usize> {
        self.keys.iter().map(|k| k.index).collect()
    }

    /// Order of two rows.
    pub fn compare(&self, left: &[Value], right: &[Value]) -> Ordering {
        for key in &self.keys {
            let l = left.get(key.index).unwrap_or(&Value::Null);
            let r = right.get(key.index).unwrap_or(&Value::Null);
            let ordering = match (l.is_null(), r.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) if key.nulls_first => Ordering::Less,
                (true, false) => Ordering::Greater,
                (false, true) if key.nulls_first => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) if key.descending => r.compare(l),
                (false, false) => l.compare(r),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ColumnTarget;

    fn columns() -> Vec<ColumnMetadata> {
        vec![ColumnMetadata::new("a"), ColumnMetadata::new("b")]
    }

    #[test]
    fn test_multi_column_directions() {
        let cmp = RowComparator::new(
            &[
                OrderSpec::asc(ColumnTarget::Label("a".into())),
                OrderSpec::desc(ColumnTarget::Index(1)),
            ],
            &columns(),
            true,
        )
        .unwrap();
        let row = |a: i64, b: i64| vec![Value::Int(a), Value::Int(b)];
        assert_eq!(cmp.compare(&row(1, 5), &row(2, 0)), Ordering::Less);
        assert_eq!(cmp.compare(&row(1, 5), &row(1, 3)), Ordering::Less);
        assert_eq!(cmp.compare(&row(1, 3), &row(1, 3)), Ordering::Equal);
        assert_eq!(cmp.indices(), vec![0, 1]);
    }

    #[test]
    fn test_null_placement() {
        let null = vec![Value::Null, Value::Null];
        let one = vec![Value::Int(1), Value::Null];
        let asc = |nulls_first| {
            RowComparator::new(&[OrderSpec::asc(ColumnTarget::Index(0))], &columns(), nulls_first)
                .unwrap()
        };
        assert_eq!(asc(true).compare(&null, &one), Ordering::Less);
        assert_eq!(asc(false).compare(&null, &one), Ordering::Greater);

        // Descending flips the default placement.
        let desc =
            RowComparator::new(&[OrderSpec::desc(ColumnTarget::Index(0))], &columns(), true)
                .unwrap();
        assert_eq!(desc.compare(&null, &one), Ordering::Greater);

        let mut explicit = OrderSpec::desc(ColumnTarget::Index(0));
        explicit.nulls_first = Some(true);
        let explicit = RowComparator::new(&[explicit], &columns(), true).unwrap();
        assert_eq!(explicit.compare(&null, &one), Ordering::Less);
    }

    #[test]
    fn test_unknown_label() {
        let err = RowComparator::new(
            &[OrderSpec::asc(ColumnTarget::Label("zzz".into()))],
            &columns(),
            true,
        )
        .unwrap_err();
        assert_eq!(err, MergeError::UnknownColumn("zzz".into()));
    }
}
