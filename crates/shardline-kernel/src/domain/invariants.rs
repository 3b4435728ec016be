//! # Domain Invariants
//!
//! Rules every route and token list must satisfy.

use super::errors::RewriteError;
use super::route::RouteUnit;
use super::token::SqlToken;
use std::collections::HashSet;

/// Invariant: no two route units share a destination.
///
/// A destination is the data source together with every actual table the
/// unit binds.
pub fn invariant_unique_route_units(units: &[RouteUnit]) -> bool {
    let mut seen = HashSet::new();
    units.iter().all(|u| seen.insert(u.identity()))
}

/// Invariant: tokens lie inside the SQL text and never overlap.
///
/// Expects tokens sorted by start offset. Zero-width insertion tokens may
/// touch, but not sit strictly inside, another token.
pub fn invariant_non_overlapping_tokens(
    tokens: &[SqlToken],
    sql_len: usize,
) -> Result<(), RewriteError> {
    for token in tokens {
        if token.span.start > token.span.stop || token.span.stop > sql_len {
            return Err(RewriteError::SpanOutOfBounds {
                start: token.span.start,
                stop: token.span.stop,
                len: sql_len,
            });
        }
    }
    for pair in tokens.windows(2) {
        let (a, b) = (&pair[0].span, &pair[1].span);
        if b.start < a.stop {
            return Err(RewriteError::OverlappingTokens {
                first_start: a.start,
                first_stop: a.stop,
                second_start: b.start,
                second_stop: b.stop,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::route::TableMapper;
    use crate::domain::statement::Span;
    use crate::domain::token::TokenKind;

    fn table_token(start: usize, stop: usize) -> SqlToken {
        SqlToken::new(
            Span::new(start, stop),
            TokenKind::Table {
                logic_table: "t".into(),
                original: "t".into(),
            },
        )
    }

    #[test]
    fn test_unique_route_units() {
        let a = RouteUnit::new("ds_0", vec![TableMapper::new("t", "t_0")]);
        let b = RouteUnit::new("ds_0", vec![TableMapper::new("t", "t_1")]);
        assert!(invariant_unique_route_units(&[a.clone(), b]));
        assert!(!invariant_unique_route_units(&[a.clone(), a]));
    }

    #[test]
    fn test_adjacent_tokens_allowed() {
        let tokens = vec![
            table_token(0, 5),
            SqlToken::new(Span::at(5), TokenKind::RowCount { value: 1 }),
            table_token(5, 8),
        ];
        assert!(invariant_non_overlapping_tokens(&tokens, 10).is_ok());
    }

    #[test]
    fn test_overlap_detected() {
        let tokens = vec![table_token(0, 5), table_token(3, 8)];
        assert!(matches!(
            invariant_non_overlapping_tokens(&tokens, 10),
            Err(RewriteError::OverlappingTokens { .. })
        ));
    }

    #[test]
    fn test_out_of_bounds_detected() {
        let tokens = vec![table_token(8, 12)];
        assert!(matches!(
            invariant_non_overlapping_tokens(&tokens, 10),
            Err(RewriteError::SpanOutOfBounds { .. })
        ));
    }
}
