//! SQL text assembly from tokens.

use crate::domain::{invariant_non_overlapping_tokens, RewriteError, SqlToken};

/// Rebuild SQL by copying untouched text and substituting each token with
/// `render(token)`, in ascending position order.
///
/// `tokens` must be sorted by start offset.
pub fn assemble<F>(sql: &str, tokens: &[SqlToken], mut render: F) -> Result<String, RewriteError>
where
    F: FnMut(&SqlToken) -> String,
{
    invariant_non_overlapping_tokens(tokens, sql.len())?;

    let slice = |start: usize, stop: usize| {
        sql.get(start..stop).ok_or(RewriteError::SpanOutOfBounds {
            start,
            stop,
            len: sql.len(),
        })
    };

    let mut out = String::with_capacity(sql.len() + tokens.len() * 8);
    let mut cursor = 0;
    for token in tokens {
        out.push_str(slice(cursor, token.span.start)?);
        out.push_str(&render(token));
        cursor = token.span.stop;
    }
    out.push_str(slice(cursor, sql.len())?);
    Ok(out)
}
