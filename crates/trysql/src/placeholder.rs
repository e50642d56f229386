//! Scanning of `#{..}` (bound) and `${..}` (injected) placeholder tokens.
//!
//! A token starts at a sigil immediately followed by `{` and ends at the next `}`.
//! A sigil that appears before the current token is closed restarts the token, and a
//! token that is never closed is ignored.

use std::ops::Range;

/// Which of the two token forms was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `#{..}`: rendered as a driver parameter marker.
    Dynamic,
    /// `${..}`: replaced by the literal text of its bound value.
    Injected,
}

/// One token occurrence in a SQL fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Full token text including sigil and braces, e.g. `#{id}`.
    pub text: &'a str,
    /// Byte range of `text` in the scanned fragment.
    pub span: Range<usize>,
}

/// Scan `sql` and return every token in source order.
pub fn scan(sql: &str) -> Vec<Token<'_>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut open: Option<(usize, TokenKind)> = None;

    for (i, &b) in bytes.iter().enumerate() {
        let next_is_brace = bytes.get(i + 1) == Some(&b'{');
        match b {
            b'#' if next_is_brace => open = Some((i, TokenKind::Dynamic)),
            b'$' if next_is_brace => open = Some((i, TokenKind::Injected)),
            b'}' => {
                if let Some((start, kind)) = open.take() {
                    tokens.push(Token {
                        kind,
                        text: &sql[start..=i],
                        span: start..i + 1,
                    });
                }
            }
            _ => {}
        }
    }
    tokens
}

/// All tokens of both kinds, in source order.
pub fn placeholders(sql: &str) -> Vec<&str> {
    scan(sql).into_iter().map(|t| t.text).collect()
}

/// Tokens partitioned by kind: `(dynamic, injected)`, each list in source order.
pub fn split_placeholders(sql: &str) -> (Vec<&str>, Vec<&str>) {
    let mut dynamic = Vec::new();
    let mut injected = Vec::new();
    for token in scan(sql) {
        match token.kind {
            TokenKind::Dynamic => dynamic.push(token.text),
            TokenKind::Injected => injected.push(token.text),
        }
    }
    (dynamic, injected)
}

/// Number of `#{..}` occurrences in `sql`.
pub fn count_dynamic(sql: &str) -> usize {
    scan(sql)
        .iter()
        .filter(|t| t.kind == TokenKind::Dynamic)
        .count()
}
