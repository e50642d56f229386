//! Per-database-family rendering of placeholder tokens.

use crate::error::{SqlResult, TrySqlError};
use crate::placeholder::{TokenKind, scan};
use crate::value::Value;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;

/// Database family a factory and its sessions render for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Positional `?` markers; generated ids come from the driver's last-insert-id.
    #[serde(alias = "mariadb")]
    MySql,
    /// Numbered `$1, $2, ..` markers; generated ids come from a `RETURNING` clause.
    #[serde(alias = "postgresql")]
    Postgres,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::MySql => f.write_str("mysql"),
            Dialect::Postgres => f.write_str("postgres"),
        }
    }
}

/// Executable SQL text and its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Dialect {
    /// Marker for the 1-based argument `position`.
    fn write_marker(self, out: &mut String, position: usize) {
        match self {
            Dialect::MySql => out.push('?'),
            Dialect::Postgres => {
                out.push('$');
                out.push_str(&position.to_string());
            }
        }
    }

    /// Replace every `#{..}` token with this dialect's marker and every `${..}` token with
    /// the literal text of its value.
    ///
    /// Arguments are collected in token order, so the value at position `i` is the one
    /// bound to the `i`-th dynamic token in the text. A token with no bound value is a
    /// validation error.
    pub fn render(self, sql: &str, params: &IndexMap<String, Value>) -> SqlResult<RenderedSql> {
        let mut out = String::with_capacity(sql.len());
        let mut args = Vec::new();
        let mut cursor = 0;

        for token in scan(sql) {
            out.push_str(&sql[cursor..token.span.start]);
            let value = params.get(token.text).ok_or_else(|| {
                TrySqlError::validation(format!("no value bound to placeholder {}", token.text))
            })?;
            match token.kind {
                TokenKind::Dynamic => {
                    args.push(value.clone());
                    self.write_marker(&mut out, args.len());
                }
                TokenKind::Injected => out.push_str(&value.to_string()),
            }
            cursor = token.span.end;
        }
        out.push_str(&sql[cursor..]);

        Ok(RenderedSql {
            sql: out,
            params: args,
        })
    }

    /// Whether a generated key is read back through a `RETURNING` clause.
    pub fn uses_returning(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}
