use crate::statement::StatementKind;
use crate::value::Value;
use tracing::Level;

/// Emits rendered statements and their positional arguments through `tracing`.
///
/// Events go to target `trysql.sql`. Arguments are written as `value(type)`,
/// comma-joined, in marker order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlLogger {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for SqlLogger {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            max_sql_length: None,
        }
    }
}

impl SqlLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn truncate_sql<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_bytes(sql, max)).into(),
            _ => sql.into(),
        }
    }

    pub fn emit(&self, kind: Option<StatementKind>, sql: &str, params: &[Value]) {
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let sql = self.truncate_sql(sql);
        let param_count = params.len();
        let params = format_params(params);
        emit_at_level!(
            self.level,
            target: "trysql.sql",
            kind = ?kind,
            param_count,
            sql = %sql,
            params = %params,
        );
    }
}

/// `value(type)` pairs, comma-joined.
pub fn format_params(params: &[Value]) -> String {
    params
        .iter()
        .map(|v| format!("{v}({})", v.type_name()))
        .collect::<Vec<_>>()
        .join(",")
}

fn truncate_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
