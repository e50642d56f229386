//! Fluent statement builder bound to a database handle.
//!
//! A [`Session`] accumulates clause fragments into a [`Statement`] and placeholder
//! bindings into a token-keyed map. Execution methods (see `exec.rs`) render the
//! statement for the session's [`Dialect`], reset the session, and run the result
//! against the borrowed handle.
//!
//! ```ignore
//! let mut s = factory.session();
//! let users: Vec<User> = s
//!     .select(["id", "name"])
//!     .from(["users"])
//!     .where_("age > #{age}", (18,))
//!     .where_in("status", ["active", "pending"])
//!     .order_by(["id"])
//!     .limit(20)
//!     .as_record_list()
//!     .await?;
//! ```
//!
//! A session is single-use per statement and must not be shared between tasks.

mod exec;

use crate::dialect::{Dialect, RenderedSql};
use crate::error::SqlResult;
use crate::placeholder::{placeholders, scan};
use crate::sql_log::SqlLogger;
use crate::statement::Statement;
use crate::value::{IntoValues, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Per-session settings handed down by the factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Log every executed statement unless overridden with [`Session::log_sql`].
    pub log_sql: bool,
    pub logger: SqlLogger,
    /// Upper bound for every single execution call.
    pub statement_timeout: Option<Duration>,
}

/// Statement builder and executor over a borrowed handle.
pub struct Session<'h, C> {
    handle: &'h C,
    dialect: Dialect,
    options: SessionOptions,
    statement: Statement,
    params: IndexMap<String, Value>,
    raw: Vec<String>,
    log_sql: bool,
    deadline: Option<Instant>,
}

impl<'h, C> Session<'h, C> {
    pub fn new(handle: &'h C, dialect: Dialect) -> Self {
        Self::with_options(handle, dialect, SessionOptions::default())
    }

    pub fn with_options(handle: &'h C, dialect: Dialect, options: SessionOptions) -> Self {
        Self {
            handle,
            dialect,
            options,
            statement: Statement::new(),
            params: IndexMap::new(),
            raw: Vec::new(),
            log_sql: options.log_sql,
            deadline: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn handle(&self) -> &'h C {
        self.handle
    }

    /// The statement assembled so far.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Value bound to a full token such as `#{id}`.
    pub fn param(&self, token: &str) -> Option<&Value> {
        self.params.get(token)
    }

    // ==================== Bindings ====================

    fn bind(&mut self, token: impl Into<String>, value: Value) {
        self.params.insert(token.into(), value);
    }

    /// Next free auto-generated token, `#{N}` with N the current map size.
    fn auto_token(&self) -> String {
        self.free_token('#')
    }

    /// First unbound `{sigil}{N}` token, counting up from the current map size.
    fn free_token(&self, sigil: char) -> String {
        let mut n = self.params.len();
        loop {
            let token = format!("{sigil}{{{n}}}");
            if !self.params.contains_key(&token) {
                return token;
            }
            n += 1;
        }
    }

    fn bind_auto(&mut self, value: Value) -> String {
        let token = self.auto_token();
        self.bind(token.clone(), value);
        token
    }

    /// Bind `args` to the tokens of `fragment` in order.
    ///
    /// # Panics
    ///
    /// When `args` is non-empty and its length differs from the number of tokens.
    fn bind_positional(&mut self, fragment: &str, args: Vec<Value>) {
        if args.is_empty() {
            return;
        }
        let tokens = placeholders(fragment);
        if tokens.len() != args.len() {
            panic!(
                "the number of SQL parameters and args must be same: {} placeholder(s) in {:?}, {} arg(s)",
                tokens.len(),
                fragment,
                args.len()
            );
        }
        for (token, value) in tokens.into_iter().zip(args) {
            self.bind(token, value);
        }
    }

    /// Bind every token of `fragment` to the same value.
    fn bind_all(&mut self, fragment: &str, value: Value) {
        for token in placeholders(fragment) {
            self.bind(token, value.clone());
        }
    }

    /// Register a value for a named token (full form, e.g. `#{id}` or `${table}`).
    pub fn add_param(&mut self, token: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.bind(token, value.into());
        self
    }

    pub fn add_param_selective<V: Into<Value>>(
        &mut self,
        token: impl Into<String>,
        value: Option<V>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.add_param(token, value);
        }
        self
    }

    // ==================== Select ====================

    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement.select(columns);
        self
    }

    pub fn select_distinct<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement.select_distinct(columns);
        self
    }

    pub fn from<I, S>(&mut self, tables: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement.from(tables);
        self
    }

    // ==================== Predicates ====================

    /// Add a WHERE predicate.
    ///
    /// `args` are bound to the predicate's tokens in order; pass `()` to bind nothing
    /// (values can then be registered with [`Session::add_param`]).
    ///
    /// # Panics
    ///
    /// When `args` is non-empty and does not match the number of tokens in `condition`.
    pub fn where_(&mut self, condition: &str, args: impl IntoValues) -> &mut Self {
        self.statement.where_(condition);
        self.bind_positional(condition, args.into_values());
        self
    }

    /// Add a WHERE predicate only when `value` is present; every token in `condition`
    /// is bound to it.
    pub fn where_selective<V: Into<Value>>(
        &mut self,
        condition: &str,
        value: Option<V>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.statement.where_(condition);
            self.bind_all(condition, value.into());
        }
        self
    }

    /// `column IN (..)` with one bound value per element. An empty list adds nothing.
    pub fn where_in(&mut self, column: &str, values: impl IntoValues) -> &mut Self {
        self.in_list(column, "IN", values.into_values())
    }

    /// `column NOT IN (..)`. An empty list adds nothing.
    pub fn where_not_in(&mut self, column: &str, values: impl IntoValues) -> &mut Self {
        self.in_list(column, "NOT IN", values.into_values())
    }

    fn in_list(&mut self, column: &str, op: &str, values: Vec<Value>) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        let tokens: Vec<String> = values.into_iter().map(|v| self.bind_auto(v)).collect();
        self.statement.where_(format!("{column} {op} ({})", tokens.join(",")));
        self
    }

    pub fn group_by<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement.group_by(columns);
        self
    }

    /// Add a HAVING predicate; every token in `condition` is bound to `value`.
    pub fn having(&mut self, condition: &str, value: impl Into<Value>) -> &mut Self {
        self.statement.having(condition);
        self.bind_all(condition, value.into());
        self
    }

    pub fn order_by<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement.order_by(columns);
        self
    }

    /// Group the following predicates of the last touched list with `OR`.
    pub fn or(&mut self) -> &mut Self {
        self.statement.or();
        self
    }

    /// Group the following predicates of the last touched list with `AND`.
    pub fn and(&mut self) -> &mut Self {
        self.statement.and();
        self
    }

    // ==================== Joins ====================

    pub fn join(&mut self, join: impl Into<String>) -> &mut Self {
        self.statement.join(join);
        self
    }

    pub fn inner_join(&mut self, join: impl Into<String>) -> &mut Self {
        self.statement.inner_join(join);
        self
    }

    /// Add an INNER JOIN only when `condition` is present.
    pub fn inner_join_selective<V>(
        &mut self,
        join: impl Into<String>,
        condition: Option<V>,
    ) -> &mut Self {
        if condition.is_some() {
            self.statement.inner_join(join);
        }
        self
    }

    pub fn left_outer_join(&mut self, join: impl Into<String>) -> &mut Self {
        self.statement.left_outer_join(join);
        self
    }

    pub fn right_outer_join(&mut self, join: impl Into<String>) -> &mut Self {
        self.statement.right_outer_join(join);
        self
    }

    pub fn outer_join(&mut self, join: impl Into<String>) -> &mut Self {
        self.statement.outer_join(join);
        self
    }

    // ==================== Insert ====================

    pub fn insert_into(&mut self, table: impl Into<String>) -> &mut Self {
        self.statement.insert_into(table);
        self
    }

    /// Add a column and its value, bound to the token `#{column}`.
    pub fn values(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let token = format!("#{{{column}}}");
        self.statement.values(column, token.as_str());
        self.bind(token, value.into());
        self
    }

    pub fn values_selective<V: Into<Value>>(
        &mut self,
        column: &str,
        value: Option<V>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.values(column, value);
        }
        self
    }

    pub fn into_columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement.into_columns(columns);
        self
    }

    /// Append values to the current row, one auto-generated token each.
    pub fn into_values(&mut self, values: impl IntoValues) -> &mut Self {
        let tokens: Vec<String> = values
            .into_values()
            .into_iter()
            .map(|v| self.bind_auto(v))
            .collect();
        self.statement.into_values(tokens);
        self
    }

    /// Append several rows; each row after the first starts a new VALUES group.
    pub fn into_multi_values<I, R>(&mut self, rows: I) -> &mut Self
    where
        I: IntoIterator<Item = R>,
        R: IntoValues,
    {
        for (index, row) in rows.into_iter().enumerate() {
            if index > 0 {
                self.statement.add_row();
            }
            self.into_values(row);
        }
        self
    }

    /// Start a new VALUES row.
    pub fn add_row(&mut self) -> &mut Self {
        self.statement.add_row();
        self
    }

    // ==================== Update / Delete ====================

    pub fn update(&mut self, table: impl Into<String>) -> &mut Self {
        self.statement.update(table);
        self
    }

    /// `column = #{column}` assignment.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let token = format!("#{{{column}}}");
        self.statement.set(format!("{column} = {token}"));
        self.bind(token, value.into());
        self
    }

    pub fn set_selective<V: Into<Value>>(&mut self, column: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.set(column, value);
        }
        self
    }

    pub fn delete_from(&mut self, table: impl Into<String>) -> &mut Self {
        self.statement.delete_from(table);
        self
    }

    // ==================== Limiting rows ====================

    /// ` LIMIT n`, bound as a parameter.
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        let token = self.bind_auto(Value::from(limit));
        self.statement.limit(token);
        self
    }

    /// ` OFFSET n`, bound as a parameter.
    pub fn offset(&mut self, offset: u64) -> &mut Self {
        let token = self.bind_auto(Value::from(offset));
        self.statement.offset(token);
        self
    }

    /// ` FETCH FIRST n ROWS ONLY`, bound as a parameter.
    pub fn fetch_first(&mut self, limit: u64) -> &mut Self {
        let token = self.bind_auto(Value::from(limit));
        self.statement.fetch_first(token);
        self
    }

    /// ` OFFSET n ROWS`, bound as a parameter.
    pub fn offset_rows(&mut self, offset: u64) -> &mut Self {
        let token = self.bind_auto(Value::from(offset));
        self.statement.offset_rows(token);
        self
    }

    // ==================== Raw SQL ====================

    /// Append raw SQL after the assembled statement, on its own line.
    ///
    /// # Panics
    ///
    /// Same argument-count rule as [`Session::where_`].
    pub fn append_raw(&mut self, sql: &str, args: impl IntoValues) -> &mut Self {
        self.raw.push(sql.to_string());
        self.bind_positional(sql, args.into_values());
        self
    }

    /// Append everything `other` has assembled as one raw fragment, with its bindings.
    ///
    /// A token of `other` that is already bound here to a different value is renamed to
    /// a free positional token (keeping its sigil) before the merge; tokens bound to equal
    /// values are shared. `other` itself is left untouched.
    pub fn append<D>(&mut self, other: &Session<'_, D>) -> &mut Self {
        let mut renamed: HashMap<&str, String> = HashMap::new();
        for (token, value) in &other.params {
            match self.params.get(token) {
                Some(bound) if bound != value => {
                    let sigil = if token.starts_with('$') { '$' } else { '#' };
                    let fresh = self.free_token(sigil);
                    self.bind(fresh.clone(), value.clone());
                    renamed.insert(token.as_str(), fresh);
                }
                _ => self.bind(token.clone(), value.clone()),
            }
        }

        let text = other.to_sql();
        let mut fragment = String::with_capacity(text.len());
        let mut cursor = 0;
        for token in scan(&text) {
            if let Some(fresh) = renamed.get(token.text) {
                fragment.push_str(&text[cursor..token.span.start]);
                fragment.push_str(fresh);
                cursor = token.span.end;
            }
        }
        fragment.push_str(&text[cursor..]);

        if !fragment.is_empty() {
            self.raw.push(fragment);
        }
        self
    }

    // ==================== Session state ====================

    /// Enable or disable SQL logging for this session until the next reset.
    pub fn log_sql(&mut self, enabled: bool) -> &mut Self {
        self.log_sql = enabled;
        self
    }

    /// Abort execution calls that are still running after `timeout` from now.
    pub fn with_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(&mut self, deadline: Instant) -> &mut Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drop every clause fragment and binding; the session behaves like a new one.
    ///
    /// The deadline set by the factory or [`Session::with_timeout`] is kept.
    pub fn reset(&mut self) -> &mut Self {
        self.statement = Statement::new();
        self.params.clear();
        self.raw.clear();
        self.log_sql = self.options.log_sql;
        self
    }

    /// The assembled SQL text, tokens unresolved.
    pub fn to_sql(&self) -> String {
        let mut sql = self.statement.to_sql();
        for fragment in &self.raw {
            if !sql.is_empty() {
                sql.push('\n');
            }
            sql.push_str(fragment);
        }
        sql
    }

    /// Render the assembled SQL for this session's dialect without executing it.
    pub fn render(&self) -> SqlResult<RenderedSql> {
        self.dialect.render(&self.to_sql(), &self.params)
    }
}

#[cfg(test)]
mod tests;
