use super::Session;
use crate::client::DbHandle;
use crate::dialect::{Dialect, RenderedSql};
use crate::error::{SqlResult, TrySqlError};
use crate::placeholder::{TokenKind, scan};
use crate::row::{self, Record, RowMap};
use crate::statement::StatementKind;
use crate::value::FromValue;
use std::future::Future;
use tokio::time::Instant;

/// A statement taken out of the session, ready to run.
struct Prepared {
    kind: Option<StatementKind>,
    rendered: RenderedSql,
    /// Bound `#{..}` tokens found in WHERE predicates and raw fragments.
    guarded_params: usize,
    log: bool,
    deadline: Option<Instant>,
}

impl<C: DbHandle> Session<'_, C> {
    /// Render, then reset the session whether or not rendering succeeded.
    fn take_prepared(&mut self) -> SqlResult<Prepared> {
        let rendered = self.render();
        let guarded_params = self.guarded_params();
        let kind = self.statement.kind();
        let log = self.log_sql;
        let deadline = self.effective_deadline();
        self.reset();
        Ok(Prepared {
            kind,
            rendered: rendered?,
            guarded_params,
            log,
            deadline,
        })
    }

    fn guarded_params(&self) -> usize {
        self.statement
            .where_fragments()
            .iter()
            .chain(&self.raw)
            .flat_map(|fragment| scan(fragment))
            .filter(|t| t.kind == TokenKind::Dynamic && self.params.contains_key(t.text))
            .count()
    }

    fn effective_deadline(&self) -> Option<Instant> {
        let per_call = self
            .options
            .statement_timeout
            .map(|timeout| Instant::now() + timeout);
        match (self.deadline, per_call) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn log(&self, prepared: &Prepared) {
        if prepared.log {
            self.options.logger.emit(
                prepared.kind,
                &prepared.rendered.sql,
                &prepared.rendered.params,
            );
        }
    }

    /// Run a driver call under the statement deadline.
    async fn call<T>(
        deadline: Option<Instant>,
        fut: impl Future<Output = SqlResult<T>>,
    ) -> SqlResult<T> {
        match deadline {
            Some(at) => {
                let budget = at.saturating_duration_since(Instant::now());
                tokio::time::timeout_at(at, fut)
                    .await
                    .map_err(|_| TrySqlError::Timeout(budget))?
            }
            None => fut.await,
        }
    }

    /// Execute the statement, discarding any result.
    pub async fn execute(&mut self) -> SqlResult<()> {
        let prepared = self.take_prepared()?;
        self.log(&prepared);
        let RenderedSql { sql, params } = &prepared.rendered;
        Self::call(prepared.deadline, self.handle.execute(sql, params)).await?;
        Ok(())
    }

    /// Execute and return the number of affected rows.
    ///
    /// Refuses to run (with a validation error) when neither the WHERE clause nor the
    /// raw fragments carry a bound value, so an unconditional UPDATE or DELETE cannot slip
    /// through.
    pub async fn execute_for_rows_affected(&mut self) -> SqlResult<u64> {
        let prepared = self.take_prepared()?;
        if prepared.guarded_params == 0 {
            return Err(TrySqlError::validation(
                "a WHERE condition with bound values is required for a rows-affected execution",
            ));
        }
        self.log(&prepared);
        let RenderedSql { sql, params } = &prepared.rendered;
        let outcome = Self::call(prepared.deadline, self.handle.execute(sql, params)).await?;
        Ok(outcome.rows_affected)
    }

    /// Execute an INSERT and return the generated key of `column`.
    ///
    /// MySQL reads the driver's last-insert-id; Postgres appends `RETURNING column` and
    /// reads the first row.
    pub async fn execute_for_generated_id(&mut self, column: &str) -> SqlResult<i64> {
        let mut prepared = self.take_prepared()?;
        match self.dialect {
            Dialect::MySql => {
                self.log(&prepared);
                let RenderedSql { sql, params } = &prepared.rendered;
                let outcome =
                    Self::call(prepared.deadline, self.handle.execute(sql, params)).await?;
                let id = outcome.last_insert_id.ok_or_else(|| {
                    TrySqlError::Driver("handle did not report a generated id".to_string())
                })?;
                i64::try_from(id).map_err(|_| TrySqlError::type_mismatch("i64", "u64"))
            }
            Dialect::Postgres => {
                prepared.rendered.sql.push_str("\n RETURNING ");
                prepared.rendered.sql.push_str(column);
                self.log(&prepared);
                let RenderedSql { sql, params } = &prepared.rendered;
                let row = Self::call(prepared.deadline, self.handle.query_opt(sql, params))
                    .await?
                    .ok_or_else(|| TrySqlError::not_found("no rows in result set"))?;
                row::decode_scalar(row)
            }
        }
    }

    async fn query_all(&mut self) -> SqlResult<row::Rows> {
        let prepared = self.take_prepared()?;
        self.log(&prepared);
        let RenderedSql { sql, params } = &prepared.rendered;
        Self::call(prepared.deadline, self.handle.query(sql, params)).await
    }

    async fn query_first(&mut self) -> SqlResult<Option<row::Row>> {
        let prepared = self.take_prepared()?;
        self.log(&prepared);
        let RenderedSql { sql, params } = &prepared.rendered;
        Self::call(prepared.deadline, self.handle.query_opt(sql, params)).await
    }

    // ==================== Records ====================

    /// Decode the first row into `T`; [`TrySqlError::NotFound`] when there is none.
    pub async fn as_record<T: Record>(&mut self) -> SqlResult<T> {
        self.as_record_opt()
            .await?
            .ok_or_else(|| TrySqlError::not_found("no rows in result set"))
    }

    pub async fn as_record_opt<T: Record>(&mut self) -> SqlResult<Option<T>> {
        match self.query_first().await? {
            Some(row) => {
                let plan = row::ScanPlan::new::<T>(row.columns());
                plan.decode(row).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Decode every row. Use `Vec<Box<T>>` by asking for `T = Box<U>`.
    pub async fn as_record_list<T: Record>(&mut self) -> SqlResult<Vec<T>> {
        let rows = self.query_all().await?;
        row::decode_records(rows)
    }

    // ==================== Scalars ====================

    /// First column of the first row; [`TrySqlError::NotFound`] when there is no row.
    pub async fn as_scalar<T: FromValue>(&mut self) -> SqlResult<T> {
        self.as_scalar_opt()
            .await?
            .ok_or_else(|| TrySqlError::not_found("no rows in result set"))
    }

    pub async fn as_scalar_opt<T: FromValue>(&mut self) -> SqlResult<Option<T>> {
        self.query_first()
            .await?
            .map(row::decode_scalar)
            .transpose()
    }

    /// First column of every row.
    pub async fn as_scalar_list<T: FromValue>(&mut self) -> SqlResult<Vec<T>> {
        let rows = self.query_all().await?;
        row::decode_scalars(rows)
    }

    // ==================== Maps ====================

    /// First row keyed by column name; [`TrySqlError::NotFound`] when there is none.
    pub async fn as_map(&mut self) -> SqlResult<RowMap> {
        self.query_first()
            .await?
            .map(row::Row::into_map)
            .ok_or_else(|| TrySqlError::not_found("no rows in result set"))
    }

    pub async fn as_map_list(&mut self) -> SqlResult<Vec<RowMap>> {
        let rows = self.query_all().await?;
        Ok(row::decode_maps(rows))
    }
}
