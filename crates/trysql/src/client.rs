//! Database handle traits.
//!
//! A session only ever talks to the database through [`DbHandle`]: execute with
//! arguments, query returning rows, query returning the first row. Transactions add
//! commit and rollback on top ([`TxHandle`]), and handles that can open one implement
//! [`Transactional`].

use crate::error::SqlResult;
use crate::row::{Row, Rows};
use crate::value::Value;
use std::future::Future;

/// Result of a statement executed for its side effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Generated key reported by the driver (MySQL family only).
    pub last_insert_id: Option<u64>,
}

/// A borrowed database handle that can run rendered SQL.
///
/// Implementations must be safe to share between tasks; sessions borrow a handle and
/// never mutate it themselves.
pub trait DbHandle: Send + Sync {
    /// Execute a statement and report the affected row count.
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = SqlResult<ExecOutcome>> + Send;

    /// Execute a query and return all rows together with the column list.
    fn query(&self, sql: &str, params: &[Value]) -> impl Future<Output = SqlResult<Rows>> + Send;

    /// Execute a query and return the first row, if any.
    ///
    /// The default implementation calls [`DbHandle::query`] and keeps the first row.
    fn query_opt(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = SqlResult<Option<Row>>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            Ok(rows.into_iter().next())
        }
    }
}

/// A handle scoped to an open transaction.
pub trait TxHandle: DbHandle + Sized {
    fn commit(self) -> impl Future<Output = SqlResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = SqlResult<()>> + Send;
}

/// A handle that can open transactions.
pub trait Transactional: DbHandle {
    type Tx: TxHandle;

    fn begin(&self) -> impl Future<Output = SqlResult<Self::Tx>> + Send;
}

impl<C: DbHandle> DbHandle for &C {
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = SqlResult<ExecOutcome>> + Send {
        (*self).execute(sql, params)
    }

    fn query(&self, sql: &str, params: &[Value]) -> impl Future<Output = SqlResult<Rows>> + Send {
        (*self).query(sql, params)
    }

    fn query_opt(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = SqlResult<Option<Row>>> + Send {
        (*self).query_opt(sql, params)
    }
}
