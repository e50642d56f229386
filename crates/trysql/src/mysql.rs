//! MySQL family handles over `sqlx`: the pool and [`MySqlTx`].

use crate::client::{DbHandle, ExecOutcome, Transactional, TxHandle};
use crate::error::{SqlResult, TrySqlError};
use crate::row::Rows;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlQueryResult, MySqlRow};
use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _};
use tokio::sync::Mutex;

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

fn bind<'q>(sql: &'q str, params: &'q [Value]) -> MySqlQuery<'q> {
    let mut query = sqlx::query(sql);
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::UInt(u) => query.bind(*u),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Bytes(b) => query.bind(b.as_slice()),
            Value::Date(d) => query.bind(*d),
            Value::Timestamp(t) => query.bind(*t),
            Value::TimestampTz(t) => query.bind(*t),
        };
    }
    query
}

fn outcome(result: MySqlQueryResult) -> ExecOutcome {
    ExecOutcome {
        rows_affected: result.rows_affected(),
        last_insert_id: Some(result.last_insert_id()),
    }
}

/// How a column is read back, chosen by its MySQL type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Date,
    DateTime,
    Timestamp,
    Time,
    Bytes,
    Text,
}

fn column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "BOOLEAN" => ColumnKind::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => ColumnKind::Int,
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" | "YEAR" | "BIT" => ColumnKind::UInt,
        "FLOAT" => ColumnKind::Float,
        "DOUBLE" => ColumnKind::Double,
        "DATE" => ColumnKind::Date,
        "DATETIME" => ColumnKind::DateTime,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "TIME" => ColumnKind::Time,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            ColumnKind::Bytes
        }
        // CHAR, VARCHAR, TEXT, DECIMAL, JSON, ENUM, SET
        _ => ColumnKind::Text,
    }
}

fn column_value(row: &MySqlRow, idx: usize) -> SqlResult<Value> {
    let name = row.columns()[idx].name();
    let decode = |e: sqlx::Error| TrySqlError::decode(name, e);

    let kind = {
        let raw = row.try_get_raw(idx).map_err(decode)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        column_kind(raw.type_info().name())
    };

    let value = match kind {
        ColumnKind::Bool => Value::Bool(row.try_get_unchecked::<i64, _>(idx).map_err(decode)? != 0),
        ColumnKind::Int => Value::Int(row.try_get_unchecked(idx).map_err(decode)?),
        ColumnKind::UInt => Value::UInt(row.try_get_unchecked(idx).map_err(decode)?),
        ColumnKind::Float => Value::Float(f64::from(
            row.try_get_unchecked::<f32, _>(idx).map_err(decode)?,
        )),
        ColumnKind::Double => Value::Float(row.try_get_unchecked(idx).map_err(decode)?),
        ColumnKind::Date => {
            Value::Date(row.try_get_unchecked::<NaiveDate, _>(idx).map_err(decode)?)
        }
        ColumnKind::DateTime => {
            Value::Timestamp(row.try_get_unchecked::<NaiveDateTime, _>(idx).map_err(decode)?)
        }
        ColumnKind::Timestamp => {
            Value::TimestampTz(row.try_get_unchecked::<DateTime<Utc>, _>(idx).map_err(decode)?)
        }
        ColumnKind::Time => Value::Text(
            row.try_get_unchecked::<NaiveTime, _>(idx)
                .map_err(decode)?
                .to_string(),
        ),
        ColumnKind::Bytes => Value::Bytes(row.try_get_unchecked(idx).map_err(decode)?),
        ColumnKind::Text => Value::Text(row.try_get_unchecked(idx).map_err(decode)?),
    };
    Ok(value)
}

fn convert_rows(rows: Vec<MySqlRow>) -> SqlResult<Rows> {
    let Some(first) = rows.first() else {
        return Ok(Rows::default());
    };
    let mut out = Rows::new(first.columns().iter().map(|c| c.name()));
    for row in &rows {
        let values = (0..row.len())
            .map(|idx| column_value(row, idx))
            .collect::<SqlResult<Vec<_>>>()?;
        out.push(values);
    }
    Ok(out)
}

impl DbHandle for MySqlPool {
    async fn execute(&self, sql: &str, params: &[Value]) -> SqlResult<ExecOutcome> {
        let result = bind(sql, params)
            .execute(self)
            .await
            .map_err(TrySqlError::from_mysql_error)?;
        Ok(outcome(result))
    }

    async fn query(&self, sql: &str, params: &[Value]) -> SqlResult<Rows> {
        let rows = bind(sql, params)
            .fetch_all(self)
            .await
            .map_err(TrySqlError::from_mysql_error)?;
        convert_rows(rows)
    }
}

impl Transactional for MySqlPool {
    type Tx = MySqlTx;

    async fn begin(&self) -> SqlResult<MySqlTx> {
        let tx = sqlx::Pool::begin(self)
            .await
            .map_err(TrySqlError::from_mysql_error)?;
        tracing::debug!(target: "trysql.tx", "transaction started");
        Ok(MySqlTx {
            inner: Mutex::new(tx),
        })
    }
}

/// An open `sqlx` transaction.
///
/// Calls are serialized on the underlying connection. Dropped unfinished, `sqlx` rolls
/// the transaction back when the connection returns to the pool.
pub struct MySqlTx {
    inner: Mutex<sqlx::Transaction<'static, MySql>>,
}

impl DbHandle for MySqlTx {
    async fn execute(&self, sql: &str, params: &[Value]) -> SqlResult<ExecOutcome> {
        let mut tx = self.inner.lock().await;
        let result = bind(sql, params)
            .execute(&mut **tx)
            .await
            .map_err(TrySqlError::from_mysql_error)?;
        Ok(outcome(result))
    }

    async fn query(&self, sql: &str, params: &[Value]) -> SqlResult<Rows> {
        let mut tx = self.inner.lock().await;
        let rows = bind(sql, params)
            .fetch_all(&mut **tx)
            .await
            .map_err(TrySqlError::from_mysql_error)?;
        convert_rows(rows)
    }
}

impl TxHandle for MySqlTx {
    async fn commit(self) -> SqlResult<()> {
        self.inner
            .into_inner()
            .commit()
            .await
            .map_err(TrySqlError::from_mysql_error)
    }

    async fn rollback(self) -> SqlResult<()> {
        self.inner
            .into_inner()
            .rollback()
            .await
            .map_err(TrySqlError::from_mysql_error)
    }
}
