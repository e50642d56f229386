//! Postgres family handles: `tokio-postgres` clients and transactions, `deadpool-postgres`
//! pools and pooled connections, and [`PgTx`].

use crate::client::{DbHandle, ExecOutcome, Transactional, TxHandle};
use crate::error::{SqlResult, TrySqlError};
use crate::row::Rows;
use crate::value::Value;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{Object, Pool};
use std::error::Error;
use tokio_postgres::GenericClient;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

// ==================== Encoding ====================

/// Values are encoded for the parameter type the server inferred for the marker, so an
/// `Int` bound to an `int4` column is sent as a 4-byte integer.
impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => encode_int(i64::from(*b), ty, out),
            },
            Value::Int(i) => encode_int(*i, ty, out),
            Value::UInt(u) => encode_int(i64::try_from(*u)?, ty, out),
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                _ => encode_text(&f.to_string(), ty, out),
            },
            Value::Text(s) => encode_text(s, ty, out),
            Value::Bytes(b) => match *ty {
                Type::BYTEA => b.as_slice().to_sql(ty, out),
                _ => match std::str::from_utf8(b) {
                    Ok(s) => encode_text(s, ty, out),
                    Err(_) => Err(format!("cannot encode non-UTF-8 bytes as {ty}").into()),
                },
            },
            Value::Date(d) => match *ty {
                Type::DATE => d.to_sql(ty, out),
                Type::TIMESTAMP => d.and_time(NaiveTime::MIN).to_sql(ty, out),
                Type::TIMESTAMPTZ => d.and_time(NaiveTime::MIN).and_utc().to_sql(ty, out),
                _ => encode_text(&d.to_string(), ty, out),
            },
            Value::Timestamp(t) => match *ty {
                Type::TIMESTAMP => t.to_sql(ty, out),
                Type::TIMESTAMPTZ => t.and_utc().to_sql(ty, out),
                Type::DATE => t.date().to_sql(ty, out),
                _ => encode_text(&t.to_string(), ty, out),
            },
            Value::TimestampTz(t) => match *ty {
                Type::TIMESTAMPTZ => t.to_sql(ty, out),
                Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
                Type::DATE => t.date_naive().to_sql(ty, out),
                _ => encode_text(&t.to_rfc3339(), ty, out),
            },
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn encode_int(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        _ => encode_text(&i.to_string(), ty, out),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::BOOL => s.trim().parse::<bool>()?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::NUMERIC => {
            Err(format!("cannot encode {s:?} as numeric; cast the marker to text").into())
        }
        // text-like types and enum labels share the same wire format
        _ => s.to_sql(ty, out),
    }
}

// ==================== Decoding ====================

/// Undecoded column bytes.
struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> SqlResult<Option<T>> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| TrySqlError::decode(row.columns()[idx].name(), e))
}

fn column_value(row: &tokio_postgres::Row, idx: usize) -> SqlResult<Value> {
    let ty = row.columns()[idx].type_();
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),
        Type::CHAR => get::<i8>(row, idx)?.map(Value::from),
        Type::INT2 => get::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::Int),
        Type::OID => get::<u32>(row, idx)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(Value::from),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Value::Float),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, idx)?.map(Value::Text)
        }
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        Type::DATE => get::<NaiveDate>(row, idx)?.map(Value::Date),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?.map(Value::TimestampTz),
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|u| Value::Text(u.to_string())),
        Type::JSON | Type::JSONB => {
            get::<serde_json::Value>(row, idx)?.map(|j| Value::Text(j.to_string()))
        }
        _ => match ty.kind() {
            Kind::Enum(_) => get::<RawBytes>(row, idx)?
                .map(|raw| Value::Text(String::from_utf8_lossy(&raw.0).into_owned())),
            _ => get::<RawBytes>(row, idx)?.map(|raw| Value::Bytes(raw.0)),
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

fn convert_rows(
    statement: &tokio_postgres::Statement,
    rows: Vec<tokio_postgres::Row>,
) -> SqlResult<Rows> {
    let mut out = Rows::new(statement.columns().iter().map(|c| c.name()));
    for row in &rows {
        let values = (0..row.len())
            .map(|idx| column_value(row, idx))
            .collect::<SqlResult<Vec<_>>>()?;
        out.push(values);
    }
    Ok(out)
}

fn sql_params(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

// ==================== Handles ====================

async fn pg_execute<C: GenericClient + Sync>(
    client: &C,
    sql: &str,
    params: &[Value],
) -> SqlResult<ExecOutcome> {
    let rows_affected = client
        .execute(sql, &sql_params(params))
        .await
        .map_err(TrySqlError::from_pg_error)?;
    Ok(ExecOutcome {
        rows_affected,
        last_insert_id: None,
    })
}

async fn pg_query<C: GenericClient + Sync>(
    client: &C,
    sql: &str,
    params: &[Value],
) -> SqlResult<Rows> {
    // Prepared explicitly so the column list is known even for an empty result.
    let statement = client
        .prepare(sql)
        .await
        .map_err(TrySqlError::from_pg_error)?;
    let rows = client
        .query(&statement, &sql_params(params))
        .await
        .map_err(TrySqlError::from_pg_error)?;
    convert_rows(&statement, rows)
}

impl DbHandle for tokio_postgres::Client {
    async fn execute(&self, sql: &str, params: &[Value]) -> SqlResult<ExecOutcome> {
        pg_execute(self, sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> SqlResult<Rows> {
        pg_query(self, sql, params).await
    }
}

impl DbHandle for tokio_postgres::Transaction<'_> {
    async fn execute(&self, sql: &str, params: &[Value]) -> SqlResult<ExecOutcome> {
        pg_execute(self, sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> SqlResult<Rows> {
        pg_query(self, sql, params).await
    }
}

impl TxHandle for tokio_postgres::Transaction<'_> {
    async fn commit(self) -> SqlResult<()> {
        tokio_postgres::Transaction::commit(self)
            .await
            .map_err(TrySqlError::from_pg_error)
    }

    async fn rollback(self) -> SqlResult<()> {
        tokio_postgres::Transaction::rollback(self)
            .await
            .map_err(TrySqlError::from_pg_error)
    }
}

fn inner_client(conn: &Object) -> &tokio_postgres::Client {
    conn
}

impl DbHandle for Object {
    async fn execute(&self, sql: &str, params: &[Value]) -> SqlResult<ExecOutcome> {
        pg_execute(inner_client(self), sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> SqlResult<Rows> {
        pg_query(inner_client(self), sql, params).await
    }
}

/// Every call checks a connection out of the pool for its own duration.
impl DbHandle for Pool {
    async fn execute(&self, sql: &str, params: &[Value]) -> SqlResult<ExecOutcome> {
        let conn = self.get().await?;
        pg_execute(inner_client(&conn), sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> SqlResult<Rows> {
        let conn = self.get().await?;
        pg_query(inner_client(&conn), sql, params).await
    }
}

impl Transactional for Pool {
    type Tx = PgTx;

    async fn begin(&self) -> SqlResult<PgTx> {
        let conn = self.get().await?;
        inner_client(&conn)
            .batch_execute("BEGIN")
            .await
            .map_err(TrySqlError::from_pg_error)?;
        tracing::debug!(target: "trysql.tx", "transaction started");
        Ok(PgTx { conn: Some(conn) })
    }
}

/// A pooled connection inside `BEGIN`.
///
/// Dropped without `commit` or `rollback`, the connection is detached from the pool and
/// closed, which makes the server discard the transaction.
pub struct PgTx {
    conn: Option<Object>,
}

impl PgTx {
    fn client(&self) -> SqlResult<&tokio_postgres::Client> {
        match &self.conn {
            Some(conn) => Ok(inner_client(conn)),
            None => Err(TrySqlError::Other("transaction already finished".to_string())),
        }
    }

    async fn finish(mut self, command: &str) -> SqlResult<()> {
        let Some(conn) = self.conn.take() else {
            return Err(TrySqlError::Other("transaction already finished".to_string()));
        };
        match inner_client(&conn).batch_execute(command).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // connection state is unknown; keep it out of the pool
                drop(Object::take(conn));
                Err(TrySqlError::from_pg_error(e))
            }
        }
    }
}

impl DbHandle for PgTx {
    async fn execute(&self, sql: &str, params: &[Value]) -> SqlResult<ExecOutcome> {
        pg_execute(self.client()?, sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> SqlResult<Rows> {
        pg_query(self.client()?, sql, params).await
    }
}

impl TxHandle for PgTx {
    async fn commit(self) -> SqlResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self) -> SqlResult<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgTx {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(
                target: "trysql.tx",
                "transaction dropped unfinished; closing connection"
            );
            drop(Object::take(conn));
        }
    }
}
