//! # trysql
//!
//! A dialect-aware fluent SQL builder for MySQL and Postgres.
//!
//! ## Features
//!
//! - **Placeholder tokens**: `#{name}` is sent as a bound argument, `${name}` is spliced
//!   into the text
//! - **One builder, two dialects**: the same session renders `?` markers for MySQL and
//!   `$1, $2, ..` markers for Postgres
//! - **Row mapping**: rows decode into records (with embedded sub-records), scalars or
//!   ordered maps
//! - **Transactions**: the session factory commits on `Ok`, rolls back on `Err`, timeout
//!   or panic
//! - **SQL logging**: rendered statements and arguments go through `tracing`
//!
//! ## Example
//!
//! ```ignore
//! use trysql::prelude::*;
//!
//! #[derive(Debug, Default, Record)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! let factory = SessionFactory::connect_postgres(&url, FactoryConfig::new()).await?;
//! let mut s = factory.session();
//! let users: Vec<User> = s
//!     .select(["id", "name"])
//!     .from(["${table}"])
//!     .add_param("${table}", "users")
//!     .where_("name LIKE #{pattern}", ("a%",))
//!     .limit(10)
//!     .as_record_list()
//!     .await?;
//! ```

extern crate self as trysql;

pub mod client;
pub mod config;
pub mod dialect;
pub mod error;
pub mod factory;
pub mod placeholder;
pub mod prelude;
pub mod row;
pub mod session;
pub mod sql_log;
pub mod statement;
pub mod value;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{DbHandle, ExecOutcome, Transactional, TxHandle};
pub use config::FactoryConfig;
pub use dialect::{Dialect, RenderedSql};
pub use error::{SqlResult, TrySqlError};
pub use factory::SessionFactory;
pub use row::{FieldNode, Record, Row, RowMap, Rows, ScanPlan};
pub use session::{Session, SessionOptions};
pub use sql_log::SqlLogger;
pub use statement::{LimitingRows, Statement, StatementKind};
pub use value::{FromValue, IntoValues, Value};

#[cfg(feature = "postgres")]
pub use postgres::PgTx;

#[cfg(feature = "mysql")]
pub use mysql::MySqlTx;

#[cfg(feature = "derive")]
pub use trysql_derive::Record;

// Re-exported for generated code and handler signatures.
pub use futures_util::future::BoxFuture;
