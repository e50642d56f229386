//! Convenient imports for typical `trysql` usage.
//!
//! ```ignore
//! use trysql::prelude::*;
//! ```

pub use crate::{
    BoxFuture, DbHandle, Dialect, FactoryConfig, FromValue, Record, RowMap, Session,
    SessionFactory, SqlResult, TrySqlError, Value, params,
};
