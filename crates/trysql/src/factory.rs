//! Session factory: one dialect, one handle, shared configuration.
//!
//! The `run*` methods hand a fresh [`Session`] to a handler closure under the configured
//! statement timeout. `run_in_tx*` wrap the handler in a transaction that commits when it
//! returns `Ok` and rolls back on `Err`, on timeout, or when the handler panics.
//!
//! ```ignore
//! let factory = SessionFactory::connect_postgres(&url, FactoryConfig::new()).await?;
//!
//! let id = factory
//!     .run_in_tx(|s| {
//!         Box::pin(async move {
//!             s.insert_into("users").values("name", "alice");
//!             s.execute_for_generated_id("id").await
//!         })
//!     })
//!     .await?;
//! ```

use crate::client::{DbHandle, Transactional, TxHandle};
use crate::config::FactoryConfig;
use crate::dialect::Dialect;
use crate::error::{SqlResult, TrySqlError};
use crate::session::Session;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;

/// Creates sessions bound to one handle and one dialect.
#[derive(Debug, Clone)]
pub struct SessionFactory<H> {
    dialect: Dialect,
    handle: H,
    config: FactoryConfig,
}

impl<H> SessionFactory<H> {
    pub fn new(dialect: Dialect, handle: H, config: FactoryConfig) -> Self {
        Self {
            dialect,
            handle,
            config,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// A non-transactional session over the factory handle.
    pub fn session(&self) -> Session<'_, H> {
        Session::with_options(&self.handle, self.dialect, self.config.session_options())
    }

    /// A session over an open transaction, typically one returned by [`Self::begin`].
    pub fn tx_session<'t, T>(&self, tx: &'t T) -> Session<'t, T> {
        Session::with_options(tx, self.dialect, self.config.session_options())
    }
}

impl<H: DbHandle> SessionFactory<H> {
    /// Run `handler` with a fresh session under the configured statement timeout.
    pub async fn run<T, F>(&self, handler: F) -> SqlResult<T>
    where
        F: for<'s> FnOnce(&'s mut Session<'_, H>) -> BoxFuture<'s, SqlResult<T>>,
    {
        self.run_inner(self.config.statement_timeout, handler).await
    }

    /// Like [`Self::run`] with an explicit timeout.
    pub async fn run_with_timeout<T, F>(&self, timeout: Duration, handler: F) -> SqlResult<T>
    where
        F: for<'s> FnOnce(&'s mut Session<'_, H>) -> BoxFuture<'s, SqlResult<T>>,
    {
        self.run_inner(Some(timeout), handler).await
    }

    async fn run_inner<T, F>(&self, timeout: Option<Duration>, handler: F) -> SqlResult<T>
    where
        F: for<'s> FnOnce(&'s mut Session<'_, H>) -> BoxFuture<'s, SqlResult<T>>,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut session = self.session();
        if let Some(at) = deadline {
            session.with_deadline(at);
        }
        within(deadline, timeout, handler(&mut session)).await
    }
}

impl<H: Transactional> SessionFactory<H> {
    /// Open a transaction on the factory handle.
    ///
    /// The caller owns the commit or rollback; use [`Self::tx_session`] to build
    /// statements against it.
    pub async fn begin(&self) -> SqlResult<H::Tx> {
        self.handle.begin().await
    }

    /// Run `handler` inside a transaction under the configured statement timeout.
    pub async fn run_in_tx<T, F>(&self, handler: F) -> SqlResult<T>
    where
        F: for<'s> FnOnce(&'s mut Session<'_, H::Tx>) -> BoxFuture<'s, SqlResult<T>>,
    {
        self.run_in_tx_inner(self.config.statement_timeout, handler).await
    }

    /// Like [`Self::run_in_tx`] with an explicit timeout.
    pub async fn run_in_tx_with_timeout<T, F>(
        &self,
        timeout: Duration,
        handler: F,
    ) -> SqlResult<T>
    where
        F: for<'s> FnOnce(&'s mut Session<'_, H::Tx>) -> BoxFuture<'s, SqlResult<T>>,
    {
        self.run_in_tx_inner(Some(timeout), handler).await
    }

    async fn run_in_tx_inner<T, F>(&self, timeout: Option<Duration>, handler: F) -> SqlResult<T>
    where
        F: for<'s> FnOnce(&'s mut Session<'_, H::Tx>) -> BoxFuture<'s, SqlResult<T>>,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        let tx = within(deadline, timeout, self.handle.begin()).await?;

        let outcome = {
            let mut session = self.tx_session(&tx);
            if let Some(at) = deadline {
                session.with_deadline(at);
            }
            let guarded = AssertUnwindSafe(handler(&mut session)).catch_unwind();
            match deadline {
                Some(at) => match tokio::time::timeout_at(at, guarded).await {
                    Ok(caught) => caught,
                    Err(_) => Ok(Err(TrySqlError::Timeout(timeout.unwrap_or_default()))),
                },
                None => guarded.await,
            }
        };

        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await?;
                tracing::debug!(target: "trysql.tx", "transaction committed");
                Ok(value)
            }
            Ok(Err(error)) => match tx.rollback().await {
                Ok(()) => {
                    tracing::warn!(target: "trysql.tx", error = %error, "transaction rolled back");
                    Err(error)
                }
                Err(rollback) => Err(TrySqlError::Rollback {
                    original: Box::new(error),
                    rollback: Box::new(rollback),
                }),
            },
            Err(panic) => {
                if let Err(rollback) = tx.rollback().await {
                    panic!("rollback after panic failed: {rollback}");
                }
                tracing::warn!(target: "trysql.tx", "transaction rolled back after panic");
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Await `fut`, failing with [`TrySqlError::Timeout`] once `deadline` passes.
async fn within<T>(
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    fut: impl Future<Output = SqlResult<T>>,
) -> SqlResult<T> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| TrySqlError::Timeout(timeout.unwrap_or_default()))?,
        None => fut.await,
    }
}

#[cfg(feature = "postgres")]
impl SessionFactory<deadpool_postgres::Pool> {
    /// Build a Postgres pool from `url`, check out one connection to verify it, and
    /// return a factory over the pool.
    pub async fn connect_postgres(url: &str, config: FactoryConfig) -> SqlResult<Self> {
        let pool = crate::config::pg::build_pool(url, &config)?;
        drop(pool.get().await?);
        Ok(Self::new(Dialect::Postgres, pool, config))
    }
}

#[cfg(feature = "mysql")]
impl SessionFactory<sqlx::MySqlPool> {
    /// Build a MySQL pool from `url` (connecting once) and return a factory over it.
    pub async fn connect_mysql(url: &str, config: FactoryConfig) -> SqlResult<Self> {
        let pool = crate::config::my::pool_options(&config)
            .connect(url)
            .await
            .map_err(TrySqlError::from_mysql_error)?;
        Ok(Self::new(Dialect::MySql, pool, config))
    }
}
