//! Factory configuration.
//!
//! ```toml
//! max_open = 20
//! max_idle = 5
//! conn_max_lifetime = 1800    # seconds
//! conn_max_idle_time = 300    # seconds
//! statement_timeout = 5       # seconds
//! log_sql = true
//! log_max_sql_length = 2048
//! ```

use crate::error::SqlResult;
use crate::session::SessionOptions;
use crate::sql_log::SqlLogger;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Pool sizing, statement timeout and SQL logging for a [`SessionFactory`].
///
/// Zero values for the pool fields mean "driver default", matching how they are
/// forwarded to the pool builders.
///
/// [`SessionFactory`]: crate::SessionFactory
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Maximum number of open connections.
    pub max_open: usize,
    /// Connections kept open while idle.
    pub max_idle: usize,
    #[serde(deserialize_with = "seconds")]
    pub conn_max_lifetime: Option<Duration>,
    #[serde(deserialize_with = "seconds")]
    pub conn_max_idle_time: Option<Duration>,
    /// Default budget for every handler run through the factory.
    #[serde(deserialize_with = "seconds")]
    pub statement_timeout: Option<Duration>,
    /// Default for [`Session::log_sql`](crate::Session::log_sql).
    pub log_sql: bool,
    /// Truncate logged SQL text to this many bytes.
    pub log_max_sql_length: Option<usize>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            max_open: 16,
            max_idle: 0,
            conn_max_lifetime: None,
            conn_max_idle_time: None,
            statement_timeout: Some(Duration::from_secs(30)),
            log_sql: false,
            log_max_sql_length: None,
        }
    }
}

impl FactoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(input: &str) -> SqlResult<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn max_open(mut self, n: usize) -> Self {
        self.max_open = n;
        self
    }

    pub fn max_idle(mut self, n: usize) -> Self {
        self.max_idle = n;
        self
    }

    pub fn conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = Some(lifetime);
        self
    }

    pub fn conn_max_idle_time(mut self, idle: Duration) -> Self {
        self.conn_max_idle_time = Some(idle);
        self
    }

    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Run handlers without a default deadline.
    pub fn no_statement_timeout(mut self) -> Self {
        self.statement_timeout = None;
        self
    }

    pub fn log_sql(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    pub fn log_max_sql_length(mut self, max: usize) -> Self {
        self.log_max_sql_length = Some(max);
        self
    }

    /// Options copied into every session the factory creates.
    ///
    /// The statement timeout is applied by the factory's `run*` methods as a deadline,
    /// so it is not repeated here as a per-call budget.
    pub(crate) fn session_options(&self) -> SessionOptions {
        let logger = match self.log_max_sql_length {
            Some(max) => SqlLogger::new().max_sql_length(max),
            None => SqlLogger::new(),
        };
        SessionOptions {
            log_sql: self.log_sql,
            logger,
            statement_timeout: None,
        }
    }
}

/// Optional whole seconds; `0` means unset.
fn seconds<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = Option::<u64>::deserialize(deserializer)?;
    Ok(secs.filter(|s| *s > 0).map(Duration::from_secs))
}

#[cfg(feature = "postgres")]
pub(crate) mod pg {
    use super::FactoryConfig;
    use crate::error::{SqlResult, TrySqlError};
    use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
    use tokio_postgres::NoTls;

    /// Build a deadpool pool from `url` with the pool fields of `config`.
    ///
    /// deadpool has no idle-connection count or lifetime limits; those fields are
    /// reported once and ignored.
    pub(crate) fn build_pool(url: &str, config: &FactoryConfig) -> SqlResult<Pool> {
        let pg_config: tokio_postgres::Config = url
            .parse()
            .map_err(|e: tokio_postgres::Error| TrySqlError::Connection(e.to_string()))?;

        if config.max_idle > 0
            || config.conn_max_lifetime.is_some()
            || config.conn_max_idle_time.is_some()
        {
            tracing::warn!(
                target: "trysql.config",
                max_idle = config.max_idle,
                conn_max_lifetime = ?config.conn_max_lifetime,
                conn_max_idle_time = ?config.conn_max_idle_time,
                "deadpool-postgres ignores idle and lifetime limits"
            );
        }

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let mut builder = Pool::builder(manager);
        if config.max_open > 0 {
            builder = builder.max_size(config.max_open);
        }
        builder.build().map_err(|e| TrySqlError::Pool(e.to_string()))
    }
}

#[cfg(feature = "mysql")]
pub(crate) mod my {
    use super::FactoryConfig;
    use sqlx::mysql::MySqlPoolOptions;

    /// Pool options carrying the pool fields of `config`.
    pub(crate) fn pool_options(config: &FactoryConfig) -> MySqlPoolOptions {
        let mut options = MySqlPoolOptions::new();
        if config.max_open > 0 {
            options = options.max_connections(config.max_open as u32);
        }
        if config.max_idle > 0 {
            // sqlx keeps at least this many connections open.
            options = options.min_connections(config.max_idle as u32);
        }
        options
            .max_lifetime(config.conn_max_lifetime)
            .idle_timeout(config.conn_max_idle_time)
    }
}
