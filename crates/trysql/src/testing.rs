//! Recording database handle and log capture used by unit tests.

use crate::client::{DbHandle, ExecOutcome, Transactional, TxHandle};
use crate::error::{SqlResult, TrySqlError};
use crate::row::Rows;
use crate::value::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    events: Vec<&'static str>,
    responses: VecDeque<Rows>,
    outcome: ExecOutcome,
    delay: Option<Duration>,
    fail_calls: bool,
    fail_rollback: bool,
}

/// Handle that records every call and answers from a queue of canned results.
#[derive(Clone, Default)]
pub(crate) struct MockDb {
    state: Arc<Mutex<State>>,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result set for the next query.
    pub fn with_rows(self, rows: Rows) -> Self {
        self.lock().responses.push_back(rows);
        self
    }

    pub fn with_outcome(self, outcome: ExecOutcome) -> Self {
        self.lock().outcome = outcome;
        self
    }

    /// Delay every call by `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = Some(delay);
        self
    }

    /// Record every call, then fail it with a driver error.
    pub fn failing_calls(self) -> Self {
        self.lock().fail_calls = true;
        self
    }

    pub fn failing_rollback(self) -> Self {
        self.lock().fail_rollback = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn last_call(&self) -> Option<Call> {
        self.lock().calls.last().cloned()
    }

    /// Transaction events in order: `begin`, `commit`, `rollback`.
    pub fn events(&self) -> Vec<&'static str> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, sql: &str, params: &[Value]) -> SqlResult<Option<Duration>> {
        let mut state = self.lock();
        state.calls.push(Call {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if state.fail_calls {
            return Err(TrySqlError::Driver("connection reset".to_string()));
        }
        Ok(state.delay)
    }

    fn event(&self, event: &'static str) {
        self.lock().events.push(event);
    }
}

impl DbHandle for MockDb {
    async fn execute(&self, sql: &str, params: &[Value]) -> SqlResult<ExecOutcome> {
        if let Some(delay) = self.record(sql, params)? {
            tokio::time::sleep(delay).await;
        }
        Ok(self.lock().outcome)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> SqlResult<Rows> {
        if let Some(delay) = self.record(sql, params)? {
            tokio::time::sleep(delay).await;
        }
        Ok(self.lock().responses.pop_front().unwrap_or_default())
    }
}

/// Transaction over a [`MockDb`]; shares its call log.
pub(crate) struct MockTx {
    db: MockDb,
}

impl DbHandle for MockTx {
    async fn execute(&self, sql: &str, params: &[Value]) -> SqlResult<ExecOutcome> {
        self.db.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> SqlResult<Rows> {
        self.db.query(sql, params).await
    }
}

impl TxHandle for MockTx {
    async fn commit(self) -> SqlResult<()> {
        self.db.event("commit");
        Ok(())
    }

    async fn rollback(self) -> SqlResult<()> {
        self.db.event("rollback");
        if self.db.lock().fail_rollback {
            return Err(TrySqlError::Driver("rollback failed".to_string()));
        }
        Ok(())
    }
}

impl Transactional for MockDb {
    type Tx = MockTx;

    async fn begin(&self) -> SqlResult<MockTx> {
        self.event("begin");
        Ok(MockTx { db: self.clone() })
    }
}

/// One `tracing` event with its fields formatted as text.
#[derive(Debug, Clone)]
pub(crate) struct CapturedEvent {
    pub target: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// `tracing` layer that keeps every event it sees.
#[derive(Clone, Default)]
pub(crate) struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    /// Install as the default subscriber for the current thread.
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn events(&self, target: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.target == target)
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct FieldText(BTreeMap<String, String>);

impl Visit for FieldText {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = FieldText::default();
        event.record(&mut fields);
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(CapturedEvent {
                target: event.metadata().target().to_string(),
                fields: fields.0,
            });
    }
}
