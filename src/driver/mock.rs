//! In-memory driver for tests and demos
//!
//! [`MockConnector`] hands out sessions whose behavior is scripted through
//! shared plan queues: each connect, ping and query pops the next planned
//! outcome, and anything without a plan succeeds. This is enough to exercise
//! every pool path (exhaustion, dead sessions, transport errors mid-query)
//! without a MySQL server.

use super::{Connector, DriverError, DriverHandle, DriverOptions, ResultData};
use crate::config::ReplicaConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Planned outcome of one `query` call
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// A statement that produced a result set
    Rows(ResultData),

    /// A statement that affected rows and produced no set
    Affected(u64),
}

impl MockOutcome {
    /// Build a NULL-free result set from string literals
    pub fn result_set(field_names: &[&str], rows: &[&[&str]]) -> Self {
        MockOutcome::Rows(ResultData {
            field_names: field_names.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| Some(cell.to_string())).collect())
                .collect(),
        })
    }
}

#[derive(Debug, Default)]
struct MockState {
    /// Planned connect failures; an empty queue means connects succeed
    connect_plan: VecDeque<Option<DriverError>>,

    /// Planned ping outcomes; empty means pings succeed
    ping_plan: VecDeque<Option<DriverError>>,

    /// Planned query outcomes; empty means `Affected(0)`
    query_plan: VecDeque<Result<MockOutcome, DriverError>>,

    connect_count: u64,
    connects_per_replica: HashMap<String, u64>,
}

/// Scriptable driver factory, cheap to clone and share with the pool
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect attempts fail with `code`
    pub fn fail_next_connects(&self, count: usize, code: u32) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state
                .connect_plan
                .push_back(Some(DriverError::new(code, "mock connect refused")));
        }
    }

    /// Queue one successful connect (useful between planned failures)
    pub fn pass_next_connect(&self) {
        self.state.lock().connect_plan.push_back(None);
    }

    /// Make the next `count` pings fail with `code`
    pub fn fail_next_pings(&self, count: usize, code: u32) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state
                .ping_plan
                .push_back(Some(DriverError::new(code, "mock ping failed")));
        }
    }

    /// Queue a query outcome
    pub fn push_query(&self, outcome: MockOutcome) {
        self.state.lock().query_plan.push_back(Ok(outcome));
    }

    /// Queue a query failure with `code`
    pub fn push_query_error(&self, code: u32, message: &str) {
        self.state
            .lock()
            .query_plan
            .push_back(Err(DriverError::new(code, message)));
    }

    /// Total successful and failed connect attempts seen so far
    pub fn connect_count(&self) -> u64 {
        self.state.lock().connect_count
    }

    /// Connect attempts routed to one replica, keyed by `(host, port)`
    pub fn connects_for(&self, host: &str, port: u16) -> u64 {
        let key = format!("{host}:{port}");
        self.state
            .lock()
            .connects_per_replica
            .get(&key)
            .copied()
            .unwrap_or(0)
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        replica: &ReplicaConfig,
        _options: &DriverOptions,
    ) -> Result<Box<dyn DriverHandle>, DriverError> {
        let mut state = self.state.lock();
        state.connect_count += 1;
        let key = format!("{}:{}", replica.host, replica.port);
        *state.connects_per_replica.entry(key).or_insert(0) += 1;

        if let Some(Some(err)) = state.connect_plan.pop_front() {
            return Err(err);
        }

        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            current: None,
        }))
    }
}

#[derive(Debug)]
struct MockSession {
    state: Arc<Mutex<MockState>>,
    /// Outcome of the last `query`, consulted by the result accessors
    current: Option<MockOutcome>,
}

impl DriverHandle for MockSession {
    fn ping(&mut self) -> Result<(), DriverError> {
        match self.state.lock().ping_plan.pop_front() {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    fn query(&mut self, _sql: &str) -> Result<(), DriverError> {
        match self.state.lock().query_plan.pop_front() {
            Some(Ok(outcome)) => {
                self.current = Some(outcome);
                Ok(())
            }
            Some(Err(err)) => {
                self.current = None;
                Err(err)
            }
            None => {
                self.current = Some(MockOutcome::Affected(0));
                Ok(())
            }
        }
    }

    fn store_result(&mut self) -> Result<Option<ResultData>, DriverError> {
        match &self.current {
            Some(MockOutcome::Rows(data)) => Ok(Some(data.clone())),
            _ => Ok(None),
        }
    }

    fn field_count(&self) -> u32 {
        match &self.current {
            Some(MockOutcome::Rows(data)) => data.field_names.len() as u32,
            _ => 0,
        }
    }

    fn affected_rows(&self) -> u64 {
        match &self.current {
            Some(MockOutcome::Affected(n)) => *n,
            Some(MockOutcome::Rows(data)) => data.rows.len() as u64,
            None => 0,
        }
    }

    fn escape(&mut self, input: &str) -> String {
        let mut escaped = String::with_capacity(input.len() * 2);
        for c in input.chars() {
            match c {
                '\0' => escaped.push_str("\\0"),
                '\n' => escaped.push_str("\\n"),
                '\r' => escaped.push_str("\\r"),
                '\\' => escaped.push_str("\\\\"),
                '\'' => escaped.push_str("\\'"),
                '"' => escaped.push_str("\\\""),
                '\x1a' => escaped.push_str("\\Z"),
                other => escaped.push(other),
            }
        }
        escaped
    }
}
