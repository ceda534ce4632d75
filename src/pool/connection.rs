use crate::config::ReplicaConfig;
use crate::driver::{is_connection_error, Connector, DriverHandle, DriverOptions, CR_UNKNOWN_ERROR};
use crate::error::{Error, Result};
use crate::result::QueryResult;
use crate::stats::PoolMetrics;
use crate::util;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Per-attempt reconnect delay ceiling; bounds thundering-herd on a
/// shared backend
const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

struct ConnectionInner {
    handle: Option<Box<dyn DriverHandle>>,
    total_reconnect_attempts: u32,
    successful_reconnects: u32,
}

/// One session to one MySQL replica.
///
/// A session owns at most one driver handle and recovers from transport
/// failures on its own: `execute_query`/`execute_update` transparently
/// reconnect with capped, jittered exponential backoff when the server
/// reports a connection-level error.
///
/// All handle operations serialize on the session's own lock; while checked
/// out of the pool a session belongs to exactly one caller.
pub struct Connection {
    replica: ReplicaConfig,
    options: DriverOptions,
    connector: Arc<dyn Connector>,
    /// 16 random alphanumerics, stable for the session's lifetime
    id: String,
    created_at: i64,
    last_active_at: AtomicI64,
    reconnect_interval_ms: u64,
    reconnect_attempts: u32,
    /// Set by the pool at shutdown; statements then fail without touching
    /// the driver
    cancelled: AtomicBool,
    metrics: Arc<PoolMetrics>,
    inner: Mutex<ConnectionInner>,
}

impl Connection {
    /// Capture parameters and policy without touching the network.
    /// Call [`connect`](Self::connect) to open the session.
    pub fn new(
        replica: ReplicaConfig,
        options: DriverOptions,
        connector: Arc<dyn Connector>,
        reconnect_interval_ms: u64,
        reconnect_attempts: u32,
        metrics: Arc<PoolMetrics>,
    ) -> Self {
        let now = util::current_time_millis();
        Self {
            replica,
            options,
            connector,
            id: util::random_id(16),
            created_at: now,
            last_active_at: AtomicI64::new(now),
            reconnect_interval_ms,
            reconnect_attempts,
            cancelled: AtomicBool::new(false),
            metrics,
            inner: Mutex::new(ConnectionInner {
                handle: None,
                total_reconnect_attempts: 0,
                successful_reconnects: 0,
            }),
        }
    }

    /// Open the session with a single driver connect. Returns whether it
    /// succeeded.
    pub fn connect(&self) -> bool {
        if self.is_cancelled() {
            warn!(connection_id = %self.id, "session is cancelled, refusing to connect");
            return false;
        }
        let mut inner = self.inner.lock();
        match self.connector.connect(&self.replica, &self.options) {
            Ok(handle) => {
                inner.handle = Some(handle);
                self.touch();
                debug!(
                    connection_id = %self.id,
                    replica = %self.replica.connection_string(),
                    "connected"
                );
                true
            }
            Err(e) => {
                error!(
                    connection_id = %self.id,
                    replica = %self.replica.connection_string(),
                    code = e.code,
                    error = %e.message,
                    "failed to connect"
                );
                false
            }
        }
    }

    /// Ping-based liveness check with no side effects: no reconnect, no
    /// counter updates.
    pub fn is_valid_quietly(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.handle.as_mut() {
            None => false,
            Some(handle) => handle.ping().is_ok(),
        }
    }

    /// Liveness check that may recover the session: when the ping fails
    /// with a transport-level error and `try_reconnect` is set, the lock is
    /// released and the session reconnects.
    pub fn is_valid(&self, try_reconnect: bool) -> bool {
        {
            let mut inner = self.inner.lock();
            let handle = match inner.handle.as_mut() {
                None => return false,
                Some(handle) => handle,
            };
            match handle.ping() {
                Ok(()) => {
                    self.touch();
                    return true;
                }
                Err(e) => {
                    if !try_reconnect || !is_connection_error(e.code) {
                        debug!(
                            connection_id = %self.id,
                            code = e.code,
                            "ping failed, connection invalid"
                        );
                        return false;
                    }
                    info!(
                        connection_id = %self.id,
                        code = e.code,
                        "ping failed with a transport error, trying to reconnect"
                    );
                }
            }
        }
        self.reconnect()
    }

    /// Drop the current handle and retry the connect up to the configured
    /// number of attempts, sleeping a capped, jittered exponential backoff
    /// between attempts (lock released across the sleep).
    pub fn reconnect(&self) -> bool {
        if self.is_cancelled() {
            debug!(connection_id = %self.id, "session is cancelled, skipping reconnect");
            return false;
        }
        let mut inner = self.inner.lock();
        inner.handle = None;

        for attempt in 1..=self.reconnect_attempts {
            inner.total_reconnect_attempts += 1;

            match self.connector.connect(&self.replica, &self.options) {
                Ok(handle) => {
                    inner.successful_reconnects += 1;
                    inner.handle = Some(handle);
                    self.touch();
                    info!(
                        connection_id = %self.id,
                        attempt,
                        "reconnected"
                    );
                    self.metrics.record_reconnection(true);
                    return true;
                }
                Err(e) => {
                    warn!(
                        connection_id = %self.id,
                        attempt,
                        code = e.code,
                        error = %e.message,
                        "reconnect attempt failed"
                    );
                    if attempt < self.reconnect_attempts {
                        let delay = self.reconnect_delay(attempt);
                        drop(inner);
                        std::thread::sleep(Duration::from_millis(delay));
                        inner = self.inner.lock();
                    }
                }
            }
        }

        self.metrics.record_reconnection(false);
        false
    }

    /// `min(interval · 2^(attempt−1), 30s)` with ±20% jitter, at least 1 ms
    fn reconnect_delay(&self, attempt: u32) -> u64 {
        let shift = (attempt - 1).min(31);
        let exponential = self.reconnect_interval_ms.saturating_mul(1u64 << shift);
        let capped = exponential.min(MAX_RECONNECT_DELAY_MS);

        let jittered = capped as f64 * rand::thread_rng().gen_range(0.8..1.2);
        let delay = jittered.max(1.0) as u64;
        debug!(connection_id = %self.id, attempt, delay_ms = delay, "computed reconnect delay");
        delay
    }

    /// Run a SELECT-style statement, reconnecting on transport errors
    pub fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.execute_with_reconnect(sql, true)
    }

    /// Run an INSERT/UPDATE/DELETE-style statement, reconnecting on
    /// transport errors. Returns the affected-row count.
    pub fn execute_update(&self, sql: &str) -> Result<u64> {
        self.execute_with_reconnect(sql, false)
            .map(|result| result.affected_rows())
    }

    fn execute_internal(&self, sql: &str, is_query: bool) -> Result<QueryResult> {
        if self.is_cancelled() {
            return Err(Error::NotRunning);
        }
        let mut inner = self.inner.lock();
        let handle = inner.handle.as_mut().ok_or(Error::TransportGone)?;

        self.touch();
        debug!(
            connection_id = %self.id,
            kind = if is_query { "query" } else { "update" },
            sql,
            "executing"
        );

        if let Err(e) = handle.query(sql) {
            error!(
                connection_id = %self.id,
                code = e.code,
                error = %e.message,
                sql,
                "statement failed"
            );
            return Err(e.into());
        }

        if is_query {
            match handle.store_result() {
                Ok(Some(data)) => Ok(QueryResult::from_data(data)),
                Ok(None) => {
                    if handle.field_count() > 0 {
                        Err(Error::Sql {
                            code: CR_UNKNOWN_ERROR,
                            message: "statement produced columns but no result set".to_string(),
                        })
                    } else {
                        Ok(QueryResult::from_affected(handle.affected_rows()))
                    }
                }
                Err(e) => Err(e.into()),
            }
        } else {
            Ok(QueryResult::from_affected(handle.affected_rows()))
        }
    }

    fn execute_with_reconnect(&self, sql: &str, is_query: bool) -> Result<QueryResult> {
        let start = Instant::now();
        let total_attempts = self.reconnect_attempts + 1;
        let mut last_message = String::new();

        for attempt in 0..total_attempts {
            if attempt > 0 && !self.reconnect() {
                last_message = "failed to reconnect".to_string();
                warn!(connection_id = %self.id, attempt, "reconnection failed, will retry");
                continue;
            }

            match self.execute_internal(sql, is_query) {
                Ok(result) => {
                    self.metrics
                        .record_query_executed(util::elapsed_micros(start), true);
                    return Ok(result);
                }
                Err(e) if e.is_transport() => {
                    warn!(
                        connection_id = %self.id,
                        attempt,
                        error = %e,
                        "connection lost during execution"
                    );
                    last_message = e.to_string();
                }
                Err(e) => {
                    // SQL-level failure, retrying cannot help
                    self.metrics
                        .record_query_executed(util::elapsed_micros(start), false);
                    return Err(e);
                }
            }
        }

        self.metrics
            .record_query_executed(util::elapsed_micros(start), false);
        error!(
            connection_id = %self.id,
            attempts = total_attempts,
            error = %last_message,
            sql,
            "statement failed after all attempts"
        );
        Err(Error::RetriesExhausted {
            attempts: total_attempts,
            message: last_message,
            sql: sql.to_string(),
        })
    }

    /// Start a transaction. Transactions are bound to the live handle and
    /// never cross a reconnect; failures return `false` instead of raising.
    pub fn begin_transaction(&self) -> bool {
        self.transaction_command("START TRANSACTION")
    }

    /// Commit the open transaction
    pub fn commit(&self) -> bool {
        self.transaction_command("COMMIT")
    }

    /// Roll back the open transaction
    pub fn rollback(&self) -> bool {
        self.transaction_command("ROLLBACK")
    }

    fn transaction_command(&self, sql: &str) -> bool {
        debug!(connection_id = %self.id, sql, "transaction control");
        match self.execute_internal(sql, false) {
            Ok(_) => true,
            Err(e) => {
                error!(connection_id = %self.id, sql, error = %e, "transaction control failed");
                false
            }
        }
    }

    /// Escape a string against the session charset
    pub fn escape(&self, input: &str) -> Result<String> {
        let mut inner = self.inner.lock();
        let handle = inner.handle.as_mut().ok_or(Error::TransportGone)?;
        Ok(handle.escape(input))
    }

    /// Drop the driver handle; subsequent operations fail cleanly
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.handle.take().is_some() {
            info!(connection_id = %self.id, "connection closed");
        }
    }

    /// Stable session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Replica this session is bound to
    pub fn replica(&self) -> &ReplicaConfig {
        &self.replica
    }

    /// Creation time, wall-clock milliseconds
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Last successful use, wall-clock milliseconds
    pub fn last_active_at(&self) -> i64 {
        self.last_active_at.load(Ordering::Relaxed)
    }

    /// Lifetime reconnect attempts on this session
    pub fn total_reconnect_attempts(&self) -> u32 {
        self.inner.lock().total_reconnect_attempts
    }

    /// Lifetime successful reconnects on this session
    pub fn successful_reconnects(&self) -> u32 {
        self.inner.lock().successful_reconnects
    }

    /// Zero the per-session reconnect counters
    pub fn reset_reconnect_stats(&self) {
        let mut inner = self.inner.lock();
        inner.total_reconnect_attempts = 0;
        inner.successful_reconnects = 0;
        info!(connection_id = %self.id, "reconnect statistics reset");
    }

    pub(crate) fn touch(&self) {
        self.last_active_at
            .store(util::current_time_millis(), Ordering::Relaxed);
    }

    /// Mark the session cancelled. Statements and reconnects fail from
    /// here on without reaching the driver; the pool uses this at shutdown
    /// so callers still holding the session fail cleanly.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
