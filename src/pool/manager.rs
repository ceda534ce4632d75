use crate::config::{Config, PoolConfig, ReplicaConfig};
use crate::driver::{Connector, DriverOptions};
use crate::error::{Error, Result};
use crate::lb::{LoadBalancer, Strategy};
use crate::pool::Connection;
use crate::stats::PoolMetrics;
use crate::util;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

struct PoolState {
    config: PoolConfig,
    /// FIFO: acquire pops the head, release pushes the tail
    idle: VecDeque<Arc<Connection>>,
    /// Checked-out sessions by id, kept for introspection and accounting
    active: HashMap<String, Arc<Connection>>,
    total: usize,
}

struct PoolInner {
    connector: Arc<dyn Connector>,
    balancer: Arc<LoadBalancer>,
    metrics: Arc<PoolMetrics>,
    state: Mutex<PoolState>,
    /// Signalled on every release so waiters can re-check for capacity
    available: Condvar,
    running: AtomicBool,
    /// Wakes the health thread out of its sleep at shutdown
    stopped: Mutex<bool>,
    stop_cond: Condvar,
    health_thread: Mutex<Option<JoinHandle<()>>>,
}

/// Multiplexes a bounded set of live MySQL sessions among concurrent
/// callers.
///
/// Callers acquire a [`PooledConnection`] guard, use it like a
/// [`Connection`], and drop it to hand the session back. A background
/// health thread evicts idle and dead sessions and refills the pool to its
/// configured minimum. New sessions are spread across replicas by the
/// [`LoadBalancer`].
///
/// The handle is cheap to clone; clones share the same pool. Call
/// [`shutdown`](Self::shutdown) when done so the health thread is joined
/// and idle sessions are closed.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create an uninitialized pool. Call [`init`](Self::init) to open the
    /// initial sessions and start the health thread.
    pub fn new(connector: Arc<dyn Connector>, balancer: Arc<LoadBalancer>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                balancer,
                metrics: Arc::new(PoolMetrics::new()),
                state: Mutex::new(PoolState {
                    config: PoolConfig::default(),
                    idle: VecDeque::new(),
                    active: HashMap::new(),
                    total: 0,
                }),
                available: Condvar::new(),
                running: AtomicBool::new(false),
                stopped: Mutex::new(false),
                stop_cond: Condvar::new(),
                health_thread: Mutex::new(None),
            }),
        }
    }

    /// Build, configure and start a pool over one replica
    pub fn with_single_replica(
        connector: Arc<dyn Connector>,
        config: PoolConfig,
        replica: ReplicaConfig,
    ) -> Result<Self> {
        let balancer = Arc::new(LoadBalancer::single(replica)?);
        let pool = Self::new(connector, balancer);
        pool.init(config)?;
        Ok(pool)
    }

    /// Build, configure and start a pool over several replicas
    pub fn with_replicas(
        connector: Arc<dyn Connector>,
        config: PoolConfig,
        replicas: Vec<ReplicaConfig>,
        strategy: Strategy,
    ) -> Result<Self> {
        let balancer = Arc::new(LoadBalancer::new(replicas, strategy)?);
        let pool = Self::new(connector, balancer);
        pool.init(config)?;
        Ok(pool)
    }

    /// Build and start a pool from a loaded [`Config`]
    pub fn from_config(connector: Arc<dyn Connector>, config: Config) -> Result<Self> {
        Self::with_replicas(connector, config.pool, config.replicas, config.strategy)
    }

    /// Open the initial sessions and start the health thread.
    ///
    /// Fails when the pool is already running, the config is invalid, or a
    /// positive `init_connections` target yields zero sessions. Opening
    /// fewer than `min_connections` logs a warning and proceeds; the health
    /// loop keeps refilling.
    pub fn init(&self, config: PoolConfig) -> Result<()> {
        config.validate()?;

        let inner = &self.inner;
        let mut state = inner.state.lock();
        if inner.running.load(Ordering::SeqCst) {
            warn!("init called while the pool is already running");
            return Err(Error::Config(
                "connection pool is already running".to_string(),
            ));
        }
        state.config = config.clone();

        let target = config.init_connections.min(config.max_connections) as usize;
        let mut created = 0usize;
        for attempt in 1..=target {
            match self.open_connection(&config) {
                Ok(conn) => {
                    state.idle.push_back(conn);
                    state.total += 1;
                    created += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "failed to open a connection during init");
                }
            }
        }
        debug!(created, target, "initial connections opened");

        if target > 0 && created == 0 {
            while let Some(conn) = state.idle.pop_front() {
                conn.close();
            }
            state.total = 0;
            error!("no connection could be opened during pool startup");
            return Err(Error::Connect(
                "could not open any connection during pool startup".to_string(),
            ));
        }
        if (created as u32) < config.min_connections {
            warn!(
                created,
                min_connections = config.min_connections,
                "started below the configured minimum"
            );
        }

        *inner.stopped.lock() = false;
        inner.running.store(true, Ordering::SeqCst);

        let pool = self.clone();
        *inner.health_thread.lock() = Some(std::thread::spawn(move || {
            pool.health_check_worker();
        }));

        info!(config = %config.summary(), created, "connection pool started");
        Ok(())
    }

    /// Borrow a session, waiting up to `timeout_ms` for capacity.
    ///
    /// `timeout_ms == 0` falls back to the configured
    /// `connection_timeout_ms`. Preference order: a validated idle session,
    /// then a freshly opened one while under `max_connections`, then
    /// blocking on the waiter condition until the deadline.
    pub fn acquire(&self, timeout_ms: u64) -> Result<PooledConnection> {
        let inner = &self.inner;
        if !inner.running.load(Ordering::SeqCst) {
            inner.metrics.record_connection_failed();
            return Err(Error::NotRunning);
        }

        let start = Instant::now();
        let mut state = inner.state.lock();
        let timeout = if timeout_ms == 0 {
            state.config.connection_timeout_ms
        } else {
            timeout_ms
        };
        let deadline = start + Duration::from_millis(timeout);

        loop {
            if !inner.running.load(Ordering::SeqCst) {
                inner.metrics.record_connection_failed();
                return Err(Error::NotRunning);
            }

            if let Some(conn) = state.idle.pop_front() {
                if conn.is_valid_quietly() {
                    conn.touch();
                    state.active.insert(conn.id().to_string(), Arc::clone(&conn));
                    inner
                        .metrics
                        .record_connection_acquired(util::elapsed_micros(start));
                    debug!(connection_id = %conn.id(), "acquired idle connection");
                    return Ok(PooledConnection::new(conn, self.clone()));
                }
                // the pool shrank; waiters cannot be satisfied by this one
                info!(connection_id = %conn.id(), "idle connection failed validation, discarding");
                conn.close();
                state.total -= 1;
                continue;
            }

            if state.total < state.config.max_connections as usize {
                // reserve capacity so total never exceeds the ceiling, then
                // connect with the pool lock released
                state.total += 1;
                let config = state.config.clone();
                drop(state);
                let created = self.open_connection(&config);
                state = inner.state.lock();

                match created {
                    Ok(conn) => {
                        conn.touch();
                        state.active.insert(conn.id().to_string(), Arc::clone(&conn));
                        inner
                            .metrics
                            .record_connection_acquired(util::elapsed_micros(start));
                        debug!(connection_id = %conn.id(), "created connection for acquire");
                        return Ok(PooledConnection::new(conn, self.clone()));
                    }
                    Err(e) => {
                        state.total -= 1;
                        warn!(error = %e, "failed to create a connection during acquire");
                    }
                }
            }

            debug!("no connection available, waiting for a release");
            if Instant::now() >= deadline
                || inner.available.wait_until(&mut state, deadline).timed_out()
            {
                return Err(Error::Timeout { waited_ms: timeout });
            }
        }
    }

    /// Hand a session back; called by the guard on drop
    pub(crate) fn release(&self, conn: Arc<Connection>) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        state.active.remove(conn.id());
        let usage_ms = (util::current_time_millis() - conn.last_active_at()).max(0) as u64;
        let usage_us = usage_ms.saturating_mul(1_000);
        debug!(connection_id = %conn.id(), usage_ms, "releasing connection");

        if !inner.running.load(Ordering::SeqCst) {
            // the pool shut down while this one was checked out; shutdown
            // already closed the handle and zeroed the counters
            conn.close();
            inner.metrics.record_connection_released(usage_us);
            return;
        }

        if state.total > state.config.max_connections as usize {
            // the ceiling was lowered while this one was out
            conn.close();
            state.total -= 1;
            inner.metrics.record_connection_released(usage_us);
            inner.available.notify_all();
            return;
        }

        if conn.is_valid_quietly() {
            state.idle.push_back(conn);
        } else {
            info!(connection_id = %conn.id(), "released connection is dead, discarding");
            conn.close();
            state.total -= 1;

            if state.total < state.config.min_connections as usize {
                let config = state.config.clone();
                match self.open_connection(&config) {
                    Ok(replacement) => {
                        debug!(
                            connection_id = %replacement.id(),
                            "replacement connection created"
                        );
                        state.idle.push_back(replacement);
                        state.total += 1;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to create a replacement connection");
                    }
                }
            }
        }

        inner.metrics.record_connection_released(usage_us);
        inner.available.notify_all();
    }

    /// Open and validate one session to the replica the balancer picks
    fn open_connection(&self, config: &PoolConfig) -> Result<Arc<Connection>> {
        let inner = &self.inner;
        let replica = inner.balancer.next_replica()?;
        let conn = Arc::new(Connection::new(
            replica,
            DriverOptions::default(),
            Arc::clone(&inner.connector),
            config.reconnect_interval_ms,
            config.reconnect_attempts,
            Arc::clone(&inner.metrics),
        ));

        if !conn.connect() {
            inner.metrics.record_connection_failed();
            return Err(Error::Connect(format!(
                "failed to connect to {}",
                conn.replica().connection_string()
            )));
        }
        if !conn.is_valid_quietly() {
            conn.close();
            inner.metrics.record_connection_failed();
            return Err(Error::Connect(format!(
                "new connection to {} failed validation",
                conn.replica().connection_string()
            )));
        }

        inner.metrics.record_connection_created();
        debug!(
            connection_id = %conn.id(),
            replica = %conn.replica().connection_string(),
            "connection created"
        );
        Ok(conn)
    }

    fn health_check_worker(&self) {
        let inner = &self.inner;
        loop {
            let period = { inner.state.lock().config.health_check_period_ms };
            {
                let mut stopped = inner.stopped.lock();
                if *stopped {
                    return;
                }
                let _ = inner
                    .stop_cond
                    .wait_for(&mut stopped, Duration::from_millis(period));
                if *stopped {
                    return;
                }
            }
            if !inner.running.load(Ordering::SeqCst) {
                return;
            }

            debug!("running health pass");
            self.cleanup_idle_connections();
            self.ensure_minimum_connections();
        }
    }

    /// Evict dead sessions and those idle past `max_idle_ms`, never
    /// shrinking below `min_connections`
    fn cleanup_idle_connections(&self) {
        let mut state = self.inner.state.lock();
        let now = util::current_time_millis();
        let max_idle = state.config.max_idle_ms as i64;
        let min = state.config.min_connections as usize;
        let before = state.idle.len();

        let mut keep = VecDeque::with_capacity(before);
        while let Some(conn) = state.idle.pop_front() {
            if conn.is_valid_quietly() {
                let idle_ms = now - conn.last_active_at();
                if idle_ms <= max_idle || state.total <= min {
                    keep.push_back(conn);
                    continue;
                }
            }
            conn.close();
            state.total -= 1;
            debug!(connection_id = %conn.id(), "idle connection evicted");
        }
        state.idle = keep;

        let removed = before - state.idle.len();
        if removed > 0 {
            info!(removed, remaining = state.idle.len(), "idle cleanup finished");
        }
    }

    /// Open sessions until `total` reaches `min_connections`; stops at the
    /// first failure rather than hammering a dead backend
    fn ensure_minimum_connections(&self) {
        let mut state = self.inner.state.lock();
        let min = state.config.min_connections as usize;
        if state.total >= min {
            return;
        }

        let needed = min - state.total;
        debug!(needed, "replenishing connections to the minimum");
        for _ in 0..needed {
            let config = state.config.clone();
            match self.open_connection(&config) {
                Ok(conn) => {
                    state.idle.push_back(conn);
                    state.total += 1;
                }
                Err(e) => {
                    warn!(error = %e, "replenish failed, deferring to the next health pass");
                    break;
                }
            }
        }
    }

    /// Run one health pass on demand
    pub fn perform_health_check(&self) {
        if !self.inner.running.load(Ordering::SeqCst) {
            warn!("cannot run a health pass, pool is not running");
            return;
        }
        info!("manual health pass");
        self.cleanup_idle_connections();
        self.ensure_minimum_connections();
    }

    /// Swap the live configuration. When the new ceiling is below the
    /// current total, idle sessions are closed immediately until the total
    /// fits (or the idle queue runs dry); the health loop restores the new
    /// minimum asynchronously.
    pub fn reconfigure(&self, new_config: PoolConfig) -> Result<()> {
        new_config.validate()?;

        let mut state = self.inner.state.lock();
        state.config = new_config;

        let max = state.config.max_connections as usize;
        if state.total > max {
            let before = state.total;
            while state.total > max {
                match state.idle.pop_front() {
                    Some(conn) => {
                        conn.close();
                        state.total -= 1;
                    }
                    None => break,
                }
            }
            info!(
                closed = before - state.total,
                total = state.total,
                max,
                "pool shrunk after reconfigure"
            );
        }

        info!(config = %state.config.summary(), "pool reconfigured");
        Ok(())
    }

    /// Adjust the pool size bounds on the fly
    pub fn set_connection_limits(&self, min_connections: u32, max_connections: u32) -> Result<()> {
        if min_connections == 0 || min_connections > max_connections {
            return Err(Error::Config(format!(
                "invalid connection limits: min={min_connections}, max={max_connections}"
            )));
        }
        let mut config = self.inner.state.lock().config.clone();
        config.min_connections = min_connections;
        config.max_connections = max_connections;
        // keep the eager-open target inside the new ceiling
        config.init_connections = config.init_connections.min(max_connections);
        self.reconfigure(config)
    }

    /// Adjust the timeout settings on the fly
    pub fn set_timeout_settings(
        &self,
        connection_timeout_ms: u64,
        max_idle_ms: u64,
        health_check_period_ms: u64,
    ) -> Result<()> {
        if connection_timeout_ms == 0 || max_idle_ms == 0 || health_check_period_ms == 0 {
            return Err(Error::Config("timeout settings cannot be zero".to_string()));
        }
        let mut config = self.inner.state.lock().config.clone();
        config.connection_timeout_ms = connection_timeout_ms;
        config.max_idle_ms = max_idle_ms;
        config.health_check_period_ms = health_check_period_ms;
        self.reconfigure(config)
    }

    /// Change how new sessions are spread across replicas
    pub fn set_load_balance_strategy(&self, strategy: Strategy) {
        self.inner.balancer.set_strategy(strategy);
    }

    /// Currently active balancing strategy
    pub fn load_balance_strategy(&self) -> Strategy {
        self.inner.balancer.strategy()
    }

    /// Human-readable balancer snapshot
    pub fn load_balancer_status(&self) -> String {
        self.inner.balancer.status()
    }

    /// The balancer, for replica add/remove/re-weight at runtime
    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.inner.balancer
    }

    /// Stop the pool: wake all waiters, join the health thread and close
    /// every session, idle and checked out alike.
    ///
    /// Sessions still held by callers are marked cancelled before their
    /// handles are closed, so a later statement on one fails cleanly with
    /// [`Error::NotRunning`] instead of touching the freed handle.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        {
            let _state = inner.state.lock();
            if !inner.running.swap(false, Ordering::SeqCst) {
                return;
            }
            inner.available.notify_all();
        }

        {
            let mut stopped = inner.stopped.lock();
            *stopped = true;
            inner.stop_cond.notify_all();
        }
        if let Some(handle) = inner.health_thread.lock().take() {
            if handle.join().is_err() {
                error!("health thread terminated abnormally");
            }
        }

        let mut state = inner.state.lock();
        while let Some(conn) = state.idle.pop_front() {
            conn.close();
        }
        let cancelled = state.active.len();
        for conn in state.active.values() {
            conn.cancel();
            conn.close();
        }
        state.active.clear();
        state.total = 0;
        info!(cancelled, "connection pool shut down");
    }

    /// Whether init has completed and shutdown has not run
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Sessions waiting in the idle queue
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Sessions currently checked out
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    /// All live sessions, idle plus checked out
    pub fn total_count(&self) -> usize {
        self.inner.state.lock().total
    }

    /// Snapshot of the live configuration
    pub fn config(&self) -> PoolConfig {
        self.inner.state.lock().config.clone()
    }

    /// The pool's telemetry collector
    pub fn metrics(&self) -> Arc<PoolMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Human-readable snapshot; not part of the functional contract
    pub fn status(&self) -> String {
        let state = self.inner.state.lock();
        let mut out = String::from("ConnectionPool Status:\n");
        out += &format!(
            "  Running: {}\n",
            if self.is_running() { "Yes" } else { "No" }
        );
        out += &format!("  Total Connections: {}\n", state.total);
        out += &format!("  Idle Connections: {}\n", state.idle.len());
        out += &format!("  Active Connections: {}\n", state.active.len());
        out += &format!("  Min Connections: {}\n", state.config.min_connections);
        out += &format!("  Max Connections: {}\n", state.config.max_connections);
        out += &format!(
            "  Connection Timeout: {}ms\n",
            state.config.connection_timeout_ms
        );
        out += &format!("  Max Idle Time: {}ms\n", state.config.max_idle_ms);
        out
    }

    /// Verbose snapshot including utilization and per-session lines
    pub fn detailed_status(&self) -> String {
        let state = self.inner.state.lock();
        let mut out = String::from("=== Connection Pool Detailed Status ===\n");
        out += "Pool State:\n";
        out += &format!(
            "  Running: {}\n",
            if self.is_running() { "Yes" } else { "No" }
        );
        out += &format!("  Total Connections: {}\n", state.total);
        out += &format!("  Idle Connections: {}\n", state.idle.len());
        out += &format!("  Active Connections: {}\n", state.active.len());
        out += "Configuration:\n";
        out += &format!("  Min Connections: {}\n", state.config.min_connections);
        out += &format!("  Max Connections: {}\n", state.config.max_connections);
        out += &format!(
            "  Connection Timeout: {}ms\n",
            state.config.connection_timeout_ms
        );
        out += &format!("  Max Idle Time: {}ms\n", state.config.max_idle_ms);
        out += &format!(
            "  Health Check Period: {}ms\n",
            state.config.health_check_period_ms
        );
        out += "Health Status:\n";
        out += &format!(
            "  Pool Utilization: {:.1}%\n",
            state.active.len() as f64 / state.config.max_connections as f64 * 100.0
        );
        if !state.active.is_empty() {
            out += "Active Connections:\n";
            for (id, conn) in &state.active {
                out += &format!("  [{}] - active since: {}\n", id, conn.last_active_at());
            }
        }
        out += "=======================================";
        out
    }
}

/// A session checked out of the pool.
///
/// Dereferences to [`Connection`]; dropping the guard returns the session.
pub struct PooledConnection {
    conn: Option<Arc<Connection>>,
    pool: ConnectionPool,
}

impl PooledConnection {
    fn new(conn: Arc<Connection>, pool: ConnectionPool) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.conn.as_ref().map(|c| c.id()))
            .finish()
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection already returned")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockConnector;

    fn replica() -> ReplicaConfig {
        ReplicaConfig::new("db1", "app", "secret", "orders", 3306, 1)
    }

    fn small_config() -> PoolConfig {
        PoolConfig {
            min_connections: 2,
            max_connections: 4,
            init_connections: 2,
            connection_timeout_ms: 200,
            max_idle_ms: 60_000,
            health_check_period_ms: 60_000,
            reconnect_interval_ms: 10,
            reconnect_attempts: 1,
            ..PoolConfig::default()
        }
    }

    fn assert_counts(pool: &ConnectionPool, idle: usize, active: usize) {
        assert_eq!(pool.idle_count(), idle);
        assert_eq!(pool.active_count(), active);
        assert_eq!(pool.total_count(), idle + active);
    }

    #[test]
    fn test_init_opens_initial_connections() {
        let connector = MockConnector::new();
        let pool = ConnectionPool::with_single_replica(
            Arc::new(connector.clone()),
            small_config(),
            replica(),
        )
        .unwrap();

        assert!(pool.is_running());
        assert_counts(&pool, 2, 0);
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(pool.metrics().snapshot().connections_created, 2);
        pool.shutdown();
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let connector = MockConnector::new();
        let mut config = small_config();
        config.min_connections = 10;
        let result = ConnectionPool::with_single_replica(Arc::new(connector), config, replica());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_init_fails_when_nothing_connects() {
        let connector = MockConnector::new();
        connector.fail_next_connects(10, 2003);
        let result =
            ConnectionPool::with_single_replica(Arc::new(connector), small_config(), replica());
        assert!(matches!(result, Err(Error::Connect(_))));
    }

    #[test]
    fn test_double_init_rejected() {
        let connector = MockConnector::new();
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), small_config(), replica())
                .unwrap();
        assert!(matches!(pool.init(small_config()), Err(Error::Config(_))));
        pool.shutdown();
    }

    #[test]
    fn test_acquire_release_round_trip_is_fifo() {
        let connector = MockConnector::new();
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), small_config(), replica())
                .unwrap();

        let first_idle = {
            let conn = pool.acquire(0).unwrap();
            assert_counts(&pool, 1, 1);
            conn.id().to_string()
        };
        // guard dropped: back at the tail, total unchanged
        assert_counts(&pool, 2, 0);

        // head is now the *other* session; after one more cycle the first
        // one comes back around
        let second = pool.acquire(0).unwrap();
        assert_ne!(second.id(), first_idle);
        drop(second);

        let third = pool.acquire(0).unwrap();
        assert_eq!(third.id(), first_idle);
        drop(third);
        pool.shutdown();
    }

    #[test]
    fn test_acquire_single_element_fifo() {
        let connector = MockConnector::new();
        let mut config = small_config();
        config.min_connections = 1;
        config.init_connections = 1;
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), config, replica()).unwrap();

        let id = {
            let conn = pool.acquire(0).unwrap();
            conn.id().to_string()
        };
        let again = pool.acquire(0).unwrap();
        assert_eq!(again.id(), id);
        drop(again);
        pool.shutdown();
    }

    #[test]
    fn test_lazy_creation_with_zero_init() {
        let connector = MockConnector::new();
        let mut config = small_config();
        config.init_connections = 0;
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector.clone()), config, replica())
                .unwrap();

        assert!(pool.is_running());
        assert_counts(&pool, 0, 0);
        assert_eq!(connector.connect_count(), 0);

        let conn = pool.acquire(0).unwrap();
        assert_counts(&pool, 0, 1);
        drop(conn);
        assert_counts(&pool, 1, 0);
        pool.shutdown();
    }

    #[test]
    fn test_acquire_respects_max_connections() {
        let connector = MockConnector::new();
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), small_config(), replica())
                .unwrap();

        let held: Vec<_> = (0..4).map(|_| pool.acquire(0).unwrap()).collect();
        assert_counts(&pool, 0, 4);

        let err = pool.acquire(100).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(pool.total_count(), 4);
        drop(held);
        assert_counts(&pool, 4, 0);
        pool.shutdown();
    }

    #[test]
    fn test_acquire_when_not_running() {
        let connector = MockConnector::new();
        let balancer = Arc::new(LoadBalancer::single(replica()).unwrap());
        let pool = ConnectionPool::new(Arc::new(connector), balancer);
        assert!(matches!(pool.acquire(0), Err(Error::NotRunning)));
    }

    #[test]
    fn test_dead_release_spawns_replacement() {
        let connector = MockConnector::new();
        let mut config = small_config();
        config.min_connections = 1;
        config.init_connections = 1;
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector.clone()), config, replica())
                .unwrap();

        let conn = pool.acquire(0).unwrap();
        let dead_id = conn.id().to_string();

        // the release-side validation ping fails
        connector.fail_next_pings(1, 2013);
        drop(conn);

        assert_counts(&pool, 1, 0);
        let replacement = pool.acquire(0).unwrap();
        assert_ne!(replacement.id(), dead_id);
        drop(replacement);
        pool.shutdown();
    }

    #[test]
    fn test_dead_idle_discarded_on_acquire() {
        let connector = MockConnector::new();
        let mut config = small_config();
        config.min_connections = 1;
        config.init_connections = 2;
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector.clone()), config, replica())
                .unwrap();
        assert_counts(&pool, 2, 0);

        // first idle head fails its validation ping, second is fine
        connector.fail_next_pings(1, 2006);
        let conn = pool.acquire(0).unwrap();
        assert_counts(&pool, 0, 1);
        drop(conn);
        assert_counts(&pool, 1, 0);
        pool.shutdown();
    }

    #[test]
    fn test_reconfigure_shrinks_idle_synchronously() {
        let connector = MockConnector::new();
        let mut config = small_config();
        config.min_connections = 4;
        config.init_connections = 4;
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), config, replica()).unwrap();
        assert_counts(&pool, 4, 0);

        pool.set_connection_limits(1, 2).unwrap();
        assert!(pool.total_count() <= 2);

        // the next acquire works under the new ceiling
        let conn = pool.acquire(0).unwrap();
        assert!(pool.total_count() <= 2);
        drop(conn);
        pool.shutdown();
    }

    #[test]
    fn test_set_connection_limits_validation() {
        let connector = MockConnector::new();
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), small_config(), replica())
                .unwrap();

        assert!(pool.set_connection_limits(3, 2).is_err());
        assert!(pool.set_connection_limits(0, 2).is_err());
        assert!(pool.set_timeout_settings(0, 1, 1).is_err());
        assert!(pool.set_timeout_settings(1000, 1000, 1000).is_ok());
        assert_eq!(pool.config().max_idle_ms, 1000);
        pool.shutdown();
    }

    #[test]
    fn test_release_overshoot_after_shrink() {
        let connector = MockConnector::new();
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), small_config(), replica())
                .unwrap();

        let held: Vec<_> = (0..4).map(|_| pool.acquire(0).unwrap()).collect();
        pool.set_connection_limits(1, 2).unwrap();
        // nothing idle to shrink, checked-out sessions exceed the ceiling
        assert_eq!(pool.total_count(), 4);

        drop(held);
        // releases reconciled the overshoot
        assert!(pool.total_count() <= 2);
        assert_eq!(pool.idle_count(), pool.total_count());
        pool.shutdown();
    }

    #[test]
    fn test_cleanup_never_shrinks_below_minimum() {
        let connector = MockConnector::new();
        let mut config = small_config();
        config.init_connections = 4;
        config.max_idle_ms = 1;
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), config, replica()).unwrap();
        assert_counts(&pool, 4, 0);

        // every session ages past max_idle_ms, yet the floor holds
        std::thread::sleep(Duration::from_millis(20));
        pool.perform_health_check();
        assert_counts(&pool, 2, 0);
        pool.shutdown();
    }

    #[test]
    fn test_manual_health_check_replenishes() {
        let connector = MockConnector::new();
        let mut config = small_config();
        config.init_connections = 0;
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), config, replica()).unwrap();
        assert_counts(&pool, 0, 0);

        pool.perform_health_check();
        assert_counts(&pool, 2, 0);
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_closes_idle_and_stops() {
        let connector = MockConnector::new();
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), small_config(), replica())
                .unwrap();

        pool.shutdown();
        assert!(!pool.is_running());
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.total_count(), 0);
        assert!(matches!(pool.acquire(0), Err(Error::NotRunning)));

        // idempotent
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_cancels_checked_out_sessions() {
        let connector = MockConnector::new();
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), small_config(), replica())
                .unwrap();

        let conn = pool.acquire(0).unwrap();
        pool.shutdown();

        // maps cleared and total zeroed even while the guard is still out
        assert_eq!(pool.total_count(), 0);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 0);

        // the session was cancelled and its handle closed: statements fail
        // cleanly instead of reaching the driver
        assert!(matches!(
            conn.execute_query("SELECT 1"),
            Err(Error::NotRunning)
        ));
        assert!(!conn.is_valid_quietly());

        drop(conn);
        assert_eq!(pool.total_count(), 0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_status_strings() {
        let connector = MockConnector::new();
        let pool =
            ConnectionPool::with_single_replica(Arc::new(connector), small_config(), replica())
                .unwrap();

        let conn = pool.acquire(0).unwrap();
        let status = pool.status();
        assert!(status.contains("Running: Yes"));
        assert!(status.contains("Total Connections: 2"));

        let detailed = pool.detailed_status();
        assert!(detailed.contains("Pool Utilization"));
        assert!(detailed.contains(conn.id()));
        assert!(pool.load_balancer_status().contains("Replica Count: 1"));
        drop(conn);
        pool.shutdown();
    }
}
