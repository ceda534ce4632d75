//! Pool performance telemetry
//!
//! [`PoolMetrics`] is a set of lock-free counters updated in-line by the
//! pool, the sessions and the reconnect path. Recording must be cheap; the
//! read side takes an eventually-consistent [`MetricsSnapshot`] and derives
//! rates from it.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info};

/// Process-wide counters for one pool.
///
/// All updates use relaxed atomics: readers observe each counter
/// consistently, but ratios across counters are only approximate.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    connections_created: AtomicU64,
    connections_acquired: AtomicU64,
    connections_released: AtomicU64,
    failed_connection_attempts: AtomicU64,

    queries_executed: AtomicU64,
    failed_queries: AtomicU64,

    reconnection_attempts: AtomicU64,
    successful_reconnections: AtomicU64,

    // accumulated durations, microseconds
    total_acquire_time_us: AtomicU64,
    total_usage_time_us: AtomicU64,
    total_query_time_us: AtomicU64,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session was opened successfully
    pub fn record_connection_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    /// A caller got a session; `acquire_time_us` covers the whole wait
    pub fn record_connection_acquired(&self, acquire_time_us: u64) {
        self.connections_acquired.fetch_add(1, Ordering::Relaxed);
        self.total_acquire_time_us
            .fetch_add(acquire_time_us, Ordering::Relaxed);
    }

    /// A session came back; `usage_time_us` is time since its last activity
    pub fn record_connection_released(&self, usage_time_us: u64) {
        self.connections_released.fetch_add(1, Ordering::Relaxed);
        self.total_usage_time_us
            .fetch_add(usage_time_us, Ordering::Relaxed);
    }

    /// Opening a session failed, or acquire was refused outright
    pub fn record_connection_failed(&self) {
        self.failed_connection_attempts
            .fetch_add(1, Ordering::Relaxed);
    }

    /// A statement finished; failures count toward `failed_queries`
    pub fn record_query_executed(&self, query_time_us: u64, success: bool) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        self.total_query_time_us
            .fetch_add(query_time_us, Ordering::Relaxed);
        if !success {
            self.failed_queries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// One full reconnect cycle ended
    pub fn record_reconnection(&self, success: bool) {
        self.reconnection_attempts.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_reconnections
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Per-counter-consistent snapshot of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_created: self.connections_created.load(Ordering::Acquire),
            connections_acquired: self.connections_acquired.load(Ordering::Acquire),
            connections_released: self.connections_released.load(Ordering::Acquire),
            failed_connection_attempts: self.failed_connection_attempts.load(Ordering::Acquire),
            queries_executed: self.queries_executed.load(Ordering::Acquire),
            failed_queries: self.failed_queries.load(Ordering::Acquire),
            reconnection_attempts: self.reconnection_attempts.load(Ordering::Acquire),
            successful_reconnections: self.successful_reconnections.load(Ordering::Acquire),
            total_acquire_time_us: self.total_acquire_time_us.load(Ordering::Acquire),
            total_usage_time_us: self.total_usage_time_us.load(Ordering::Acquire),
            total_query_time_us: self.total_query_time_us.load(Ordering::Acquire),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        info!("resetting pool performance statistics");
        self.connections_created.store(0, Ordering::Release);
        self.connections_acquired.store(0, Ordering::Release);
        self.connections_released.store(0, Ordering::Release);
        self.failed_connection_attempts.store(0, Ordering::Release);
        self.queries_executed.store(0, Ordering::Release);
        self.failed_queries.store(0, Ordering::Release);
        self.reconnection_attempts.store(0, Ordering::Release);
        self.successful_reconnections.store(0, Ordering::Release);
        self.total_acquire_time_us.store(0, Ordering::Release);
        self.total_usage_time_us.store(0, Ordering::Release);
        self.total_query_time_us.store(0, Ordering::Release);
    }

    /// Human-readable report; not part of the functional contract
    pub fn report(&self) -> String {
        let s = self.snapshot();
        let mut out = String::from("===== Pool Performance Report =====\n");
        out += &format!(
            "Generated: {}\n\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        out += "[Connections]\n";
        out += &format!("  Created: {}\n", s.connections_created);
        out += &format!("  Acquired: {}\n", s.connections_acquired);
        out += &format!("  Released: {}\n", s.connections_released);
        out += &format!("  Failed: {}\n", s.failed_connection_attempts);
        out += &format!("  Acquire success rate: {:.2}%\n", s.acquire_success_rate());
        out += &format!(
            "  Avg acquire time: {:.2} ms\n",
            s.avg_acquire_time_us() / 1000.0
        );
        out += &format!(
            "  Avg usage time: {:.2} ms\n\n",
            s.avg_usage_time_us() / 1000.0
        );
        out += "[Queries]\n";
        out += &format!("  Executed: {}\n", s.queries_executed);
        out += &format!("  Failed: {}\n", s.failed_queries);
        out += &format!("  Success rate: {:.2}%\n", s.query_success_rate());
        out += &format!(
            "  Avg execution time: {:.2} ms\n\n",
            s.avg_query_time_us() / 1000.0
        );
        out += "[Reconnections]\n";
        out += &format!("  Attempts: {}\n", s.reconnection_attempts);
        out += &format!("  Successes: {}\n", s.successful_reconnections);
        out += &format!("  Success rate: {:.2}%\n", s.reconnection_success_rate());
        out += "===================================\n";
        out
    }

    /// Export every counter and derived rate as CSV.
    ///
    /// Returns `false` on any I/O failure instead of raising.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> bool {
        match self.write_csv(path.as_ref()) {
            Ok(()) => {
                info!(path = %path.as_ref().display(), "metrics exported to CSV");
                true
            }
            Err(e) => {
                error!(path = %path.as_ref().display(), error = %e, "failed to export metrics CSV");
                false
            }
        }
    }

    fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        let s = self.snapshot();
        let mut file = std::fs::File::create(path)?;

        writeln!(file, "项目,数值,单位,说明")?;

        writeln!(file, "总创建连接数,{},个,累计创建的数据库连接数", s.connections_created)?;
        writeln!(file, "总获取连接数,{},次,累计获取连接的请求数", s.connections_acquired)?;
        writeln!(file, "总释放连接数,{},次,累计释放连接的次数", s.connections_released)?;
        writeln!(file, "连接失败次数,{},次,获取连接失败的次数", s.failed_connection_attempts)?;

        writeln!(file, "总查询执行数,{},次,累计执行的SQL查询数", s.queries_executed)?;
        writeln!(file, "查询失败次数,{},次,执行失败的查询数", s.failed_queries)?;

        writeln!(file, "重连尝试次数,{},次,网络断开后的重连尝试", s.reconnection_attempts)?;
        writeln!(file, "重连成功次数,{},次,重连成功的次数", s.successful_reconnections)?;

        writeln!(file, "总连接获取时间,{:.3},毫秒,获取连接的累计耗时", s.total_acquire_time_us as f64 / 1000.0)?;
        writeln!(file, "总连接使用时间,{:.3},毫秒,连接被占用的累计时间", s.total_usage_time_us as f64 / 1000.0)?;
        writeln!(file, "总查询执行时间,{:.3},毫秒,SQL执行的累计耗时", s.total_query_time_us as f64 / 1000.0)?;

        writeln!(file, "平均连接获取时间,{:.3},毫秒,平均获取一个连接的时间", s.avg_acquire_time_us() / 1000.0)?;
        writeln!(file, "平均连接使用时间,{:.3},毫秒,平均占用连接的时间", s.avg_usage_time_us() / 1000.0)?;
        writeln!(file, "平均查询执行时间,{:.3},毫秒,平均执行一个查询的时间", s.avg_query_time_us() / 1000.0)?;

        writeln!(file, "连接获取成功率,{:.2},%,成功获取连接的比例", s.acquire_success_rate())?;
        writeln!(file, "查询执行成功率,{:.2},%,查询执行成功的比例", s.query_success_rate())?;
        writeln!(file, "重连成功率,{:.2},%,重连尝试成功的比例", s.reconnection_success_rate())?;

        writeln!(
            file,
            "导出时间,{},时间戳,统计数据的导出时间",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        Ok(())
    }
}

/// Point-in-time counter values with derived rates
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub connections_created: u64,
    pub connections_acquired: u64,
    pub connections_released: u64,
    pub failed_connection_attempts: u64,

    pub queries_executed: u64,
    pub failed_queries: u64,

    pub reconnection_attempts: u64,
    pub successful_reconnections: u64,

    pub total_acquire_time_us: u64,
    pub total_usage_time_us: u64,
    pub total_query_time_us: u64,
}

impl MetricsSnapshot {
    /// Average time to acquire a connection, microseconds
    pub fn avg_acquire_time_us(&self) -> f64 {
        if self.connections_acquired == 0 {
            return 0.0;
        }
        self.total_acquire_time_us as f64 / self.connections_acquired as f64
    }

    /// Average time a connection spent checked out, microseconds
    pub fn avg_usage_time_us(&self) -> f64 {
        if self.connections_released == 0 {
            return 0.0;
        }
        self.total_usage_time_us as f64 / self.connections_released as f64
    }

    /// Average statement execution time, microseconds
    pub fn avg_query_time_us(&self) -> f64 {
        if self.queries_executed == 0 {
            return 0.0;
        }
        self.total_query_time_us as f64 / self.queries_executed as f64
    }

    /// Share of acquire attempts that returned a connection, percent
    pub fn acquire_success_rate(&self) -> f64 {
        let attempts = self.connections_acquired + self.failed_connection_attempts;
        if attempts == 0 {
            return 0.0;
        }
        self.connections_acquired as f64 / attempts as f64 * 100.0
    }

    /// Share of statements that succeeded, percent
    pub fn query_success_rate(&self) -> f64 {
        if self.queries_executed == 0 {
            return 0.0;
        }
        (self.queries_executed - self.failed_queries) as f64 / self.queries_executed as f64 * 100.0
    }

    /// Share of reconnect cycles that recovered the session, percent
    pub fn reconnection_success_rate(&self) -> f64 {
        if self.reconnection_attempts == 0 {
            return 0.0;
        }
        self.successful_reconnections as f64 / self.reconnection_attempts as f64 * 100.0
    }
}
