//! mysqlpool - client-side MySQL connection pool with built-in load balancing
//!
//! The pool multiplexes a bounded set of live sessions among concurrent
//! callers, spreads new sessions across a configurable set of replicas,
//! transparently reconnects on transport failures with capped, jittered
//! exponential backoff, and exposes live performance telemetry.
//!
//! ```rust
//! use mysqlpool::{ConnectionPool, PoolConfig, ReplicaConfig};
//! use mysqlpool::driver::mock::MockConnector;
//! use std::sync::Arc;
//!
//! # fn main() -> mysqlpool::Result<()> {
//! let replica = ReplicaConfig::new("db1.internal", "app", "secret", "orders", 3306, 1);
//! let pool = ConnectionPool::with_single_replica(
//!     Arc::new(MockConnector::new()),
//!     PoolConfig::default(),
//!     replica,
//! )?;
//!
//! let conn = pool.acquire(0)?;
//! let mut result = conn.execute_query("SELECT 1 AS v")?;
//! while result.next() {
//!     let _v = result.get_int("v");
//! }
//! drop(conn); // hands the session back
//!
//! pool.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod lb;
pub mod pool;
pub mod result;
pub mod stats;

mod util;

pub use config::{Config, PoolConfig, ReplicaConfig};
pub use error::{Error, Result};
pub use lb::{LoadBalancer, Strategy};
pub use pool::{Connection, ConnectionPool, PooledConnection};
pub use result::QueryResult;
pub use stats::{MetricsSnapshot, PoolMetrics};
