//! Driver seam between the pool and the MySQL client library
//!
//! The pool never speaks the wire protocol itself. It drives sessions
//! through the [`DriverHandle`] trait and opens them through a [`Connector`],
//! so the transport can be swapped for the in-memory [`mock`] driver in
//! tests.

pub mod mock;

use crate::config::ReplicaConfig;
use std::time::Duration;

/// Client-side error codes that denote lost or broken transport.
///
/// - 2002: CR_CONNECTION_ERROR
/// - 2003: CR_CONN_HOST_ERROR
/// - 2006: CR_SERVER_GONE_ERROR
/// - 2013: CR_SERVER_LOST
/// - 2027: CR_MALFORMED_PACKET
/// - 2055: CR_SERVER_LOST_EXTENDED
pub const CONNECTION_ERROR_CODES: [u32; 6] = [2002, 2003, 2006, 2013, 2027, 2055];

/// CR_SERVER_GONE_ERROR, used when an operation finds no live handle
pub const CR_SERVER_GONE_ERROR: u32 = 2006;

/// CR_UNKNOWN_ERROR, used when the driver misbehaves without a code
pub const CR_UNKNOWN_ERROR: u32 = 2000;

/// Whether an error code denotes a broken connection (worth a reconnect)
/// rather than a SQL-level failure.
pub fn is_connection_error(code: u32) -> bool {
    CONNECTION_ERROR_CODES.contains(&code)
}

/// Numeric error code plus message reported by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub code: u32,
    pub message: String,
}

impl DriverError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (Code: {})", self.message, self.code)
    }
}

impl std::error::Error for DriverError {}

/// Options applied to every session before it connects
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Per-read timeout on an established session
    pub read_timeout: Duration,

    /// Per-write timeout on an established session
    pub write_timeout: Duration,

    /// Connection character set
    pub charset: String,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            charset: "utf8mb4".to_string(),
        }
    }
}

/// A materialized result set as handed over by the driver
#[derive(Debug, Clone, Default)]
pub struct ResultData {
    /// Column names in result order
    pub field_names: Vec<String>,

    /// Row-major cell data; `None` marks SQL NULL
    pub rows: Vec<Vec<Option<String>>>,
}

/// One live session to a MySQL server.
///
/// Mirrors the C client call sequence: `query` issues the statement,
/// `store_result` materializes rows (queries only), `field_count` and
/// `affected_rows` describe the outcome of the last statement.
pub trait DriverHandle: Send + std::fmt::Debug {
    /// Liveness probe; an error carries the reason the session is unusable
    fn ping(&mut self) -> Result<(), DriverError>;

    /// Issue a SQL statement
    fn query(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Materialize the result set of the last statement, if it produced one
    fn store_result(&mut self) -> Result<Option<ResultData>, DriverError>;

    /// Number of columns the last statement produced
    fn field_count(&self) -> u32;

    /// Rows affected by the last statement
    fn affected_rows(&self) -> u64;

    /// Escape a string against the session charset
    fn escape(&mut self, input: &str) -> String;
}

/// Opens sessions. Implementations must be shareable across threads; the
/// pool calls `connect` with its own lock released.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        replica: &ReplicaConfig,
        options: &DriverOptions,
    ) -> Result<Box<dyn DriverHandle>, DriverError>;
}
