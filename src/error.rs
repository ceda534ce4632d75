use crate::driver::DriverError;

/// Error type for all pool operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pool or replica configuration violated an invariant
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Acquire called before init or after shutdown, or a statement issued
    /// on a session the pool cancelled at shutdown
    #[error("Connection pool is not running")]
    NotRunning,

    /// Deadline elapsed while waiting for a free connection
    #[error("Timed out after {waited_ms}ms waiting for an available connection")]
    Timeout { waited_ms: u64 },

    /// The load balancer has no replicas to hand out
    #[error("No database replicas configured")]
    NoReplicas,

    /// Could not establish a session to any replica
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// Operation on a session whose driver handle is gone
    #[error("Connection not established")]
    TransportGone,

    /// The server rejected a statement
    #[error("SQL error {code}: {message}")]
    Sql { code: u32, message: String },

    /// Execute-with-reconnect ran out of attempts
    #[error("Query failed after {attempts} attempts: {message} (SQL: {sql})")]
    RetriesExhausted {
        attempts: u32,
        message: String,
        sql: String,
    },
}

impl Error {
    /// Whether this error denotes lost transport, i.e. retrying after a
    /// reconnect can succeed. SQL-level errors (syntax, constraints, ...)
    /// are terminal for the statement.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::TransportGone => true,
            Error::Sql { code, .. } => crate::driver::is_connection_error(*code),
            _ => false,
        }
    }
}

impl From<DriverError> for Error {
    fn from(e: DriverError) -> Self {
        Error::Sql {
            code: e.code,
            message: e.message,
        }
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
