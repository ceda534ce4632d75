use crate::error::{Error, Result};
use crate::lb::Strategy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One MySQL replica with its load-balancing weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Host name or IP address
    pub host: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,

    /// Database (schema) name
    pub database: String,

    /// Port, MySQL default 3306
    #[serde(default = "default_port")]
    pub port: u16,

    /// Selection weight; higher means picked more often under the
    /// weighted strategy
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_port() -> u16 {
    3306
}

fn default_weight() -> u32 {
    1
}

impl ReplicaConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        port: u16,
        weight: u32,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            port,
            weight,
        }
    }

    /// Whether the descriptor is complete enough to connect with
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && !self.user.is_empty() && !self.database.is_empty() && self.port > 0
    }

    /// `user@host:port/database`, safe for logs (no password)
    pub fn connection_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }

    /// Replicas are identified by `(host, port)` for add/remove/update
    pub fn same_endpoint(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }
}

/// Connection pool sizing, timeout and reconnect settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Default host for single-database setups
    #[serde(default)]
    pub host: String,

    /// Default user
    #[serde(default)]
    pub user: String,

    /// Default password
    #[serde(default)]
    pub password: String,

    /// Default database name
    #[serde(default)]
    pub database: String,

    /// Default port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connections the pool always keeps around
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Hard ceiling on live connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connections opened eagerly at init
    #[serde(default = "default_init_connections")]
    pub init_connections: u32,

    /// How long an acquire waits for a free connection (ms)
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Idle age past which a connection is evicted (ms)
    #[serde(default = "default_max_idle_ms")]
    pub max_idle_ms: u64,

    /// Interval between health passes (ms)
    #[serde(default = "default_health_check_period_ms")]
    pub health_check_period_ms: u64,

    /// Base delay between reconnect attempts (ms)
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Reconnect attempts per recovery
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

fn default_min_connections() -> u32 {
    5
}

fn default_max_connections() -> u32 {
    20
}

fn default_init_connections() -> u32 {
    5
}

fn default_connection_timeout_ms() -> u64 {
    5_000
}

fn default_max_idle_ms() -> u64 {
    600_000
}

fn default_health_check_period_ms() -> u64 {
    30_000
}

fn default_reconnect_interval_ms() -> u64 {
    1_000
}

fn default_reconnect_attempts() -> u32 {
    3
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            password: String::new(),
            database: String::new(),
            port: default_port(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            init_connections: default_init_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            max_idle_ms: default_max_idle_ms(),
            health_check_period_ms: default_health_check_period_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            reconnect_attempts: default_reconnect_attempts(),
        }
    }
}

impl PoolConfig {
    /// Validate sizing and timeout invariants
    pub fn validate(&self) -> Result<()> {
        if self.min_connections == 0 || self.max_connections == 0 {
            return Err(Error::Config(
                "min_connections and max_connections must be positive".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::Config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.init_connections > self.max_connections {
            return Err(Error::Config(format!(
                "init_connections ({}) exceeds max_connections ({})",
                self.init_connections, self.max_connections
            )));
        }
        if self.connection_timeout_ms == 0
            || self.max_idle_ms == 0
            || self.health_check_period_ms == 0
        {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    /// Weight-1 replica built from the default backend fields
    pub fn default_replica(&self) -> ReplicaConfig {
        ReplicaConfig::new(
            self.host.clone(),
            self.user.clone(),
            self.password.clone(),
            self.database.clone(),
            self.port,
            1,
        )
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "PoolConfig{{connections=[{},{}], init={}, timeout={}ms, max_idle={}ms, health_period={}ms}}",
            self.min_connections,
            self.max_connections,
            self.init_connections,
            self.connection_timeout_ms,
            self.max_idle_ms,
            self.health_check_period_ms
        )
    }
}

/// Top-level configuration: replicas, strategy and pool settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Replicas to spread new connections across
    #[serde(default)]
    pub replicas: Vec<ReplicaConfig>,

    /// Load-balancing strategy
    #[serde(default)]
    pub strategy: Strategy,

    /// Pool settings
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        Error::Config(format!(
            "failed to read config file {:?}: {e}",
            path.as_ref()
        ))
    })?;

    serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse YAML configuration: {e}")))
}

/// Load configuration from environment variables
///
/// - `MYSQL_REPLICAS`: comma-separated `host[:port[:weight]]` list (required)
/// - `MYSQL_USER`, `MYSQL_PASSWORD`, `MYSQL_DATABASE`: shared credentials
/// - `LB_STRATEGY`: `random`, `round_robin` or `weighted` (optional)
/// - `POOL_MIN_CONNECTIONS`, `POOL_MAX_CONNECTIONS`: sizing overrides
pub fn load_from_env() -> Result<Config> {
    // Pick up a .env file if present; its absence is fine
    let _ = dotenvy::dotenv();

    let replicas_str = std::env::var("MYSQL_REPLICAS")
        .map_err(|_| Error::Config("MYSQL_REPLICAS environment variable not set".to_string()))?;

    let user = std::env::var("MYSQL_USER")
        .map_err(|_| Error::Config("MYSQL_USER environment variable not set".to_string()))?;
    let password = std::env::var("MYSQL_PASSWORD").unwrap_or_default();
    let database = std::env::var("MYSQL_DATABASE")
        .map_err(|_| Error::Config("MYSQL_DATABASE environment variable not set".to_string()))?;

    let mut replicas = Vec::new();
    for entry in replicas_str
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let mut parts = entry.split(':');
        let host = parts.next().unwrap_or_default().to_string();
        let port = match parts.next() {
            Some(p) => p.parse::<u16>().map_err(|_| {
                Error::Config(format!("invalid port in MYSQL_REPLICAS entry '{entry}'"))
            })?,
            None => default_port(),
        };
        let weight = match parts.next() {
            Some(w) => w.parse::<u32>().map_err(|_| {
                Error::Config(format!("invalid weight in MYSQL_REPLICAS entry '{entry}'"))
            })?,
            None => default_weight(),
        };
        replicas.push(ReplicaConfig::new(
            host,
            user.clone(),
            password.clone(),
            database.clone(),
            port,
            weight,
        ));
    }

    if replicas.is_empty() {
        return Err(Error::Config(
            "MYSQL_REPLICAS contains no valid entries".to_string(),
        ));
    }

    let mut config = Config {
        replicas,
        ..Config::default()
    };

    if let Ok(strategy) = std::env::var("LB_STRATEGY") {
        config.strategy = strategy.parse().map_err(Error::Config)?;
    }

    if let Ok(min) = std::env::var("POOL_MIN_CONNECTIONS") {
        if let Ok(val) = min.parse() {
            config.pool.min_connections = val;
        }
    }

    if let Ok(max) = std::env::var("POOL_MAX_CONNECTIONS") {
        if let Ok(val) = max.parse() {
            config.pool.max_connections = val;
        }
    }

    Ok(config)
}

/// Load from a YAML file when a path is given, otherwise from the environment
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}
