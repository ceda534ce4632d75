//! Basic usage walk-through for mysqlpool
//!
//! Uses the in-memory mock driver so it runs without a MySQL server; swap
//! the connector for a real driver adapter in production code.
//!
//! Run with:
//! ```
//! cargo run --example basic_usage
//! ```

use mysqlpool::driver::mock::{MockConnector, MockOutcome};
use mysqlpool::{ConnectionPool, PoolConfig, ReplicaConfig, Strategy};
use std::sync::Arc;

fn main() -> mysqlpool::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("mysqlpool - Basic Usage Example");
    println!("================================\n");

    // Three replicas, traffic weighted 3:2:1
    let replicas = vec![
        ReplicaConfig::new("db1.internal", "app", "secret", "orders", 3306, 3),
        ReplicaConfig::new("db2.internal", "app", "secret", "orders", 3306, 2),
        ReplicaConfig::new("db3.internal", "app", "secret", "orders", 3306, 1),
    ];

    let config = PoolConfig {
        min_connections: 2,
        max_connections: 8,
        init_connections: 4,
        ..PoolConfig::default()
    };

    let connector = MockConnector::new();
    let pool = ConnectionPool::with_replicas(
        Arc::new(connector.clone()),
        config,
        replicas,
        Strategy::Weighted,
    )?;

    println!("1. Pool started");
    println!("{}", pool.status());

    // Example query
    println!("2. Running a query...");
    connector.push_query(MockOutcome::result_set(
        &["id", "name"],
        &[&["1", "alice"], &["2", "bob"]],
    ));
    let conn = pool.acquire(0)?;
    let mut result = conn.execute_query("SELECT id, name FROM users")?;
    while result.next() {
        println!("   row: id={} name={}", result.get_int("id"), result.get_string("name"));
    }
    println!();

    // Example update inside a transaction
    println!("3. Running an update in a transaction...");
    if conn.begin_transaction() {
        connector.push_query(MockOutcome::Affected(1));
        let affected = conn.execute_update("UPDATE users SET active = 1 WHERE id = 1")?;
        println!("   updated {affected} row(s)");
        conn.commit();
    }
    drop(conn); // hand the session back

    // Telemetry
    println!("\n4. Telemetry snapshot:");
    print!("{}", pool.metrics().report());

    pool.shutdown();
    println!("\nPool shut down cleanly");
    Ok(())
}
