//! Connection pooling
//!
//! [`ConnectionPool`] multiplexes a bounded set of live MySQL sessions
//! among concurrent callers. [`Connection`] is one session with its own
//! reconnect policy; [`PooledConnection`] is the checkout guard that hands
//! the session back when dropped.

pub mod connection;
pub mod manager;

pub use connection::Connection;
pub use manager::{ConnectionPool, PooledConnection};
