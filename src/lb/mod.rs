//! Replica selection
//!
//! The [`LoadBalancer`] owns the mutable set of replica descriptors and
//! decides which backend each new connection goes to.
//!
//! # Strategies
//!
//! - **Random**: uniform pick over the replica list
//! - **Round-robin**: sequential distribution with a wrapping cursor
//! - **Weighted**: random pick with probability proportional to each
//!   replica's weight; equal weights degenerate to uniform random

pub mod balancer;

pub use balancer::{LoadBalancer, Strategy};
