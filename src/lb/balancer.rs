use crate::config::ReplicaConfig;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Load balancing strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Uniform random pick
    Random,
    /// Cycle through replicas in order
    RoundRobin,
    /// Random pick with probability proportional to weight
    #[default]
    Weighted,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Random => "random",
            Strategy::RoundRobin => "round_robin",
            Strategy::Weighted => "weighted",
        };
        f.write_str(name)
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "random" => Ok(Strategy::Random),
            "round_robin" => Ok(Strategy::RoundRobin),
            "weighted" => Ok(Strategy::Weighted),
            other => Err(format!("unknown load balance strategy '{other}'")),
        }
    }
}

struct BalancerState {
    replicas: Vec<ReplicaConfig>,
    strategy: Strategy,
    /// Round-robin cursor; always `< replicas.len()` when non-empty, 0 when empty
    cursor: usize,
    rng: StdRng,
}

/// Picks the replica each new connection goes to.
///
/// The replica list is mutable at runtime: replicas can be added, removed
/// and re-weighted while the pool keeps handing out connections.
pub struct LoadBalancer {
    state: Mutex<BalancerState>,
}

impl LoadBalancer {
    /// Create a balancer over `replicas` with the given strategy.
    ///
    /// Fails when the list is empty or any descriptor is incomplete.
    pub fn new(replicas: Vec<ReplicaConfig>, strategy: Strategy) -> Result<Self> {
        if replicas.is_empty() {
            return Err(Error::NoReplicas);
        }
        for replica in &replicas {
            if !replica.is_valid() {
                return Err(Error::Config(format!(
                    "invalid replica descriptor: {}",
                    replica.connection_string()
                )));
            }
        }

        info!(strategy = %strategy, replicas = replicas.len(), "load balancer initialized");
        Ok(Self {
            state: Mutex::new(BalancerState {
                replicas,
                strategy,
                cursor: 0,
                rng: StdRng::from_entropy(),
            }),
        })
    }

    /// Convenience form: one replica, weighted strategy
    pub fn single(replica: ReplicaConfig) -> Result<Self> {
        info!(replica = %replica.connection_string(), "load balancer initialized with a single replica");
        Self::new(vec![replica], Strategy::Weighted)
    }

    /// Pick the replica for the next new connection
    pub fn next_replica(&self) -> Result<ReplicaConfig> {
        let mut state = self.state.lock();
        if state.replicas.is_empty() {
            return Err(Error::NoReplicas);
        }

        let replica = match state.strategy {
            Strategy::Random => Self::select_random(&mut state),
            Strategy::RoundRobin => Self::select_round_robin(&mut state),
            Strategy::Weighted => Self::select_weighted(&mut state),
        };
        Ok(replica)
    }

    fn select_random(state: &mut BalancerState) -> ReplicaConfig {
        let index = state.rng.gen_range(0..state.replicas.len());
        debug!(index, "random selection");
        state.replicas[index].clone()
    }

    fn select_round_robin(state: &mut BalancerState) -> ReplicaConfig {
        let index = state.cursor;
        state.cursor = (state.cursor + 1) % state.replicas.len();
        debug!(index, total = state.replicas.len(), "round-robin selection");
        state.replicas[index].clone()
    }

    fn select_weighted(state: &mut BalancerState) -> ReplicaConfig {
        let total_weight: u64 = state.replicas.iter().map(|r| u64::from(r.weight)).sum();
        if total_weight == 0 {
            warn!("all replica weights are zero, falling back to the first replica");
            return state.replicas[0].clone();
        }

        let pick = state.rng.gen_range(0..total_weight);
        let mut cumulative = 0u64;
        for (index, replica) in state.replicas.iter().enumerate() {
            cumulative += u64::from(replica.weight);
            if pick < cumulative {
                debug!(index, pick, total_weight, "weighted selection");
                return replica.clone();
            }
        }

        // unreachable when pick < total_weight, kept as a safety net
        warn!("weighted selection fell through, using the first replica");
        state.replicas[0].clone()
    }

    /// Register another replica. A duplicate `(host, port)` is ignored with
    /// a warning; an incomplete descriptor is rejected.
    pub fn add_replica(&self, replica: ReplicaConfig) -> Result<()> {
        let mut state = self.state.lock();
        if state
            .replicas
            .iter()
            .any(|r| r.same_endpoint(&replica.host, replica.port))
        {
            warn!(
                host = %replica.host,
                port = replica.port,
                "replica already registered, ignoring add"
            );
            return Ok(());
        }
        if !replica.is_valid() {
            return Err(Error::Config(format!(
                "invalid replica descriptor: {}",
                replica.connection_string()
            )));
        }

        info!(
            replica = %replica.connection_string(),
            weight = replica.weight,
            total = state.replicas.len() + 1,
            "replica added"
        );
        state.replicas.push(replica);
        Ok(())
    }

    /// Drop a replica by `(host, port)`. Returns whether one was removed.
    pub fn remove_replica(&self, host: &str, port: u16) -> bool {
        let mut state = self.state.lock();
        let before = state.replicas.len();
        state.replicas.retain(|r| !r.same_endpoint(host, port));

        if state.replicas.len() == before {
            info!(host, port, "no replica matched for removal");
            return false;
        }

        // keep the cursor inside the shrunk list
        state.cursor = if state.replicas.is_empty() {
            0
        } else {
            state.cursor % state.replicas.len()
        };
        info!(host, port, remaining = state.replicas.len(), "replica removed");
        true
    }

    /// Change the weight of a replica. Returns whether one matched.
    pub fn update_weight(&self, host: &str, port: u16, weight: u32) -> bool {
        let mut state = self.state.lock();
        match state
            .replicas
            .iter_mut()
            .find(|r| r.same_endpoint(host, port))
        {
            Some(replica) => {
                let old = replica.weight;
                replica.weight = weight;
                info!(
                    replica = %replica.connection_string(),
                    old_weight = old,
                    new_weight = weight,
                    "replica weight updated"
                );
                true
            }
            None => {
                warn!(host, port, "no replica matched for weight update");
                false
            }
        }
    }

    /// Switch strategy. The round-robin cursor restarts at 0 when switching
    /// to round-robin.
    pub fn set_strategy(&self, strategy: Strategy) {
        let mut state = self.state.lock();
        state.strategy = strategy;
        info!(strategy = %strategy, "load balance strategy changed");
        if strategy == Strategy::RoundRobin {
            state.cursor = 0;
        }
    }

    /// Currently active strategy
    pub fn strategy(&self) -> Strategy {
        self.state.lock().strategy
    }

    /// Snapshot of the replica list
    pub fn replicas(&self) -> Vec<ReplicaConfig> {
        self.state.lock().replicas.clone()
    }

    /// Number of registered replicas
    pub fn len(&self) -> usize {
        self.state.lock().replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().replicas.is_empty()
    }

    /// Human-readable snapshot; not part of the functional contract
    pub fn status(&self) -> String {
        let state = self.state.lock();
        let mut out = String::from("LoadBalancer Status:\n");
        out += &format!("  Strategy: {}\n", state.strategy);
        out += &format!("  Replica Count: {}\n", state.replicas.len());
        out += &format!("  Round Robin Cursor: {}\n", state.cursor);

        if !state.replicas.is_empty() {
            out += "  Replicas:\n";
            for (i, replica) in state.replicas.iter().enumerate() {
                out += &format!(
                    "    [{}] {} (weight={})\n",
                    i,
                    replica.connection_string(),
                    replica.weight
                );
            }
            if state.strategy == Strategy::Weighted {
                let total: u64 = state.replicas.iter().map(|r| u64::from(r.weight)).sum();
                out += &format!("  Total Weight: {total}\n");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_replicas(count: usize) -> Vec<ReplicaConfig> {
        (0..count)
            .map(|i| {
                ReplicaConfig::new(
                    format!("db{}", i + 1),
                    "app",
                    "secret",
                    "orders",
                    3306,
                    1,
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_list_rejected() {
        let result = LoadBalancer::new(vec![], Strategy::RoundRobin);
        assert!(matches!(result, Err(Error::NoReplicas)));
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let mut replicas = test_replicas(2);
        replicas[1].host.clear();
        let result = LoadBalancer::new(replicas, Strategy::Weighted);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let lb = LoadBalancer::new(test_replicas(3), Strategy::RoundRobin).unwrap();

        let picks: Vec<String> = (0..6).map(|_| lb.next_replica().unwrap().host).collect();
        assert_eq!(picks, vec!["db1", "db2", "db3", "db1", "db2", "db3"]);
    }

    #[test]
    fn test_round_robin_exact_distribution() {
        let lb = LoadBalancer::new(test_replicas(4), Strategy::RoundRobin).unwrap();

        let mut counts = std::collections::HashMap::new();
        for _ in 0..4 * 25 {
            *counts.entry(lb.next_replica().unwrap().host).or_insert(0) += 1;
        }
        for host in ["db1", "db2", "db3", "db4"] {
            assert_eq!(counts[host], 25);
        }
    }

    #[test]
    fn test_random_stays_in_range() {
        let lb = LoadBalancer::new(test_replicas(3), Strategy::Random).unwrap();
        for _ in 0..100 {
            let host = lb.next_replica().unwrap().host;
            assert!(["db1", "db2", "db3"].contains(&host.as_str()));
        }
    }

    #[test]
    fn test_weighted_distribution_converges() {
        let mut replicas = test_replicas(3);
        replicas[0].weight = 3;
        replicas[1].weight = 2;
        replicas[2].weight = 1;
        let lb = LoadBalancer::new(replicas, Strategy::Weighted).unwrap();

        let trials = 6_000usize;
        let mut counts = std::collections::HashMap::new();
        for _ in 0..trials {
            *counts.entry(lb.next_replica().unwrap().host).or_insert(0usize) += 1;
        }

        let expected = [("db1", 0.5), ("db2", 1.0 / 3.0), ("db3", 1.0 / 6.0)];
        for (host, fraction) in expected {
            let observed = counts[host] as f64 / trials as f64;
            assert!(
                (observed - fraction).abs() < 0.02,
                "{host}: observed {observed:.3}, expected {fraction:.3}"
            );
        }
    }

    #[test]
    fn test_equal_weights_degenerate_to_uniform() {
        let lb = LoadBalancer::new(test_replicas(2), Strategy::Weighted).unwrap();

        let trials = 4_000usize;
        let mut first = 0usize;
        for _ in 0..trials {
            if lb.next_replica().unwrap().host == "db1" {
                first += 1;
            }
        }
        let fraction = first as f64 / trials as f64;
        assert!((fraction - 0.5).abs() < 0.05, "observed {fraction:.3}");
    }

    #[test]
    fn test_add_duplicate_is_noop() {
        let lb = LoadBalancer::new(test_replicas(2), Strategy::Weighted).unwrap();

        let dup = ReplicaConfig::new("db1", "other", "pw", "orders", 3306, 9);
        lb.add_replica(dup).unwrap();
        assert_eq!(lb.len(), 2);
        // the original descriptor is untouched
        assert_eq!(lb.replicas()[0].user, "app");
    }

    #[test]
    fn test_add_invalid_rejected() {
        let lb = LoadBalancer::new(test_replicas(1), Strategy::Weighted).unwrap();
        let bad = ReplicaConfig::new("", "app", "pw", "orders", 3306, 1);
        assert!(lb.add_replica(bad).is_err());
        assert_eq!(lb.len(), 1);
    }

    #[test]
    fn test_add_then_remove_restores_state() {
        let lb = LoadBalancer::new(test_replicas(2), Strategy::Weighted).unwrap();
        let before = lb.replicas();

        let extra = ReplicaConfig::new("db9", "app", "secret", "orders", 3306, 4);
        lb.add_replica(extra).unwrap();
        assert_eq!(lb.len(), 3);

        assert!(lb.remove_replica("db9", 3306));
        assert_eq!(lb.replicas(), before);
    }

    #[test]
    fn test_remove_clamps_cursor() {
        let lb = LoadBalancer::new(test_replicas(3), Strategy::RoundRobin).unwrap();

        // advance the cursor to 2
        lb.next_replica().unwrap();
        lb.next_replica().unwrap();

        assert!(lb.remove_replica("db3", 3306));
        // cursor 2 % 2 == 0, next pick starts from the head again
        assert_eq!(lb.next_replica().unwrap().host, "db1");
        assert!(!lb.remove_replica("db3", 3306));
    }

    #[test]
    fn test_update_weight() {
        let lb = LoadBalancer::new(test_replicas(2), Strategy::Weighted).unwrap();
        assert!(lb.update_weight("db2", 3306, 7));
        assert_eq!(lb.replicas()[1].weight, 7);
        assert!(!lb.update_weight("nope", 3306, 7));
    }

    #[test]
    fn test_switching_to_round_robin_resets_cursor() {
        let lb = LoadBalancer::new(test_replicas(3), Strategy::RoundRobin).unwrap();
        lb.next_replica().unwrap();
        lb.next_replica().unwrap();

        lb.set_strategy(Strategy::Random);
        lb.set_strategy(Strategy::RoundRobin);
        assert_eq!(lb.next_replica().unwrap().host, "db1");
    }

    #[test]
    fn test_strategy_parse_and_display() {
        assert_eq!("weighted".parse::<Strategy>().unwrap(), Strategy::Weighted);
        assert_eq!(
            "round_robin".parse::<Strategy>().unwrap(),
            Strategy::RoundRobin
        );
        assert_eq!("random".parse::<Strategy>().unwrap(), Strategy::Random);
        assert!("fastest".parse::<Strategy>().is_err());
        assert_eq!(Strategy::RoundRobin.to_string(), "round_robin");
    }

    #[test]
    fn test_status_snapshot() {
        let lb = LoadBalancer::new(test_replicas(2), Strategy::Weighted).unwrap();
        let status = lb.status();
        assert!(status.contains("Strategy: weighted"));
        assert!(status.contains("Replica Count: 2"));
        assert!(status.contains("Total Weight: 2"));
    }
}
