//! Small helpers shared across the crate

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Session timestamps use wall-clock millis rather than `Instant` so that
/// idle ages survive being compared across threads and show up readable in
/// status output.
pub fn current_time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Microseconds elapsed since `start`, saturated into a `u64`.
pub fn elapsed_micros(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

/// Generate a random alphanumeric string, used for connection ids.
pub fn random_id(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_id_shape() {
        let id = random_id(16);
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_random_id_uniqueness() {
        let ids: HashSet<String> = (0..1000).map(|_| random_id(16)).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_current_time_millis_advances() {
        let a = current_time_millis();
        assert!(a > 1_600_000_000_000); // after 2020
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = current_time_millis();
        assert!(b >= a);
    }
}
