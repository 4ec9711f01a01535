//! Exponential-backoff lockout for repeated login failures.
//!
//! Keyed by (parent, handle). The first two failures are free; from the
//! third on, the account locks for `base * 2^(n-3)` seconds, capped.
//! Locked-out attempts are rejected without touching the store. Entries
//! quiet for longer than the lockout cap are swept when new failures are
//! recorded, so invented handles cannot grow the map without bound.

use crate::error::{StrataDbError, StrataDbResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const FREE_FAILURES: u32 = 2;

#[derive(Debug)]
struct FailureState {
    failures: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

pub struct LoginThrottle {
    base: Duration,
    max: Duration,
    state: Mutex<HashMap<String, FailureState>>,
}

impl LoginThrottle {
    pub fn new(base_secs: u64, max_secs: u64) -> Self {
        Self {
            base: Duration::from_secs(base_secs),
            max: Duration::from_secs(max_secs),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Reject the attempt if the key is currently locked out.
    pub fn check(&self, key: &str) -> StrataDbResult<()> {
        let state = self.state.lock().expect("throttle lock poisoned");
        if let Some(entry) = state.get(key) {
            if let Some(until) = entry.locked_until {
                if Instant::now() < until {
                    return Err(StrataDbError::InvalidCredentials(
                        "Too many failed attempts; retry later".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn record_failure(&self, key: &str) {
        let now = Instant::now();
        let mut state = self.state.lock().expect("throttle lock poisoned");
        // Any lockout has expired by `max` after the last failure.
        state.retain(|_, entry| now.duration_since(entry.last_failure) < self.max);
        let entry = state.entry(key.to_string()).or_insert(FailureState {
            failures: 0,
            last_failure: now,
            locked_until: None,
        });
        entry.failures += 1;
        entry.last_failure = now;
        if entry.failures > FREE_FAILURES {
            let exponent = entry.failures - FREE_FAILURES - 1;
            let delay = self
                .base
                .saturating_mul(1u32 << exponent.min(20))
                .min(self.max);
            entry.locked_until = Some(now + delay);
        }
    }

    pub fn record_success(&self, key: &str) {
        let mut state = self.state.lock().expect("throttle lock poisoned");
        state.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failures_do_not_lock() {
        let throttle = LoginThrottle::new(60, 600);
        throttle.record_failure(":alice");
        throttle.record_failure(":alice");
        assert!(throttle.check(":alice").is_ok());
    }

    #[test]
    fn repeated_failures_lock_out() {
        let throttle = LoginThrottle::new(60, 600);
        for _ in 0..3 {
            throttle.record_failure(":alice");
        }
        assert!(throttle.check(":alice").is_err());
        // Independent keys are unaffected
        assert!(throttle.check(":bob").is_ok());
    }

    #[test]
    fn quiet_entries_are_swept() {
        let throttle = LoginThrottle {
            base: Duration::from_millis(50),
            max: Duration::from_millis(100),
            state: Mutex::new(HashMap::new()),
        };
        for _ in 0..4 {
            throttle.record_failure(":alice");
        }
        assert!(throttle.check(":alice").is_err());

        std::thread::sleep(Duration::from_millis(150));
        throttle.record_failure(":bob");
        let state = throttle.state.lock().unwrap();
        assert!(!state.contains_key(":alice"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn success_clears_the_slate() {
        let throttle = LoginThrottle::new(0, 600);
        for _ in 0..5 {
            throttle.record_failure(":alice");
        }
        throttle.record_success(":alice");
        assert!(throttle.check(":alice").is_ok());
    }
}
