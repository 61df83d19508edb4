use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit rejects requests before allowing a probe.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub key: String,
    pub consecutive_failures: u32,
    /// Remaining open time, if the circuit is currently open.
    pub open_remaining: Option<Duration>,
}

/// Consecutive-failure circuit breaker, one circuit per endpoint class.
///
/// Closed circuits pass requests through. After `failure_threshold`
/// consecutive failures the circuit opens for `cooldown`; once the cooldown
/// expires the next request is let through as a probe, and its outcome
/// closes or re-opens the circuit.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    states: Mutex<HashMap<String, BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a request for `key` may proceed. Returns the remaining
    /// cooldown when the circuit is open.
    pub fn allow(&self, key: &str) -> Result<(), Duration> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let state = states.entry(key.to_string()).or_default();
        if let Some(until) = state.open_until {
            let now = Instant::now();
            if now < until {
                return Err(until - now);
            }
            // Cooldown expired: allow one probe through half-open.
            state.open_until = None;
        }
        Ok(())
    }

    pub fn on_success(&self, key: &str) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = states.get_mut(key) {
            state.consecutive_failures = 0;
            state.open_until = None;
        }
    }

    pub fn on_failure(&self, key: &str) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let state = states.entry(key.to_string()).or_default();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.config.failure_threshold {
            state.open_until = Some(Instant::now() + self.config.cooldown);
        }
    }

    pub fn snapshot(&self, key: &str) -> BreakerSnapshot {
        let now = Instant::now();
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let (failures, open_remaining) = states
            .get(key)
            .map(|s| {
                let remaining = s.open_until.and_then(|until| {
                    if until > now {
                        Some(until - now)
                    } else {
                        None
                    }
                });
                (s.consecutive_failures, remaining)
            })
            .unwrap_or((0, None));
        BreakerSnapshot {
            key: key.to_string(),
            consecutive_failures: failures,
            open_remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_cooldown(Duration::from_millis(cooldown_ms)),
        )
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 10_000);
        assert!(cb.allow("chat").is_ok());
        cb.on_failure("chat");
        cb.on_failure("chat");
        assert!(cb.allow("chat").is_ok());
        cb.on_failure("chat");
        assert!(cb.allow("chat").is_err());
    }

    #[test]
    fn test_success_resets_count() {
        let cb = breaker(2, 10_000);
        cb.on_failure("chat");
        cb.on_success("chat");
        cb.on_failure("chat");
        assert!(cb.allow("chat").is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let cb = breaker(1, 10_000);
        cb.on_failure("chat");
        assert!(cb.allow("chat").is_err());
        assert!(cb.allow("images").is_ok());
    }

    #[test]
    fn test_half_open_probe_after_cooldown() {
        let cb = breaker(1, 30);
        cb.on_failure("chat");
        assert!(cb.allow("chat").is_err());
        std::thread::sleep(Duration::from_millis(50));
        // Probe is allowed; a failed probe re-opens immediately.
        assert!(cb.allow("chat").is_ok());
        cb.on_failure("chat");
        assert!(cb.allow("chat").is_err());
    }

    #[test]
    fn test_snapshot_reports_cooldown() {
        let cb = breaker(1, 10_000);
        cb.on_failure("chat");
        let snap = cb.snapshot("chat");
        assert_eq!(snap.consecutive_failures, 1);
        assert!(snap.open_remaining.is_some());
    }
}
