//! Reconnect policy and backoff schedule.
//!
//! Reconnection is driven by an explicit, injectable policy instead of
//! constants buried in the transport: `{initial delay, multiplier, cap,
//! max attempts}`. The schedule is pure arithmetic over the attempt
//! counter, so it tests without a clock.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Backoff policy for transport reconnection.
///
/// Delays grow exponentially from `initial` by `multiplier`, clamp at
/// `cap`, and carry up to 25% deterministic jitter to spread simultaneous
/// reconnects. `max_attempts: None` retries forever.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub initial: Duration,

    /// Growth factor applied per attempt.
    pub multiplier: f64,

    /// Upper bound on the un-jittered delay.
    pub cap: Duration,

    /// Attempt budget; `None` means unlimited.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            cap: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never reconnects.
    #[must_use]
    pub fn never() -> Self {
        Self {
            max_attempts: Some(0),
            ..Self::default()
        }
    }

    /// Replaces the initial delay.
    #[inline]
    #[must_use]
    pub fn with_initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }

    /// Replaces the growth factor.
    #[inline]
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Replaces the delay cap.
    #[inline]
    #[must_use]
    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    /// Replaces the attempt budget.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Computes the delay before attempt `attempt` (1-indexed).
    ///
    /// Returns `None` once the attempt budget is spent.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts
            && attempt > max
        {
            return None;
        }

        let base_ms = self.initial.as_millis() as f64 * self.multiplier.powi(attempt as i32 - 1);
        let clamped_ms = base_ms.min(self.cap.as_millis() as f64) as u64;

        // Deterministic jitter (up to 25% of the delay), so the schedule
        // stays reproducible in tests while still spreading reconnects.
        let jitter_range = clamped_ms / 4;
        let jitter_ms = if jitter_range > 0 {
            (u64::from(attempt) * 17) % jitter_range
        } else {
            0
        };

        Some(Duration::from_millis(clamped_ms + jitter_ms))
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Attempt counter walking a [`ReconnectPolicy`] schedule.
#[derive(Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Creates a fresh schedule over `policy`.
    #[inline]
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Advances to the next attempt and returns its delay.
    ///
    /// Returns `None` once the policy's budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt += 1;
        self.policy.delay_for(self.attempt)
    }

    /// Current attempt number (0 before the first `next_delay`).
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Resets the counter after a successful connection.
    #[inline]
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial_ms: u64, multiplier: f64, cap_ms: u64) -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(initial_ms),
            multiplier,
            cap: Duration::from_millis(cap_ms),
            max_attempts: None,
        }
    }

    #[test]
    fn test_delays_grow_exponentially() {
        let p = policy(100, 2.0, 60_000);

        for attempt in 1..=4 {
            let base = 100 * 2u64.pow(attempt - 1);
            let delay = p.delay_for(attempt).expect("within budget").as_millis() as u64;

            assert!(delay >= base, "attempt {attempt}: {delay} < {base}");
            assert!(delay <= base + base / 4, "attempt {attempt}: jitter over 25%");
        }
    }

    #[test]
    fn test_delay_clamps_at_cap() {
        let p = policy(100, 2.0, 400);

        let delay = p.delay_for(10).expect("within budget").as_millis() as u64;
        assert!(delay >= 400);
        assert!(delay <= 500); // cap + 25% jitter
    }

    #[test]
    fn test_budget_exhaustion() {
        let p = policy(50, 2.0, 1000).with_max_attempts(3);

        assert!(p.delay_for(1).is_some());
        assert!(p.delay_for(3).is_some());
        assert!(p.delay_for(4).is_none());
    }

    #[test]
    fn test_never_policy() {
        let p = ReconnectPolicy::never();
        assert!(p.delay_for(1).is_none());
    }

    #[test]
    fn test_schedule_is_deterministic() {
        let p = policy(100, 2.0, 30_000);
        assert_eq!(p.delay_for(3), p.delay_for(3));
    }

    #[test]
    fn test_backoff_walks_and_resets() {
        let mut backoff = Backoff::new(policy(100, 2.0, 1000).with_max_attempts(2));

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.attempt(), 2);
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn test_default_policy_is_unlimited() {
        let p = ReconnectPolicy::default();
        assert!(p.max_attempts.is_none());
        assert!(p.delay_for(1_000).is_some());
    }
}
