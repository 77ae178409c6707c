use std::time::Duration;
use toolgate_config::ReconnectPolicy;

/// Floor applied to computed delays so degenerate configurations (zero or
/// negative effective delays) cannot busy-loop the supervisor.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Delay before retry number `attempt`, where `attempt` is the 0-based
/// count of prior failures since the last successful open.
///
/// Computed as `min(initialDelay * backoffMultiplier^attempt, maxDelay)`.
/// A multiplier at or below 1 yields a constant delay.
pub fn retry_delay(policy: &ReconnectPolicy, attempt: u32) -> Duration {
    let multiplier = if policy.backoff_multiplier > 1.0 {
        policy.backoff_multiplier
    } else {
        1.0
    };
    let scaled = (policy.initial_delay as f64) * multiplier.powf(f64::from(attempt));
    let capped = scaled.min(policy.max_delay as f64);
    let millis = capped.max(MIN_RETRY_DELAY.as_millis() as f64);
    Duration::from_millis(millis as u64)
}

/// True once `attempt` consecutive failures mean reconnection should be
/// abandoned. `maxAttempts = 0` disables retry entirely. Exhaustion is
/// terminal until an external trigger resets the counter.
pub fn retries_exhausted(policy: &ReconnectPolicy, attempt: u32) -> bool {
    attempt >= policy.max_attempts
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, initial: u64, max: u64, multiplier: f64) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            initial_delay: initial,
            max_delay: max,
            backoff_multiplier: multiplier,
        }
    }

    #[test]
    fn test_delay_stays_within_bounds() {
        let p = policy(10, 2000, 60_000, 2.0);
        for attempt in 0..32 {
            let d = retry_delay(&p, attempt);
            assert!(d >= Duration::from_millis(2000), "attempt {attempt}: {d:?}");
            assert!(d <= Duration::from_millis(60_000), "attempt {attempt}: {d:?}");
        }
    }

    #[test]
    fn test_delay_grows_then_caps() {
        let p = policy(10, 1000, 8000, 2.0);
        assert_eq!(retry_delay(&p, 0), Duration::from_millis(1000));
        assert_eq!(retry_delay(&p, 1), Duration::from_millis(2000));
        assert_eq!(retry_delay(&p, 2), Duration::from_millis(4000));
        assert_eq!(retry_delay(&p, 3), Duration::from_millis(8000));
        // Capped from here on, even for absurd attempt counts.
        assert_eq!(retry_delay(&p, 4), Duration::from_millis(8000));
        assert_eq!(retry_delay(&p, 1000), Duration::from_millis(8000));
    }

    #[test]
    fn test_multiplier_at_or_below_one_is_constant() {
        for multiplier in [1.0, 0.5, 0.0, -3.0] {
            let p = policy(10, 500, 60_000, multiplier);
            for attempt in 0..8 {
                assert_eq!(retry_delay(&p, attempt), Duration::from_millis(500));
            }
        }
    }

    #[test]
    fn test_zero_delay_clamped_to_floor() {
        let p = policy(10, 0, 0, 2.0);
        assert_eq!(retry_delay(&p, 0), MIN_RETRY_DELAY);
        assert_eq!(retry_delay(&p, 5), MIN_RETRY_DELAY);
    }

    #[test]
    fn test_exhaustion() {
        let p = policy(3, 1000, 60_000, 2.0);
        assert!(!retries_exhausted(&p, 0));
        assert!(!retries_exhausted(&p, 2));
        assert!(retries_exhausted(&p, 3));
        assert!(retries_exhausted(&p, 4));
    }

    #[test]
    fn test_zero_max_attempts_disables_retry() {
        let p = policy(0, 1000, 60_000, 2.0);
        assert!(retries_exhausted(&p, 0));
    }
}
