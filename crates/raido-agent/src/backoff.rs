//! Bounded exponential backoff for the dial loop (spec §4.5): 5 steps,
//! initial 100 ms, factor 2.0, jitter ±10%. Ported from the original's
//! `wait.Backoff{Steps: 5, Duration: 100*time.Millisecond, Factor: 2.0,
//! Jitter: 0.1}`.

use std::time::Duration;

use rand::Rng;

pub const STEPS: u32 = 5;
pub const INITIAL: Duration = Duration::from_millis(100);
pub const FACTOR: f64 = 2.0;
pub const JITTER: f64 = 0.1;

/// The delay before dial attempt `attempt` (0-indexed: attempt 0 is the
/// first try, with no preceding delay). Jitter is applied independently
/// on each call, matching `wait.Backoff`'s per-step jitter rather than a
/// precomputed sequence.
pub fn delay_for_attempt(attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let base = INITIAL.as_secs_f64() * FACTOR.powi((attempt - 1) as i32);
    let jittered = base * (1.0 + rand::thread_rng().gen_range(-JITTER..=JITTER));
    Duration::from_secs_f64(jittered.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_has_no_delay() {
        assert_eq!(delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn delays_grow_by_factor_within_jitter_bounds() {
        for attempt in 1..STEPS {
            let delay = delay_for_attempt(attempt).as_secs_f64();
            let base = INITIAL.as_secs_f64() * FACTOR.powi((attempt - 1) as i32);
            let lower = base * (1.0 - JITTER) - f64::EPSILON;
            let upper = base * (1.0 + JITTER) + f64::EPSILON;
            assert!(
                delay >= lower && delay <= upper,
                "attempt {attempt}: delay {delay} outside [{lower}, {upper}]"
            );
        }
    }
}
