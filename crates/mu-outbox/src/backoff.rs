//! Exponential backoff with jitter for outbox delivery retries
//! (spec.md §4.7 "exponential backoff with a jitter range").

use rand::Rng;

pub const BASE_DELAY_MS: i64 = 500;
pub const MAX_DELAY_MS: i64 = 5 * 60 * 1000;

/// `backoff(attempt)`: `base * 2^(attempt-1)` capped at `MAX_DELAY_MS`,
/// plus up to 20% jitter so retries from concurrent failures don't
/// synchronize.
pub fn backoff_ms(attempt: u32) -> i64 {
    let exponent = attempt.saturating_sub(1).min(16);
    let exponential = BASE_DELAY_MS.saturating_mul(1i64 << exponent);
    let capped = exponential.min(MAX_DELAY_MS);
    let jitter_span = (capped as f64 * 0.2) as i64;
    if jitter_span <= 0 {
        return capped;
    }
    let jitter = rand::thread_rng().gen_range(0..=jitter_span);
    capped + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_and_is_capped() {
        let first = backoff_ms(1);
        let second = backoff_ms(2);
        assert!(first >= BASE_DELAY_MS);
        assert!(second > first || second >= BASE_DELAY_MS * 2);
        let far_future = backoff_ms(50);
        assert!(far_future <= MAX_DELAY_MS + MAX_DELAY_MS / 5);
    }

    #[test]
    fn never_negative_or_zero() {
        for attempt in 1..20 {
            assert!(backoff_ms(attempt) > 0);
        }
    }
}
