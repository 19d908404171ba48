//! Retry backoff math (spec §4.11): full-jitter exponential backoff.
//!
//! `delay_n = min(max_delay, base_delay * 2^(n-1)) * U(0.5, 1.5)`
//!
//! grounded the same way a message-shipper's retry controller computes its
//! next-attempt delay: deterministic bound, randomized jitter on top so a
//! burst of failures at the same instant doesn't retry in lockstep.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Computes the delay before attempt `n` (1-indexed: `n=1` is the first retry).
pub fn backoff_delay(config: &RetryConfig, attempt_number: u32) -> Duration {
    backoff_delay_with_rng(config, attempt_number, &mut rand::rng())
}

fn backoff_delay_with_rng(config: &RetryConfig, attempt_number: u32, rng: &mut impl Rng) -> Duration {
    let exponent = attempt_number.saturating_sub(1).min(31);
    let exponential_ms = config.base_delay_ms.saturating_mul(1u64 << exponent);
    let capped_ms = exponential_ms.min(config.max_delay_ms);

    let jitter = rng.random_range(0.5..=1.5);
    let jittered_ms = (capped_ms as f64 * jitter).round() as u64;

    Duration::from_millis(jittered_ms)
}

/// Whether a delivery should continue retrying, per spec §4.9: bounded both
/// by attempt count and by total elapsed wall-clock age.
pub fn should_retry(config: &RetryConfig, attempt_number: u32, event_age: Duration) -> bool {
    attempt_number < config.max_attempts && event_age < config.max_event_age()
}
