//! Retry delays: `base * 2^attempt` plus up to 25% random jitter.

use std::time::Duration;

use rand::Rng;

/// Upper bound of the jitter as a fraction of the nominal delay.
pub const MAX_JITTER_FRACTION: f64 = 0.25;

/// Delay before retrying after the zero-based `attempt` failed, without jitter.
pub fn nominal_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Nominal delay plus `jitter` (clamped to `[0, 0.25]`) of itself.
pub fn delay_with_jitter(base: Duration, attempt: u32, jitter: f64) -> Duration {
    let nominal = nominal_delay(base, attempt);
    nominal.saturating_add(nominal.mul_f64(jitter.clamp(0.0, MAX_JITTER_FRACTION)))
}

/// Delay with uniformly random jitter.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION);
    delay_with_jitter(base, attempt, jitter)
}
