//! Backoff delay computation.
//!
//! Jitter uses a deterministic SplitMix64 mix rather than a system RNG:
//! decorrelating concurrent retriers only requires the *inputs* to differ
//! (attempt index, base/cap, and a per-process nonce), not genuine entropy,
//! and it keeps backoff math reproducible in tests without mocking a random
//! source.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Exponential or linear growth curve for retry delays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffKind {
    Exponential,
    Linear,
}

/// A fully-specified backoff policy: growth curve, base, cap, and whether to
/// jitter.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

static JITTER_NONCE: AtomicU64 = AtomicU64::new(0x9E3779B97F4A7C15);

impl BackoffPolicy {
    /// Delay for attempt index `i >= 0`:
    /// `exponential: min(b * 2^i, m)`, `linear: min(b * (i+1), m)`, optionally
    /// multiplied by a jitter factor in `[0.5, 1.0]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let unjittered = match self.kind {
            BackoffKind::Exponential => {
                let factor = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
                self.base_delay.saturating_mul(factor as u32).min(self.max_delay)
            }
            BackoffKind::Linear => self
                .base_delay
                .saturating_mul(attempt.saturating_add(1))
                .min(self.max_delay),
        };

        if !self.jitter {
            return unjittered;
        }

        let nonce = JITTER_NONCE.fetch_add(1, Ordering::Relaxed);
        let seed = mix64(nonce ^ fold_duration(unjittered) ^ (attempt as u64));
        let factor = jitter_factor(seed);
        Duration::from_secs_f64((unjittered.as_secs_f64() * factor).max(0.0))
    }
}

/// `reconnectDelay * 2^(attempts-1)` with the same `[0.5, 1.0]` jitter used for
/// call retries. `attempts` is 1-based.
pub fn reconnect_delay(reconnect_delay: Duration, attempts: u32, jitter: bool) -> Duration {
    let exponent = attempts.saturating_sub(1).min(63);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let unjittered = reconnect_delay.saturating_mul(factor as u32);

    if !jitter {
        return unjittered;
    }

    let nonce = JITTER_NONCE.fetch_add(1, Ordering::Relaxed);
    let seed = mix64(nonce ^ fold_duration(unjittered) ^ (attempts as u64));
    Duration::from_secs_f64((unjittered.as_secs_f64() * jitter_factor(seed)).max(0.0))
}

#[inline]
fn fold_duration(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    let upper = (nanos >> 64) as u64;
    let lower = nanos as u64;
    upper ^ lower
}

#[inline]
fn jitter_factor(seed: u64) -> f64 {
    let mixed = mix64(seed);
    let mantissa = (mixed >> 11) as f64;
    let unit = mantissa / ((1u64 << 53) as f64);
    0.5 + unit * 0.5
}

#[inline]
fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_and_caps() {
        let policy = BackoffPolicy {
            kind: BackoffKind::Exponential,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn linear_grows_by_base_each_attempt() {
        let policy = BackoffPolicy {
            kind: BackoffKind::Linear,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(300));
    }

    #[test]
    fn jitter_stays_within_half_to_full_range() {
        let policy = BackoffPolicy {
            kind: BackoffKind::Exponential,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: true,
        };
        for attempt in 0..20 {
            let unjittered = BackoffPolicy { jitter: false, ..policy }.delay_for_attempt(attempt);
            let jittered = policy.delay_for_attempt(attempt);
            assert!(jittered.as_secs_f64() >= unjittered.as_secs_f64() * 0.5 - 1e-9);
            assert!(jittered.as_secs_f64() <= unjittered.as_secs_f64() + 1e-9);
        }
    }

    #[test]
    fn reconnect_delay_doubles_from_first_attempt() {
        let base = Duration::from_millis(10);
        assert_eq!(reconnect_delay(base, 1, false), Duration::from_millis(10));
        assert_eq!(reconnect_delay(base, 2, false), Duration::from_millis(20));
        assert_eq!(reconnect_delay(base, 3, false), Duration::from_millis(40));
    }
}
