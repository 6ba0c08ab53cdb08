//! Bounded retry with jittered exponential backoff.
//!
//! Only [`MintError::Transient`] is retried. Every other error returns to
//! the caller on the attempt that produced it; exhaustion returns the last
//! transient error.

use crate::error::MintError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// No wait at all (tests).
    None,
    /// Constant delay.
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`, then scaled by a random factor
    /// in `[0.5, 1.0]`.
    Jittered { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => d,
            Self::Jittered { base, max } => {
                let exp = attempt.saturating_sub(1).min(16);
                let ceiling = base.saturating_mul(1u32 << exp).min(max);
                let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
                ceiling.mul_f64(factor)
            }
        }
    }
}

/// Attempt budget plus delay schedule for one labelled operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Jittered policy with the given base and cap in milliseconds.
    pub fn jittered(max_attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        Self::new(
            max_attempts,
            Backoff::Jittered {
                base: Duration::from_millis(base_ms),
                max: Duration::from_millis(max_ms),
            },
        )
    }

    /// Policy without delays.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Backoff::None)
    }
}

/// Run `op` until it succeeds, fails non-transiently, or the attempt
/// budget runs out.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, MintError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MintError>>,
{
    let max = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max => {
                let delay = policy.backoff.delay(attempt);
                warn!(
                    "{label}: attempt {attempt}/{max} failed ({e}), retrying in {}ms",
                    delay.as_millis()
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("{label}: attempt {attempt}/{max} failed ({e}), giving up");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", &RetryPolicy::immediate(3), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(MintError::Transient(format!("try {n}")))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("op", &RetryPolicy::immediate(2), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(MintError::Transient(format!("try {n}")))
        })
        .await;
        match result {
            Err(MintError::Transient(msg)) => assert_eq!(msg, "try 2"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("op", &RetryPolicy::immediate(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MintError::Ambiguous("timeout after send".into()))
        })
        .await;
        assert!(matches!(result, Err(MintError::Ambiguous(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts, 1);
    }

    #[test]
    fn test_jittered_delay_stays_within_bounds() {
        let backoff = Backoff::Jittered {
            base: Duration::from_millis(100),
            max: Duration::from_millis(1000),
        };
        for attempt in 1..=10 {
            let d = backoff.delay(attempt);
            let ceiling = Duration::from_millis((100u64 << (attempt - 1)).min(1000));
            assert!(d <= ceiling, "attempt {attempt}: {d:?} > {ceiling:?}");
            assert!(
                d + Duration::from_micros(1) >= ceiling / 2,
                "attempt {attempt}: {d:?} < half of {ceiling:?}"
            );
        }
    }
}
