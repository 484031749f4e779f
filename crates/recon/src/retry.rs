//! Bounded, cancellable retry with exponential backoff and jitter.
//!
//! Used at two granularities: per HTTP request by the fetch adapters, and
//! per whole pass by the status/freshness runners (a transient failure
//! restarts the batch rather than resuming it).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::warn;

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Stop,
    Retry,
    /// Retry, waiting at least this long (e.g. a `Retry-After` header).
    RetryAfter(Duration),
}

/// Terminal outcome of [`RetryPolicy::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The error was classified as not retryable.
    Stopped(E),
    /// Every attempt failed.
    GaveUp { attempts: u32, last: E },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. At least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Relative spread applied to each delay, 0.0..=1.0.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Constant delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            jitter: 0.0,
        }
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry number `retry`, with jitter drawn from the thread RNG.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        let unit = if jitter > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        apply_jitter(self.backoff(retry), jitter, unit)
    }

    /// Run `op` until it succeeds, `classify` says stop, attempts run out,
    /// or `cancel` fires. `op` receives the 1-based attempt number.
    pub fn run<T, E, F, C>(
        &self,
        label: &str,
        cancel: &CancelToken,
        mut op: F,
        classify: C,
    ) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
        C: Fn(&E) -> RetryDecision,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let wait = match classify(&err) {
                RetryDecision::Stop => return Err(RetryError::Stopped(err)),
                RetryDecision::Retry => self.delay_for(attempt),
                RetryDecision::RetryAfter(min) => self.delay_for(attempt).max(min),
            };

            if attempt >= max_attempts {
                return Err(RetryError::GaveUp {
                    attempts: attempt,
                    last: err,
                });
            }

            warn!(
                "{label}: retry {}/{} in {:.1}s ({err})",
                attempt,
                max_attempts - 1,
                wait.as_secs_f64(),
            );
            if !cancel.sleep(wait) {
                return Err(RetryError::Cancelled);
            }
            attempt += 1;
        }
    }
}

fn apply_jitter(delay: Duration, jitter: f64, unit: f64) -> Duration {
    let scale = 1.0 + jitter * unit.clamp(-1.0, 1.0);
    delay.mul_f64(scale.max(0.0))
}

/// Cooperative cancellation flag shared across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep in short slices. Returns `false` if cancelled before the end.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: 0.0,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(5), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_in_band() {
        let d = Duration::from_secs(10);
        assert_eq!(apply_jitter(d, 0.2, 1.0), Duration::from_secs(12));
        assert_eq!(apply_jitter(d, 0.2, -1.0), Duration::from_secs(8));
        assert_eq!(apply_jitter(d, 0.0, 1.0), d);

        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::fixed(3, Duration::from_millis(100))
        };
        for _ in 0..50 {
            let wait = policy.delay_for(1);
            assert!(wait >= Duration::from_millis(50) && wait <= Duration::from_millis(150));
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let out: Result<u32, RetryError<String>> = quick(5).run(
            "test",
            &CancelToken::new(),
            |attempt| {
                calls.set(calls.get() + 1);
                if attempt < 3 {
                    Err("boom".to_string())
                } else {
                    Ok(attempt)
                }
            },
            |_| RetryDecision::Retry,
        );
        assert_eq!(out, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let out: Result<(), RetryError<String>> = quick(3).run(
            "test",
            &CancelToken::new(),
            |_| {
                calls.set(calls.get() + 1);
                Err("down".to_string())
            },
            |_| RetryDecision::Retry,
        );
        assert_eq!(
            out,
            Err(RetryError::GaveUp {
                attempts: 3,
                last: "down".to_string()
            })
        );
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn fatal_error_stops_immediately() {
        let calls = Cell::new(0);
        let out: Result<(), RetryError<String>> = quick(5).run(
            "test",
            &CancelToken::new(),
            |_| {
                calls.set(calls.get() + 1);
                Err("401".to_string())
            },
            |_| RetryDecision::Stop,
        );
        assert_eq!(out, Err(RetryError::Stopped("401".to_string())));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let out: Result<(), RetryError<String>> =
            quick(5).run("test", &cancel, |_| Ok(()), |_| RetryDecision::Retry);
        assert_eq!(out, Err(RetryError::Cancelled));
    }

    #[test]
    fn cancel_interrupts_sleep() {
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let started = Instant::now();
        assert!(!cancel.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn zero_attempts_means_one() {
        let calls = Cell::new(0);
        let _: Result<(), RetryError<String>> = quick(0).run(
            "test",
            &CancelToken::new(),
            |_| {
                calls.set(calls.get() + 1);
                Err("x".to_string())
            },
            |_| RetryDecision::Retry,
        );
        assert_eq!(calls.get(), 1);
    }
}
