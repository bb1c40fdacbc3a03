//! Poll-predicate waits
//!
//! Timer-driven pages (sort animations, traversal step timers) give no
//! completion signal, so a wait samples page state every `poll_interval`
//! until the sample is accepted or the deadline passes.
//!
//! ```text
//! Pending ──sample accepted──▶ Satisfied
//!    │
//!    └────deadline reached───▶ TimedOut (last sample still returned)
//! ```
//!
//! A state that becomes true and false again between two polls is never
//! seen. Choose a poll interval shorter than the shortest state a test
//! cares about.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, trace};

use crate::error::{E2eError, E2eResult};

/// Default timeout for waits (5 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Longest timeout a wait honours (one day); larger values are clamped
pub const MAX_WAIT_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;

/// Timing for a single wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitOptions {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    pub const fn new(timeout_ms: u64, poll_interval_ms: u64) -> Self {
        Self {
            timeout_ms,
            poll_interval_ms,
        }
    }

    /// Clamped to [`MAX_WAIT_TIMEOUT_MS`] so the deadline always fits in an `Instant`
    pub const fn timeout(&self) -> Duration {
        if self.timeout_ms > MAX_WAIT_TIMEOUT_MS {
            Duration::from_millis(MAX_WAIT_TIMEOUT_MS)
        } else {
            Duration::from_millis(self.timeout_ms)
        }
    }

    /// Never zero; a zero interval would spin
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Terminal result of one wait
#[derive(Debug, Clone)]
pub struct WaitOutcome<T> {
    pub satisfied: bool,
    /// The satisfying sample, or the final one on timeout
    pub last_observed: Option<T>,
    /// Error from the final sample, if sampling failed
    pub last_error: Option<String>,
    pub elapsed: Duration,
    pub polls: u32,
}

impl<T: Debug> WaitOutcome<T> {
    pub fn timed_out(&self) -> bool {
        !self.satisfied
    }

    /// Turn a timeout into [`E2eError::WaitTimeout`] carrying the last sample
    pub fn into_result(self, description: impl Into<String>) -> E2eResult<T> {
        match (self.satisfied, self.last_observed) {
            (true, Some(value)) => Ok(value),
            (_, last) => {
                let last_observed = match (last, self.last_error) {
                    (Some(value), _) => format!("{:?}", value),
                    (None, Some(err)) => format!("error: {}", err),
                    (None, None) => "nothing".to_string(),
                };
                Err(E2eError::WaitTimeout {
                    description: description.into(),
                    last_observed,
                    elapsed: self.elapsed,
                })
            }
        }
    }
}

/// Sample with `sample` until `accept` returns true or the timeout elapses.
///
/// The first sample is taken immediately. The last one is taken at the
/// deadline, so a timed-out wait reports an elapsed time in
/// `[timeout, timeout + poll_interval)`. A sample may run until the deadline
/// (half a poll interval for the one taken at it); one that overruns is
/// abandoned and counts as a failed sample. Never fails; sampling errors are
/// recorded in [`WaitOutcome::last_error`] and count as unsatisfied.
pub async fn wait_for<T, S, Fut, A>(options: &WaitOptions, mut sample: S, accept: A) -> WaitOutcome<T>
where
    S: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<T>>,
    A: Fn(&T) -> bool,
{
    let start = Instant::now();
    let deadline = start + options.timeout();
    let poll_interval = options.poll_interval();
    let mut polls = 0u32;
    let mut last_observed = None;
    let mut last_error = None;

    loop {
        polls += 1;
        let budget = deadline
            .saturating_duration_since(Instant::now())
            .max(poll_interval / 2);
        let sampled = timeout(budget, sample())
            .await
            .unwrap_or(Err(E2eError::SampleTimeout(budget)));
        match sampled {
            Ok(value) => {
                let accepted = accept(&value);
                last_observed = Some(value);
                last_error = None;
                if accepted {
                    let elapsed = start.elapsed();
                    debug!("Wait satisfied after {:?} ({} polls)", elapsed, polls);
                    return WaitOutcome {
                        satisfied: true,
                        last_observed,
                        last_error,
                        elapsed,
                        polls,
                    };
                }
            }
            Err(e) => {
                trace!("Wait sample failed: {}", e);
                last_error = Some(e.to_string());
            }
        }

        let now = Instant::now();
        if now >= deadline {
            let elapsed = now - start;
            debug!("Wait timed out after {:?} ({} polls)", elapsed, polls);
            return WaitOutcome {
                satisfied: false,
                last_observed,
                last_error,
                elapsed,
                polls,
            };
        }

        sleep(poll_interval.min(deadline - now)).await;
    }
}

/// Wait until a JSON sample is truthy in the JavaScript sense
pub async fn wait_until_truthy<S, Fut>(options: &WaitOptions, sample: S) -> WaitOutcome<serde_json::Value>
where
    S: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<serde_json::Value>>,
{
    wait_for(options, sample, is_truthy).await
}

/// JavaScript truthiness of a JSON value
pub fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!(null), false)]
    #[test_case(json!(false), false)]
    #[test_case(json!(0), false)]
    #[test_case(json!(""), false)]
    #[test_case(json!(1.5), true)]
    #[test_case(json!("0"), true)]
    #[test_case(json!([]), true)]
    #[test_case(json!({}), true)]
    fn test_truthiness(value: serde_json::Value, expected: bool) {
        assert_eq!(is_truthy(&value), expected);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let options = WaitOptions::new(100, 0);
        assert_eq!(options.poll_interval(), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampling_errors_do_not_escape() {
        let options = WaitOptions::new(300, 100);
        let outcome: WaitOutcome<u32> = wait_for(
            &options,
            || async { Err(E2eError::ElementNotFound("#missing".into())) },
            |_| true,
        )
        .await;

        assert!(outcome.timed_out());
        assert!(outcome.last_observed.is_none());
        assert!(outcome.last_error.unwrap().contains("#missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_into_result_reports_last_observed() {
        let options = WaitOptions::new(200, 50);
        let err = wait_for(&options, || async { Ok(3usize) }, |n| *n >= 6)
            .await
            .into_result("six visited nodes")
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("six visited nodes"));
        assert!(message.contains("last observed: 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_sample_is_cut_off_at_deadline() {
        let options = WaitOptions::new(1000, 100);
        let outcome: WaitOutcome<u32> = wait_for(
            &options,
            || async {
                sleep(Duration::from_secs(10)).await;
                Ok(1)
            },
            |_| true,
        )
        .await;

        assert!(outcome.timed_out());
        assert_eq!(outcome.polls, 1);
        assert!(outcome.elapsed >= options.timeout());
        assert!(outcome.elapsed < options.timeout() + options.poll_interval());
        assert!(outcome.last_error.unwrap().contains("did not finish within 1000ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_final_sample_stays_within_one_poll() {
        let options = WaitOptions::new(300, 100);
        let outcome: WaitOutcome<u32> = wait_for(
            &options,
            || async {
                sleep(Duration::from_millis(250)).await;
                Ok(0)
            },
            |_| false,
        )
        .await;

        assert!(outcome.timed_out());
        assert!(outcome.elapsed >= options.timeout());
        assert!(outcome.elapsed < options.timeout() + options.poll_interval());
        assert!(outcome.last_error.is_some());
    }

    #[test]
    fn test_huge_timeout_is_clamped() {
        let options = WaitOptions::new(u64::MAX, 100);
        assert_eq!(options.timeout(), Duration::from_millis(MAX_WAIT_TIMEOUT_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_does_not_overflow_deadline() {
        let options = WaitOptions::new(u64::MAX, 100);
        let mut calls = 0u32;
        let outcome = wait_for(
            &options,
            || {
                calls += 1;
                let n = calls;
                async move { Ok::<_, E2eError>(n) }
            },
            |n| *n >= 3,
        )
        .await;

        assert!(outcome.satisfied);
        assert_eq!(outcome.polls, 3);
        assert_eq!(outcome.elapsed, Duration::from_millis(200));
    }
}
