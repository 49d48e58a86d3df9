//! Combinators for the steps that run after files are committed
//!
//! Enabling publication, verifying the site and notifying the caller can
//! each fail without failing the job. [`fail_open`] downgrades such a failure
//! to a warning tagged with its [`FailureKind`]; [`retry_with_policy`] and
//! [`first_success`] produce the results it consumes.
//!
//! Generation, publishing and revision lookup are fatal and never go
//! through [`fail_open`].

use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::clock::Clock;
use crate::error::FailureKind;
use crate::Result;

/// Await a best-effort step, downgrading its error to a warning
///
/// The warning carries `kind` so non-fatal failures stay searchable by
/// taxonomy name. Returns `None` when the step failed.
pub async fn fail_open<T>(
    kind: FailureKind,
    step: &str,
    operation: impl Future<Output = Result<T>>,
) -> Option<T> {
    debug_assert!(!kind.is_fatal(), "{} is not a best-effort failure", kind);
    match operation.await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!(kind = %kind, "{} failed, continuing: {}", step, e);
            None
        }
    }
}

/// Bounded retry schedule
///
/// One attempt per backoff entry. The entry at index `i` is the wait after
/// failed attempt `i + 1`; no wait follows the final attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(backoff: Vec<Duration>) -> Self {
        Self { backoff }
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Callback notification schedule: 4 attempts, backoff 1s/2s/4s/8s
    pub fn notification() -> Self {
        Self::from_secs(&[1, 2, 4, 8])
    }

    /// Always at least one attempt
    pub fn max_attempts(&self) -> usize {
        self.backoff.len().max(1)
    }

    pub fn backoff(&self) -> &[Duration] {
        &self.backoff
    }

    /// Wait after the given 1-based failed attempt, `None` when no attempt follows
    pub fn delay_after(&self, attempt: usize) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts() {
            return None;
        }
        self.backoff.get(attempt - 1).copied()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::notification()
    }
}

/// Run `f` under `policy`, sleeping on `clock` between failed attempts
///
/// `f` receives the 1-based attempt number. Returns the first success or the
/// error from the final attempt.
pub async fn retry_with_policy<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    clock: &dyn Clock,
    mut f: F,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;
    loop {
        match f(attempt).await {
            Ok(val) => return Ok(val),
            Err(e) => match policy.delay_after(attempt) {
                Some(delay) => {
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}s",
                        operation_name,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_secs()
                    );
                    clock.sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    warn!(
                        "{} failed after {} attempts: {}",
                        operation_name, attempt, e
                    );
                    return Err(e);
                }
            },
        }
    }
}

/// A named attempt for [`first_success`]
pub type Strategy<'a, T> = (&'a str, BoxFuture<'a, Result<T>>);

/// Try each strategy in order until one succeeds
///
/// Futures are lazy, so later strategies never run once an earlier one wins.
/// Returns the winning strategy's name with its value, or `None` if all fail.
pub async fn first_success<'a, T>(
    operation_name: &str,
    strategies: Vec<Strategy<'a, T>>,
) -> Option<(&'a str, T)> {
    for (name, attempt) in strategies {
        match attempt.await {
            Ok(val) => return Some((name, val)),
            Err(e) => warn!("{} via {} failed: {}", operation_name, name, e),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::KilnError;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fail_open_passes_value_through() {
        let result = fail_open(FailureKind::Notification, "notify", async {
            Ok::<_, KilnError>(42)
        })
        .await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_swallows_error() {
        let result = fail_open(FailureKind::PublicationEnable, "enable pages", async {
            Err::<i32, _>(KilnError::PublicationEnable("422".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[test]
    fn test_notification_policy_schedule() {
        let policy = RetryPolicy::notification();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_after(4), None);
    }

    #[test]
    fn test_empty_policy_still_attempts_once() {
        let policy = RetryPolicy::new(vec![]);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_after(1), None);
    }

    #[tokio::test]
    async fn test_retry_success_after_transient_failure() {
        let clock = ManualClock::new();
        let result = retry_with_policy(
            "test_op",
            &RetryPolicy::notification(),
            &clock,
            |attempt| async move {
                if attempt < 3 {
                    Err(KilnError::Http("503".to_string()))
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_retry_exhausts_policy() {
        let clock = ManualClock::new();
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_with_policy(
            "test_op",
            &RetryPolicy::notification(),
            &clock,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(KilnError::Http("connection refused".to_string())) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test]
    async fn test_first_success_stops_at_winner() {
        let later_ran = AtomicUsize::new(0);
        let strategies: Vec<Strategy<'_, &str>> = vec![
            (
                "primary",
                async { Err(KilnError::Hosting("404".to_string())) }.boxed(),
            ),
            ("fallback", async { Ok("enabled") }.boxed()),
            (
                "never",
                async {
                    later_ran.fetch_add(1, Ordering::SeqCst);
                    Ok("unused")
                }
                .boxed(),
            ),
        ];

        let winner = first_success("enable", strategies).await;
        assert_eq!(winner, Some(("fallback", "enabled")));
        assert_eq!(later_ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_success_all_fail() {
        let strategies: Vec<Strategy<'_, ()>> = vec![
            ("a", async { Err(KilnError::Hosting("a".to_string())) }.boxed()),
            ("b", async { Err(KilnError::Hosting("b".to_string())) }.boxed()),
        ];
        assert!(first_success("enable", strategies).await.is_none());
    }
}
