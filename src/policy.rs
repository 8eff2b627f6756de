//! Per-call limits for external capability calls.
//!
//! Every generation, search and fetch call made by the pipeline goes through a
//! [`CallPolicy`]. The policy bounds each attempt by a per-call timeout and by
//! the remaining time until the workflow deadline, stops immediately when the
//! run's cancellation token fires, and retries transient failures with a
//! doubling backoff.

use crate::errors::CapabilityError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Timeout, deadline, cancellation and retry settings shared by one run.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    call_timeout: Option<Duration>,
    deadline: Option<Instant>,
    retries: u32,
    backoff: Duration,
    cancel: CancellationToken,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl CallPolicy {
    /// A policy with no timeout, no deadline and no retries.
    pub fn unbounded() -> Self {
        Self {
            call_timeout: None,
            deadline: None,
            retries: 0,
            backoff: Duration::ZERO,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Set the workflow deadline relative to now.
    pub fn with_deadline_in(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Time budget for the next attempt: the smaller of the call timeout and
    /// the time left until the deadline.
    fn attempt_budget(&self, capability: &str) -> Result<Option<Duration>, CapabilityError> {
        let remaining = match self.deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(CapabilityError::DeadlineExceeded {
                        capability: capability.to_string(),
                    });
                }
                Some(deadline - now)
            }
            None => None,
        };

        Ok(match (self.call_timeout, remaining) {
            (Some(t), Some(r)) => Some(t.min(r)),
            (Some(t), None) => Some(t),
            (None, r) => r,
        })
    }

    /// Run `call` under this policy.
    ///
    /// `call` is invoked once per attempt. `Cancelled` and `DeadlineExceeded`
    /// are never retried.
    pub async fn call<T, F, Fut>(&self, capability: &str, mut call: F) -> Result<T, CapabilityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let mut attempt = 0u32;
        let mut backoff = self.backoff;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CapabilityError::Cancelled {
                    capability: capability.to_string(),
                });
            }
            let budget = self.attempt_budget(capability)?;

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(CapabilityError::Cancelled {
                        capability: capability.to_string(),
                    });
                }
                outcome = bounded(capability, budget, call()) => outcome,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        capability,
                        attempt,
                        retries = self.retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient capability failure, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Err(CapabilityError::Cancelled {
                                capability: capability.to_string(),
                            });
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

async fn bounded<T, Fut>(
    capability: &str,
    budget: Option<Duration>,
    fut: Fut,
) -> Result<T, CapabilityError>
where
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    match budget {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .unwrap_or_else(|_| {
                Err(CapabilityError::Timeout {
                    capability: capability.to_string(),
                    after,
                })
            }),
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_call_passes_through_success() {
        let policy = CallPolicy::unbounded();
        let value = policy
            .call("generate", || async { Ok::<_, CapabilityError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_retries_transient_failures() {
        let policy = CallPolicy::unbounded().with_retries(2, Duration::from_millis(100));
        let calls = AtomicU32::new(0);

        let value = policy
            .call("generate", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CapabilityError::failed("generate", "flaky"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_gives_up_after_retry_budget() {
        let policy = CallPolicy::unbounded().with_retries(1, Duration::from_millis(10));
        let calls = AtomicU32::new(0);

        let err = policy
            .call("generate", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(CapabilityError::failed("generate", "down")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CapabilityError::Failed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out() {
        let policy = CallPolicy::unbounded().with_call_timeout(Duration::from_secs(5));
        let err = policy
            .call("generate", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, CapabilityError>(())
            })
            .await
            .unwrap_err();

        match err {
            CapabilityError::Timeout { after, .. } => assert_eq!(after, Duration::from_secs(5)),
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_shrinks_attempt_budget() {
        let policy = CallPolicy::unbounded()
            .with_call_timeout(Duration::from_secs(60))
            .with_deadline_in(Duration::from_secs(2));
        let err = policy
            .call("generate", || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, CapabilityError>(())
            })
            .await
            .unwrap_err();

        match err {
            CapabilityError::Timeout { after, .. } => assert!(after <= Duration::from_secs(2)),
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_deadline_does_not_call() {
        let policy = CallPolicy::unbounded().with_deadline_in(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        let calls = AtomicU32::new(0);

        let err = policy
            .call("search", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, CapabilityError>(()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CapabilityError::DeadlineExceeded { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        let policy = CallPolicy::unbounded()
            .with_retries(3, Duration::from_millis(1))
            .with_cancellation(token.clone());
        token.cancel();

        let err = policy
            .call("generate", || async { Ok::<_, CapabilityError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Cancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_call() {
        let token = CancellationToken::new();
        let policy = CallPolicy::unbounded().with_cancellation(token.clone());

        let canceller = {
            let token = token.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                token.cancel();
            }
        };
        let call = policy.call("generate", || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, CapabilityError>(())
        });

        let (result, ()) = tokio::join!(call, canceller);
        assert!(matches!(result, Err(CapabilityError::Cancelled { .. })));
    }
}
