//! Bounded await loop with cancellation.
//!
//! The predicate is evaluated once per attempt and answers "are we still
//! waiting?". The loop sleeps between attempts, never before the first one,
//! and gives up with [`AwaitError::TimeoutExceeded`] once the final attempt
//! still reports waiting.

use crate::config::AwaitConfig;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Delay/attempt budget for one await loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl AwaitPolicy {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl From<&AwaitConfig> for AwaitPolicy {
    fn from(config: &AwaitConfig) -> Self {
        Self::new(config.delay(), config.max_attempts)
    }
}

/// Errors raised by [`await_until`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AwaitError {
    /// The attempt budget ran out with the condition still unsatisfied.
    #[error("condition '{condition}' not satisfied after {attempts} attempts")]
    TimeoutExceeded { condition: String, attempts: u32 },

    /// The surrounding run was cancelled while waiting.
    #[error("await for '{condition}' cancelled")]
    Cancelled { condition: String },
}

impl From<AwaitError> for crate::error::ProvisionerError {
    fn from(error: AwaitError) -> Self {
        match error {
            AwaitError::TimeoutExceeded { .. } => {
                crate::error::ProvisionerError::TimeoutExceeded(error.to_string())
            }
            AwaitError::Cancelled { condition } => {
                crate::error::ProvisionerError::Cancelled(condition)
            }
        }
    }
}

/// Run-level cancellation signal.
///
/// Cloned into every worker and await loop; checked at each tick and before
/// each dispatch. In-flight HTTP calls are allowed to complete so remote
/// state is never left half-mutated.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Poll `still_waiting` until it returns false or the budget is exhausted.
///
/// The predicate receives the 1-based attempt index. Returns
/// [`AwaitError::TimeoutExceeded`] when attempt `max_attempts` still reports
/// waiting, and [`AwaitError::Cancelled`] as soon as the cancel signal is
/// observed at a tick boundary.
pub async fn await_until<F, Fut>(
    policy: &AwaitPolicy,
    condition: &str,
    cancel: &CancelSignal,
    mut still_waiting: F,
) -> Result<(), AwaitError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    let mut attempt: u32 = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(AwaitError::Cancelled {
                condition: condition.to_string(),
            });
        }

        if !still_waiting(attempt).await {
            debug!(
                condition = %condition,
                attempt = attempt,
                "Await condition satisfied"
            );
            return Ok(());
        }

        if attempt >= policy.max_attempts {
            return Err(AwaitError::TimeoutExceeded {
                condition: condition.to_string(),
                attempts: attempt,
            });
        }

        attempt += 1;
        tokio::time::sleep(policy.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_timeout_after_exact_attempt_count() {
        let policy = AwaitPolicy::new(Duration::from_millis(10), 3);
        let cancel = CancelSignal::new();
        let evaluations = AtomicU32::new(0);

        let result = await_until(&policy, "never", &cancel, |_| {
            evaluations.fetch_add(1, Ordering::SeqCst);
            async { true }
        })
        .await;

        assert_eq!(
            result,
            Err(AwaitError::TimeoutExceeded {
                condition: "never".to_string(),
                attempts: 3,
            })
        );
        assert_eq!(evaluations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_satisfied_condition_stops_early() {
        let policy = AwaitPolicy::new(Duration::from_millis(10), 5);
        let cancel = CancelSignal::new();

        let result = await_until(&policy, "third time", &cancel, |attempt| async move {
            attempt < 3
        })
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_immediately_satisfied_condition_never_sleeps() {
        let policy = AwaitPolicy::new(Duration::from_secs(60), 2);
        let cancel = CancelSignal::new();

        // With a 60s delay this only completes quickly if no sleep happens
        // before the first evaluation.
        let result = await_until(&policy, "already up", &cancel, |_| async { false }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_observed_at_tick() {
        let policy = AwaitPolicy::new(Duration::from_millis(10), 100);
        let cancel = CancelSignal::new();
        let cancel_inner = cancel.clone();

        let result = await_until(&policy, "cancelled", &cancel, |attempt| {
            if attempt == 2 {
                cancel_inner.cancel();
            }
            async { true }
        })
        .await;

        assert_eq!(
            result,
            Err(AwaitError::Cancelled {
                condition: "cancelled".to_string(),
            })
        );
    }
}
