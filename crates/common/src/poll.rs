//! Poll-with-budget helper
//!
//! Several spots in the system have to wait out a kernel-state race: the
//! state they need (a vhci port, its device nodes) appears some unspecified
//! time after the action that causes it. This module expresses that wait as
//! an explicit budget — a number of attempts and a fixed interval — around a
//! success predicate, instead of ad-hoc sleep loops.

use std::time::Duration;
use tokio::time::sleep;

/// Retry budget: how many attempts, how long between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Total attempts, including the immediate first one
    pub attempts: u32,
    /// Sleep between attempts; never slept after a success or the last attempt
    pub interval: Duration,
}

impl PollBudget {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// One immediate attempt, no retries
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Worst-case wall-clock time spent sleeping
    pub fn max_wait(&self) -> Duration {
        self.interval * self.attempts.saturating_sub(1)
    }
}

/// Repeatedly evaluate `check` until it yields a value or the budget runs out
///
/// The first attempt happens immediately. A `Some` result is returned without
/// any further sleeping; `None` after the final attempt means the budget is
/// exhausted — the caller decides whether that is an error.
pub async fn poll_until<T, F>(budget: PollBudget, mut check: F) -> Option<T>
where
    F: FnMut() -> Option<T>,
{
    for attempt in 0..budget.attempts {
        if let Some(value) = check() {
            return Some(value);
        }
        if attempt + 1 < budget.attempts {
            sleep(budget.interval).await;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_succeeds_on_first_attempt_without_sleeping() {
        let budget = PollBudget::new(20, Duration::from_secs(60));
        let started = std::time::Instant::now();
        let result = poll_until(budget, || Some(7)).await;
        assert_eq!(result, Some(7));
        // A success on attempt one must not wait out any interval
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_returns_value_on_nth_attempt() {
        let mut calls = 0;
        let budget = PollBudget::new(20, Duration::from_millis(1));
        let result = poll_until(budget, || {
            calls += 1;
            (calls == 3).then_some("ready")
        })
        .await;
        assert_eq!(result, Some("ready"));
        assert_eq!(calls, 3, "must stop polling once the predicate passes");
    }

    #[tokio::test]
    async fn test_exhausts_full_budget_before_giving_up() {
        let mut calls = 0;
        let budget = PollBudget::new(5, Duration::from_millis(1));
        let result: Option<()> = poll_until(budget, || {
            calls += 1;
            None
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn test_zero_attempts_never_calls_predicate() {
        let mut calls = 0;
        let result: Option<()> = poll_until(PollBudget::new(0, Duration::ZERO), || {
            calls += 1;
            None
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_max_wait() {
        let budget = PollBudget::new(20, Duration::from_millis(200));
        assert_eq!(budget.max_wait(), Duration::from_millis(3800));
        assert_eq!(PollBudget::once().max_wait(), Duration::ZERO);
    }
}
