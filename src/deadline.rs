//! Cancellation context for blocking runtime calls

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ContmanError, Result};

/// Optional absolute deadline shared by a manager and its containers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No deadline: calls run until the runtime answers
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn after(duration: Duration) -> Self {
        Self {
            at: Some(Instant::now() + duration),
        }
    }

    pub fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Run `fut`, failing with [`ContmanError::Cancelled`] once the deadline passes
    ///
    /// An already expired deadline fails without polling `fut`.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_expired() {
            return Err(ContmanError::Cancelled);
        }
        match self.at {
            None => fut.await,
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| ContmanError::Cancelled)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unbounded_runs_to_completion() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        let value = deadline.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_elapsed_deadline_cancels_pending_call() {
        let deadline = Deadline::after(Duration::from_millis(20));
        let result: Result<()> = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ContmanError::Cancelled)));
        assert!(deadline.is_expired());
    }

    #[tokio::test]
    async fn test_expired_deadline_rejects_ready_future() {
        let deadline = Deadline::at(Instant::now());
        let result = deadline.run(async { Ok(1) }).await;
        assert!(matches!(result, Err(ContmanError::Cancelled)));
    }

    #[tokio::test]
    async fn test_inner_error_is_preserved() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let result: Result<()> = deadline
            .run(async { Err(ContmanError::WaitEnded("abc".to_string())) })
            .await;
        assert!(matches!(result, Err(ContmanError::WaitEnded(_))));
    }
}
