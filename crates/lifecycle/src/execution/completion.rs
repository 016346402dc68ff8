//! Single-resolution completion of an execution

use std::future::Future;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::ActivityError;

/// What an execution resolves to: result values, or an error
pub type ExecutionOutcome = Result<Vec<Value>, ActivityError>;

type Resolver = Box<dyn FnOnce(ExecutionOutcome) + Send + 'static>;

/// Resolves one execution exactly once
///
/// Handed to the execute behavior with every execution. `resolve` consumes
/// the completion, so a second resolution cannot be expressed. Dropping it
/// unresolved leaves the activity entered; that run can be picked up again
/// with `resume`.
///
/// # Example
///
/// ```
/// use tokenflow_lifecycle::Completion;
///
/// let (completion, mut rx) = Completion::channel();
/// completion.succeed_with(serde_json::json!({"ok": true}));
/// assert!(rx.try_recv().unwrap().is_ok());
/// ```
pub struct Completion {
    resolver: Resolver,
}

impl Completion {
    /// Create a completion from a resolver function
    pub fn new(resolver: impl FnOnce(ExecutionOutcome) + Send + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
        }
    }

    /// Create a completion whose outcome is delivered to a oneshot receiver
    pub fn channel() -> (Self, oneshot::Receiver<ExecutionOutcome>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        (completion, rx)
    }

    /// Resolve with an outcome
    pub fn resolve(self, outcome: ExecutionOutcome) {
        (self.resolver)(outcome)
    }

    /// Resolve successfully with any number of result values
    pub fn succeed(self, values: Vec<Value>) {
        self.resolve(Ok(values))
    }

    /// Resolve successfully with a single result value
    pub fn succeed_with(self, value: Value) {
        self.resolve(Ok(vec![value]))
    }

    /// Resolve with an execution error
    pub fn fail(self, error: impl Into<ActivityError>) {
        self.resolve(Err(error.into()))
    }

    /// Drive an async execute body on the current tokio runtime
    ///
    /// The completion resolves with the future's output when it finishes.
    pub fn spawn<F>(self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ExecutionOutcome> + Send + 'static,
    {
        tokio::spawn(async move {
            let outcome = future.await;
            self.resolve(outcome);
        })
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_succeed_delivers_values() {
        let (completion, mut rx) = Completion::channel();
        completion.succeed(vec![json!(1), json!(2)]);

        assert_eq!(rx.try_recv().unwrap(), Ok(vec![json!(1), json!(2)]));
    }

    #[test]
    fn test_fail_delivers_error() {
        let (completion, mut rx) = Completion::channel();
        completion.fail(ActivityError::new("boom"));

        let outcome = rx.try_recv().unwrap();
        assert_eq!(outcome, Err(ActivityError::new("boom")));
    }

    #[test]
    fn test_dropped_completion_closes_channel() {
        let (completion, mut rx) = Completion::channel();
        drop(completion);

        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_spawn_resolves_with_future_output() {
        let (completion, rx) = Completion::channel();

        completion
            .spawn(async {
                tokio::task::yield_now().await;
                Ok(vec![json!("async")])
            })
            .await
            .expect("task should not panic");

        assert_eq!(rx.await.unwrap(), Ok(vec![json!("async")]));
    }
}
