//! Unit-of-work abstraction run by the task manager.

use std::future::Future;

use async_trait::async_trait;

use super::state::TaskAssignment;

/// Long-running work executed for a named task.
///
/// The returned future is dropped at its current await point when the task
/// is cancelled.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        name: &str,
        description: &str,
        assignment: &TaskAssignment,
    ) -> anyhow::Result<String>;
}

#[async_trait]
impl<F, Fut> TaskExecutor for F
where
    F: Fn(String, String, TaskAssignment) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn execute(
        &self,
        name: &str,
        description: &str,
        assignment: &TaskAssignment,
    ) -> anyhow::Result<String> {
        (self)(name.to_string(), description.to_string(), assignment.clone()).await
    }
}
