//! Terminal outcome reporting.

use async_trait::async_trait;
use serde::Serialize;

use super::state::{TaskAssignment, TaskStatus};
use crate::error::ClientError;

/// Error string reported for cancelled tasks.
pub const CANCELLED_ERROR: &str = "Task cancelled";

/// Final result of one task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub name: String,
    pub description: String,
    pub assignment: TaskAssignment,
    pub status: TaskStatus,
    /// Executor output; empty unless the task succeeded.
    pub result: String,
    /// Failure message; empty if the task succeeded.
    pub error: String,
}

impl TaskOutcome {
    pub fn succeeded(
        name: impl Into<String>,
        description: impl Into<String>,
        assignment: TaskAssignment,
        result: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            assignment,
            status: TaskStatus::Succeeded,
            result: result.into(),
            error: String::new(),
        }
    }

    pub fn failed(
        name: impl Into<String>,
        description: impl Into<String>,
        assignment: TaskAssignment,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            assignment,
            status: TaskStatus::Failed,
            result: String::new(),
            error: error.into(),
        }
    }

    pub fn cancelled(
        name: impl Into<String>,
        description: impl Into<String>,
        assignment: TaskAssignment,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            assignment,
            status: TaskStatus::Cancelled,
            result: String::new(),
            error: CANCELLED_ERROR.to_string(),
        }
    }
}

/// Receives each task's terminal outcome, once.
#[async_trait]
pub trait OutcomeReporter: Send + Sync {
    async fn report(&self, outcome: &TaskOutcome) -> Result<(), ClientError>;
}
