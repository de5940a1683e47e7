//! Task state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who a task is assigned to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    #[serde(alias = "identity_name")]
    pub identity: String,
    #[serde(alias = "team_name")]
    pub team: String,
    #[serde(alias = "role_name")]
    pub role: String,
}

impl TaskAssignment {
    pub fn new(
        identity: impl Into<String>,
        team: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            team: team.into(),
            role: role.into(),
        }
    }
}

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The executor is in flight.
    Running,
    /// The executor returned a result.
    Succeeded,
    /// The executor failed.
    Failed,
    /// The task observed a cancellation request.
    Cancelled,
}

impl TaskStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Running, Succeeded) | (Running, Failed) | (Running, Cancelled)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Registry view of one task run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    /// Task name, unique among running tasks.
    pub name: String,
    /// Task description.
    pub description: String,
    /// Who the task is assigned to.
    pub assignment: TaskAssignment,
    /// Current state.
    pub status: TaskStatus,
    /// When the run was accepted.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// A freshly accepted run.
    pub fn running(
        name: impl Into<String>,
        description: impl Into<String>,
        assignment: TaskAssignment,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            assignment,
            status: TaskStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Transition to a new state.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.status.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition task {} from {} to {}",
                self.name, self.status, new_status
            ));
        }

        self.status = new_status;
        if new_status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }

        Ok(())
    }
}
