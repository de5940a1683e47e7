//! Reference agent: narrates its work on the activity stream and echoes chat.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ChatMessage, RosterAgent};
use crate::activity::ActivityBroadcaster;
use crate::tasks::TaskAssignment;

/// Number of actions a task takes when not configured.
pub const DEFAULT_STEPS: usize = 3;

pub struct EchoAgent {
    activity: Arc<ActivityBroadcaster>,
    step_delay: Duration,
    steps: usize,
}

impl EchoAgent {
    pub fn new(activity: Arc<ActivityBroadcaster>, step_delay: Duration) -> Self {
        Self {
            activity,
            step_delay,
            steps: DEFAULT_STEPS,
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }
}

#[async_trait]
impl RosterAgent for EchoAgent {
    async fn chat(
        &self,
        identity: &str,
        _team: &str,
        _role: &str,
        history: &[ChatMessage],
    ) -> anyhow::Result<String> {
        let Some(last) = history.last() else {
            self.activity.thought("Nothing to reply to");
            return Ok(String::new());
        };

        self.activity
            .thought(format!("{identity} is replying to {}", last.sender));
        Ok(last.text.clone())
    }

    async fn execute_task(
        &self,
        name: &str,
        description: &str,
        assignment: &TaskAssignment,
    ) -> anyhow::Result<String> {
        self.activity.thought(format!(
            "{} ({}) planning {name}: {description}",
            assignment.identity, assignment.role
        ));

        // Each sleep is an await point where cancellation lands.
        for step in 1..=self.steps {
            tokio::time::sleep(self.step_delay).await;
            self.activity
                .action(format!("{name}: step {step}/{}", self.steps));
        }

        Ok(format!("Completed {name} in {} steps", self.steps))
    }
}
