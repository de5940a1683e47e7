//! Agent interface — what the entrypoint drives for chat turns and tasks.

pub mod echo;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tasks::{TaskAssignment, TaskExecutor};

pub use echo::EchoAgent;

/// One message of a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }
}

/// An agent hosted by this process.
///
/// Both methods run inside the execution flow the entrypoint established,
/// so activity they emit is attributed to the chat turn or task.
#[async_trait]
pub trait RosterAgent: Send + Sync {
    /// Reply to a conversation.
    async fn chat(
        &self,
        identity: &str,
        team: &str,
        role: &str,
        history: &[ChatMessage],
    ) -> anyhow::Result<String>;

    /// Run a task to completion and return its result.
    async fn execute_task(
        &self,
        name: &str,
        description: &str,
        assignment: &TaskAssignment,
    ) -> anyhow::Result<String>;
}

/// Runs a [`RosterAgent`]'s tasks under the task manager.
#[derive(Clone)]
pub struct AgentExecutor {
    agent: Arc<dyn RosterAgent>,
}

impl AgentExecutor {
    pub fn new(agent: Arc<dyn RosterAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl TaskExecutor for AgentExecutor {
    async fn execute(
        &self,
        name: &str,
        description: &str,
        assignment: &TaskAssignment,
    ) -> anyhow::Result<String> {
        self.agent.execute_task(name, description, assignment).await
    }
}
