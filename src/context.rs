//! Execution context — who is acting, as part of which chat turn or task run.
//!
//! The context is flow-local: it lives in a `tokio` task-local slot that is
//! entered with [`scope`] (or [`flow`]) around one logical flow. A unit
//! spawned through [`spawn`] receives a snapshot of the spawner's context and
//! owns that copy from then on, so concurrently interleaved flows never see
//! or overwrite each other's identity.

use std::cell::RefCell;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::task::futures::TaskLocalFuture;

use crate::error::ContextError;
use crate::tasks::TaskAssignment;

/// Execution id used for every chat turn.
pub const CHAT_EXECUTION_ID: &str = "chat";

/// Kind of flow an execution id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Chat,
    Task,
}

impl ExecutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Task => "task",
        }
    }
}

impl std::fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the chat turn or task run a piece of work belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub execution_type: ExecutionKind,
}

/// The acting agent identity within its team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentContext {
    pub identity: String,
    pub team: String,
    pub role: String,
}

/// Execution and agent context established for one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityContext {
    pub agent: AgentContext,
    pub execution: ExecutionContext,
}

impl ActivityContext {
    pub fn new(
        execution_id: impl Into<String>,
        execution_type: ExecutionKind,
        identity: impl Into<String>,
        team: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            agent: AgentContext {
                identity: identity.into(),
                team: team.into(),
                role: role.into(),
            },
            execution: ExecutionContext {
                execution_id: execution_id.into(),
                execution_type,
            },
        }
    }

    /// Context for one chat turn.
    pub fn chat(
        identity: impl Into<String>,
        team: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self::new(CHAT_EXECUTION_ID, ExecutionKind::Chat, identity, team, role)
    }

    /// Context for one run of the named task.
    pub fn task(name: impl Into<String>, assignment: &TaskAssignment) -> Self {
        Self::new(
            name,
            ExecutionKind::Task,
            assignment.identity.clone(),
            assignment.team.clone(),
            assignment.role.clone(),
        )
    }
}

tokio::task_local! {
    static FLOW: RefCell<Option<ActivityContext>>;
}

/// Run `f` as a flow with `context` established.
pub fn scope<F: Future>(
    context: ActivityContext,
    f: F,
) -> TaskLocalFuture<RefCell<Option<ActivityContext>>, F> {
    FLOW.scope(RefCell::new(Some(context)), f)
}

/// Run `f` as a fresh flow with no context yet; use [`set`] inside it.
pub fn flow<F: Future>(f: F) -> TaskLocalFuture<RefCell<Option<ActivityContext>>, F> {
    FLOW.scope(RefCell::new(None), f)
}

/// Run `f` as a new flow holding a snapshot of the caller's context.
pub fn inherit<F: Future>(f: F) -> TaskLocalFuture<RefCell<Option<ActivityContext>>, F> {
    FLOW.scope(RefCell::new(current()), f)
}

/// Spawn `f` onto the runtime, carrying the caller's context with it.
pub fn spawn<F>(f: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(inherit(f))
}

/// Establish the context for the calling flow.
///
/// Fails with [`ContextError::OutsideFlow`] when the caller is not running
/// inside [`scope`], [`flow`], [`inherit`] or [`spawn`].
pub fn set(
    execution_id: impl Into<String>,
    execution_type: ExecutionKind,
    identity: impl Into<String>,
    team: impl Into<String>,
    role: impl Into<String>,
) -> Result<(), ContextError> {
    let context = ActivityContext::new(execution_id, execution_type, identity, team, role);
    FLOW.try_with(move |cell| {
        *cell.borrow_mut() = Some(context);
    })
    .map_err(|_| ContextError::OutsideFlow)
}

/// The agent and execution context active for the calling flow, if any.
pub fn get() -> Option<(AgentContext, ExecutionContext)> {
    current().map(|ctx| (ctx.agent, ctx.execution))
}

/// The full context active for the calling flow, if any.
pub fn current() -> Option<ActivityContext> {
    FLOW.try_with(|cell| cell.borrow().clone()).ok().flatten()
}
