//! Activity stream — thoughts and actions produced while an agent works.
//!
//! Producers call [`ActivityBroadcaster::thought`] or
//! [`ActivityBroadcaster::action`]; the broadcaster tags the event with the
//! execution context of the calling flow and fans it out synchronously to
//! every listener subscribed at that moment. Events emitted outside any
//! execution flow are dropped.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::context::{self, AgentContext, ExecutionKind};

/// Kind of activity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Thought,
    Action,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thought => "thought",
            Self::Action => "action",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A thought or action tagged with the flow that produced it.
///
/// Only the broadcaster constructs these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEvent {
    execution_id: String,
    execution_type: ExecutionKind,
    #[serde(rename = "type")]
    kind: ActivityKind,
    content: String,
    agent_context: AgentContext,
}

impl ActivityEvent {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn execution_type(&self) -> ExecutionKind {
        self.execution_type
    }

    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn agent_context(&self) -> &AgentContext {
        &self.agent_context
    }

    /// JSON body of the event as sent to stream viewers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ActivityEvent) + Send + Sync>;

/// Fan-out point for activity events.
pub struct ActivityBroadcaster {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl ActivityBroadcaster {
    /// Create a new broadcaster with no listeners.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Add a listener. It receives every event emitted until it is removed.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ActivityEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        trace!(listener = id.0, "Activity listener subscribed");
        id
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        let removed = listeners.len() != before;
        if removed {
            trace!(listener = id.0, "Activity listener unsubscribed");
        }
        removed
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Record a thought in the current flow.
    pub fn thought(&self, content: impl Into<String>) -> bool {
        self.emit(ActivityKind::Thought, content)
    }

    /// Record an action in the current flow.
    pub fn action(&self, content: impl Into<String>) -> bool {
        self.emit(ActivityKind::Action, content)
    }

    /// Tag an event with the calling flow's context and deliver it.
    ///
    /// Returns `false` when no execution context is active and the event was
    /// dropped.
    pub fn emit(&self, kind: ActivityKind, content: impl Into<String>) -> bool {
        let Some(ctx) = context::current() else {
            trace!(kind = %kind, "Dropping activity event outside an execution flow");
            return false;
        };

        let event = ActivityEvent {
            execution_id: ctx.execution.execution_id,
            execution_type: ctx.execution.execution_type,
            kind,
            content: content.into(),
            agent_context: ctx.agent,
        };

        debug!(
            execution_id = %event.execution_id,
            execution_type = %event.execution_type,
            kind = %event.kind,
            identity = %event.agent_context.identity,
            "{}",
            event.content
        );

        // Listeners may subscribe or unsubscribe from inside their callback.
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(&event);
        }

        true
    }

    /// Subscribe a channel-backed stream of events.
    ///
    /// The subscription is removed when the returned stream is dropped.
    pub fn stream(self: &Arc<Self>) -> ActivityStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |event| {
            // A closed receiver is cleaned up by ActivityStream::drop.
            let _ = tx.send(event.clone());
        });
        ActivityStream {
            broadcaster: Arc::clone(self),
            id,
            rx,
        }
    }
}

/// Live stream of activity events for one viewer.
pub struct ActivityStream {
    broadcaster: Arc<ActivityBroadcaster>,
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<ActivityEvent>,
}

impl ActivityStream {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<ActivityEvent> {
        self.rx.recv().await
    }
}

impl Stream for ActivityStream {
    type Item = ActivityEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ActivityStream {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
        debug!(listener = self.id.0, "Activity stream closed");
    }
}
