//! HTTP entrypoint: health, chat, task control and the live activity stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{delete, get, post},
};
use futures::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use crate::activity::ActivityBroadcaster;
use crate::agent::{AgentExecutor, ChatMessage, RosterAgent};
use crate::context::{self, ActivityContext};
use crate::error::TaskError;
use crate::tasks::{TaskAssignment, TaskExecutor, TaskManager};

/// Interval between SSE keep-alive comments.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<dyn RosterAgent>,
    /// Runs the agent's tasks under the task manager.
    pub executor: Arc<dyn TaskExecutor>,
    pub tasks: TaskManager,
    pub activity: Arc<ActivityBroadcaster>,
}

impl AppState {
    pub fn new(
        agent: Arc<dyn RosterAgent>,
        tasks: TaskManager,
        activity: Arc<ActivityBroadcaster>,
    ) -> Self {
        let executor: Arc<dyn TaskExecutor> = Arc::new(AgentExecutor::new(Arc::clone(&agent)));
        Self {
            agent,
            executor,
            tasks,
            activity,
        }
    }
}

/// Build the agent router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/chat", post(chat))
        .route("/tasks", post(execute_task).get(list_tasks))
        .route("/tasks/{task}", delete(cancel_task))
        .route("/activity-stream", get(activity_stream))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

enum ApiError {
    Task(TaskError),
    BadRequest(String),
    Internal(String),
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Self::Task(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Task(err @ TaskError::AlreadyRunning { .. }) => {
                (StatusCode::CONFLICT, err.to_string())
            }
            Self::Task(err @ TaskError::NotRunning { .. }) => {
                (StatusCode::NOT_FOUND, err.to_string())
            }
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn healthcheck() -> Json<bool> {
    Json(true)
}

// ── Chat ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatRequest {
    identity: String,
    team: String,
    role: String,
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!(identity = %req.identity, messages = req.messages.len(), "Chat request");

    let flow = ActivityContext::chat(&req.identity, &req.team, &req.role);
    let reply = context::scope(
        flow,
        state
            .agent
            .chat(&req.identity, &req.team, &req.role, &req.messages),
    )
    .await
    .map_err(|e| {
        error!(identity = %req.identity, error = %e, "Chat failed");
        ApiError::Internal(e.to_string())
    })?;

    Ok(Json(serde_json::json!({ "message": reply })))
}

// ── Tasks ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TaskRequest {
    task: String,
    #[serde(default)]
    description: String,
    assignment: Option<TaskAssignment>,
}

async fn execute_task(
    State(state): State<AppState>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<bool>, ApiError> {
    let Some(assignment) = req.assignment else {
        warn!(task = %req.task, "Rejected task without assignment");
        return Err(ApiError::BadRequest(format!(
            "Task {} has no assignment",
            req.task
        )));
    };

    let flow = ActivityContext::task(&req.task, &assignment);
    let executor = Arc::clone(&state.executor);
    context::scope(flow, async {
        state
            .tasks
            .run(executor, &req.task, &req.description, assignment.clone())
    })
    .await?;

    Ok(Json(true))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(task): Path<String>,
) -> Result<Json<bool>, ApiError> {
    state.tasks.cancel(&task)?;
    Ok(Json(true))
}

async fn list_tasks(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.tasks.running_tasks())
}

// ── Activity stream ─────────────────────────────────────────────────────

async fn activity_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state.activity.stream();
    info!(listener = ?events.id(), "Activity stream viewer connected");

    let frames = events.map(|event| {
        let frame = match event.to_json() {
            Ok(json) => Event::default().data(json),
            Err(e) => {
                warn!(error = %e, "Failed to serialize activity event");
                Event::default().comment("unserializable event")
            }
        };
        Ok(frame)
    });

    Sse::new(frames).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
