//! Roster API client — status reporting for the coordinating service.
//!
//! Every request carries the calling flow's execution id and type as
//! headers, so the coordinator can attribute the call to the chat turn or
//! task run that made it.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;

use crate::context;
use crate::error::ClientError;
use crate::tasks::{OutcomeReporter, TaskAssignment, TaskOutcome, TaskStatus};

/// Header carrying the execution id of the calling flow.
pub const EXECUTION_ID_HEADER: &str = "x-roster-execution-id";

/// Header carrying the execution type (`chat` or `task`) of the calling flow.
pub const EXECUTION_TYPE_HEADER: &str = "x-roster-execution-type";

/// Status update posted to the roster API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusUpdate {
    /// A task reached a terminal state.
    TaskFinished {
        task: String,
        description: String,
        assignment: TaskAssignment,
        status: TaskStatus,
        result: String,
        error: String,
    },
}

impl From<&TaskOutcome> for StatusUpdate {
    fn from(outcome: &TaskOutcome) -> Self {
        Self::TaskFinished {
            task: outcome.name.clone(),
            description: outcome.description.clone(),
            assignment: outcome.assignment.clone(),
            status: outcome.status,
            result: outcome.result.clone(),
            error: outcome.error.clone(),
        }
    }
}

/// HTTP client for the roster API.
#[derive(Clone)]
pub struct RosterClient {
    api_url: String,
    status_update_path: String,
    client: reqwest::Client,
}

impl RosterClient {
    pub fn new(api_url: impl Into<String>, status_update_path: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            status_update_path: status_update_path.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// POST a JSON body and return the decoded response (`Null` if empty).
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<serde_json::Value, ClientError> {
        let response = self
            .client
            .post(self.url(path))
            .headers(execution_headers())
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Post a status update to the configured endpoint.
    pub async fn status_update(&self, update: &StatusUpdate) -> Result<(), ClientError> {
        self.post(&self.status_update_path, update).await?;
        Ok(())
    }
}

#[async_trait]
impl OutcomeReporter for RosterClient {
    async fn report(&self, outcome: &TaskOutcome) -> Result<(), ClientError> {
        self.status_update(&StatusUpdate::from(outcome)).await
    }
}

/// Execution headers for the calling flow; empty outside any flow.
pub fn execution_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    let Some((_, execution)) = context::get() else {
        return headers;
    };

    match HeaderValue::from_str(&execution.execution_id) {
        Ok(value) => {
            headers.insert(EXECUTION_ID_HEADER, value);
            headers.insert(
                EXECUTION_TYPE_HEADER,
                HeaderValue::from_static(execution.execution_type.as_str()),
            );
        }
        Err(_) => {
            tracing::warn!(
                execution_id = %execution.execution_id,
                "Execution id is not a valid header value; sending request without execution headers"
            );
        }
    }
    headers
}
