//! Mock executor for testing.
//!
//! Answers queries from canned responses instead of a remote host and keeps
//! every request it saw.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{QueryOutcome, QueryRequest, RemoteExecutor};
use crate::error::{EngineError, Result};
use crate::remote::RemoteTarget;
use crate::types::ResultRow;

#[derive(Debug, Clone)]
enum Response {
    Rows(Vec<ResultRow>),
    TimedOut(Vec<ResultRow>),
    Failure(String),
}

/// An executor that returns predefined results.
///
/// Responses are matched by substring against the request SQL, first match
/// wins. Unmatched queries return no rows.
#[derive(Debug, Default)]
pub struct MockExecutor {
    responses: Vec<(String, Response)>,
    requests: Mutex<Vec<QueryRequest>>,
}

impl MockExecutor {
    /// Creates a mock with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers queries containing `pattern` with `rows`.
    pub fn with_rows(mut self, pattern: impl Into<String>, rows: Vec<ResultRow>) -> Self {
        self.responses.push((pattern.into(), Response::Rows(rows)));
        self
    }

    /// Answers queries containing `pattern` with a timed-out read of `rows`.
    pub fn with_timeout(mut self, pattern: impl Into<String>, rows: Vec<ResultRow>) -> Self {
        self.responses
            .push((pattern.into(), Response::TimedOut(rows)));
        self
    }

    /// Fails queries containing `pattern` with a connectivity error.
    pub fn with_failure(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses
            .push((pattern.into(), Response::Failure(message.into())));
        self
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn respond(&self, request: &QueryRequest) -> Option<Response> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.responses
            .iter()
            .find(|(pattern, _)| request.sql.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn execute(&self, _target: &RemoteTarget, request: &QueryRequest) -> Result<QueryOutcome> {
        match self.respond(request) {
            Some(Response::Rows(rows)) => Ok(QueryOutcome::from_rows(rows)),
            Some(Response::TimedOut(rows)) => Ok(QueryOutcome {
                timed_out: true,
                ..QueryOutcome::from_rows(rows)
            }),
            Some(Response::Failure(message)) => Err(EngineError::connectivity(message)),
            None => Ok(QueryOutcome::default()),
        }
    }

    async fn execute_once(
        &self,
        _target: &RemoteTarget,
        request: &QueryRequest,
    ) -> Result<Option<Vec<ResultRow>>> {
        match self.respond(request) {
            Some(Response::Rows(rows)) | Some(Response::TimedOut(rows)) if rows.is_empty() => {
                Ok(None)
            }
            Some(Response::Rows(rows)) | Some(Response::TimedOut(rows)) => Ok(Some(rows)),
            Some(Response::Failure(message)) => Err(EngineError::connectivity(message)),
            None => Ok(None),
        }
    }
}
