//! Query execution for litexplore.
//!
//! Builds scripts, runs them on the remote engine and reads the rows back.
//! [`RemoteExecutor`] is the seam the schema helpers are written against, so
//! they can be tested with [`MockExecutor`] instead of a real host.

pub mod executor;
mod mock;
pub mod reader;
pub mod script;

pub use executor::QueryExecutor;
pub use mock::MockExecutor;
pub use reader::{StreamedRows, StreamingResultReader, DEFAULT_ROW_CAP, DEFAULT_TIME_BUDGET};
pub use script::{build_script, encode_literal, param_key, QueryParams};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{EngineError, Result};
use crate::remote::RemoteTarget;
use crate::types::{ResultRow, Value};

/// A query to run: SQL text, named parameters and whether it may write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    /// SQL sent verbatim after the parameter prelude.
    pub sql: String,
    /// Parameters bound with `.param set`.
    pub params: QueryParams,
    /// Opens the database read-write instead of read-only.
    pub write: bool,
}

impl QueryRequest {
    /// Creates a read-only request without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    /// Adds a named parameter. `id` and `:id` name the same parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self.params.insert(param_key(&name).to_string(), value.into());
        self
    }

    /// Replaces all parameters.
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    /// Marks the request as allowed to write.
    pub fn writable(mut self, write: bool) -> Self {
        self.write = write;
        self
    }
}

/// What a bounded query returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    /// Rows in emission order.
    pub rows: Vec<ResultRow>,
    /// The time budget ran out; `rows` is what arrived before it did.
    pub timed_out: bool,
    /// The row cap was reached; later rows were not read.
    pub truncated: bool,
    /// Time from spawning the process to the end of the read.
    pub elapsed: Duration,
}

impl QueryOutcome {
    /// Creates a complete outcome from rows.
    pub fn from_rows(rows: Vec<ResultRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Returns the number of rows read.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no rows were read.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the rows, or a `Timeout` error carrying them if the read timed out.
    pub fn into_rows(self) -> Result<Vec<ResultRow>> {
        if self.timed_out {
            return Err(EngineError::Timeout { rows: self.rows });
        }
        Ok(self.rows)
    }

    /// Returns a notice for partial results, if any.
    pub fn truncation_warning(&self) -> Option<String> {
        if self.timed_out {
            Some(format!(
                "⚠ Query timed out: showing the first {} rows",
                self.rows.len()
            ))
        } else if self.truncated {
            Some(format!(
                "⚠ Result truncated: showing the first {} rows",
                self.rows.len()
            ))
        } else {
            None
        }
    }
}

impl From<StreamedRows> for QueryOutcome {
    fn from(streamed: StreamedRows) -> Self {
        Self {
            rows: streamed.rows,
            timed_out: streamed.timed_out,
            truncated: streamed.truncated,
            elapsed: Duration::ZERO,
        }
    }
}

/// Runs queries against a remote target.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Runs a query under the row cap and time budget.
    async fn execute(&self, target: &RemoteTarget, request: &QueryRequest) -> Result<QueryOutcome>;

    /// Runs a query to completion with no cap or budget.
    ///
    /// Returns `None` when the engine printed nothing.
    async fn execute_once(
        &self,
        target: &RemoteTarget,
        request: &QueryRequest,
    ) -> Result<Option<Vec<ResultRow>>>;
}
