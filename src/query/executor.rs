//! Query execution against a remote sqlite3 CLI.
//!
//! Ties the pieces together: script text from [`build_script`], a channel
//! and process from the [`ChannelManager`], rows from the
//! [`StreamingResultReader`].

use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::reader::StreamingResultReader;
use super::script::build_script;
use super::{QueryOutcome, QueryRequest, RemoteExecutor};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::remote::{remote_command, ChannelManager, RemoteTarget};
use crate::types::ResultRow;

/// Runs queries over ssh. Cheap to clone; clones share the session.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    channels: ChannelManager,
    reader: StreamingResultReader,
}

impl QueryExecutor {
    /// Creates an executor from its parts.
    pub fn new(channels: ChannelManager, reader: StreamingResultReader) -> Self {
        Self { channels, reader }
    }

    /// Creates an executor with a fresh session from engine settings.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let channels = ChannelManager::new(config.ssh_settings())?;
        let reader = StreamingResultReader::new(config.row_cap(), config.time_budget());
        Ok(Self::new(channels, reader))
    }

    /// Returns the channel manager.
    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    /// Returns the reader settings.
    pub fn reader(&self) -> &StreamingResultReader {
        &self.reader
    }

    /// Checks that the target's sqlite3 binary is usable.
    pub async fn probe(&self, target: &RemoteTarget) -> Result<String> {
        self.channels.probe(target.host(), target.binary()).await
    }

    /// Drops all control connections, waiting for in-flight queries.
    pub async fn reset(&self) -> Result<()> {
        self.channels.reset().await
    }

    /// Tears the session down for good.
    pub async fn shutdown(&self) -> Result<()> {
        self.channels.shutdown().await
    }
}

#[async_trait]
impl RemoteExecutor for QueryExecutor {
    async fn execute(&self, target: &RemoteTarget, request: &QueryRequest) -> Result<QueryOutcome> {
        debug!("Running command: {}", request.sql);
        let script = build_script(&request.sql, &request.params)?;

        let channel = self.channels.acquire(target.host()).await?;
        let start = Instant::now();
        let mut process = self
            .channels
            .spawn(&channel, &remote_command(target, request.write))?;

        let writer = process.feed(script);
        let result = self.reader.read(&mut process, &request.sql).await;
        writer.abort();

        let mut outcome = QueryOutcome::from(result?);
        outcome.elapsed = start.elapsed();
        debug!(
            "Read {} rows from {} in {:?}",
            outcome.row_count(),
            target.host(),
            outcome.elapsed
        );
        Ok(outcome)
    }

    async fn execute_once(
        &self,
        target: &RemoteTarget,
        request: &QueryRequest,
    ) -> Result<Option<Vec<ResultRow>>> {
        debug!("Running command to completion: {}", request.sql);
        let script = build_script(&request.sql, &request.params)?;

        let channel = self.channels.acquire(target.host()).await?;
        let mut process = self
            .channels
            .spawn(&channel, &remote_command(target, request.write))?;

        let writer = process.feed(script);
        let output = process.finish().await.map_err(|e| {
            EngineError::connectivity(format!("Failed to run command on {}: {e}", target.host()))
        })?;
        if let Err(e) = writer.await {
            debug!("Script writer task failed: {e}");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::connectivity(format!(
                "Command on {} exited with {}: {}",
                target.host(),
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| EngineError::decode("<invalid utf-8>", e.to_string()))?;
        if stdout.trim().is_empty() {
            return Ok(None);
        }

        parse_row_array(&stdout).map(Some)
    }
}

/// Parses complete `-json` output: one array of row objects.
fn parse_row_array(stdout: &str) -> Result<Vec<ResultRow>> {
    let excerpt = || stdout.chars().take(200).collect::<String>();
    let value: serde_json::Value =
        serde_json::from_str(stdout).map_err(|e| EngineError::decode(excerpt(), e.to_string()))?;
    let serde_json::Value::Array(items) = value else {
        return Err(EngineError::decode(excerpt(), "expected a JSON array of rows"));
    };

    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::Object(object) => Ok(ResultRow::from_json_object(object)),
            other => Err(EngineError::decode(other.to_string(), "expected a JSON object")),
        })
        .collect()
}
