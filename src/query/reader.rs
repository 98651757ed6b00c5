//! Incremental reading of the remote engine's JSON output.
//!
//! `sqlite3 -json` prints a JSON array with one row object per line:
//!
//! ```text
//! [{"id":1,"name":"a"},
//! {"id":2,"name":"b"}]
//! ```
//!
//! Each line is stripped of the array punctuation and parsed on its own, so
//! rows can be collected while the remote query is still running. Reading
//! stops at the row cap or at the deadline, whichever comes first.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::remote::RemoteProcess;
use crate::types::ResultRow;

/// Maximum rows read per query unless configured otherwise.
pub const DEFAULT_ROW_CAP: usize = 2000;

/// Wall-clock budget for a whole read unless configured otherwise.
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(60);

/// stderr substrings that mean the engine could not parse the SQL.
/// The second one is what sqlite3 builds before 3.33 print.
const PARSE_ERROR_MARKERS: [&str; 2] = ["Parse error", ": syntax error"];

/// Rows collected from one remote process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamedRows {
    /// Rows in the order the remote process emitted them.
    pub rows: Vec<ResultRow>,
    /// The deadline passed before the output ended.
    pub timed_out: bool,
    /// The row cap was reached; more rows may have followed.
    pub truncated: bool,
}

/// Why line reading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    Eof,
    CapReached,
    DeadlineHit,
}

/// Reads rows from a remote process under a row cap and a time budget.
#[derive(Debug, Clone, Copy)]
pub struct StreamingResultReader {
    row_cap: usize,
    time_budget: Duration,
}

impl Default for StreamingResultReader {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_CAP, DEFAULT_TIME_BUDGET)
    }
}

impl StreamingResultReader {
    pub fn new(row_cap: usize, time_budget: Duration) -> Self {
        Self {
            row_cap,
            time_budget,
        }
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    /// Reads the process's output to completion, the cap, or the deadline.
    ///
    /// The process is terminated on every path. `query_text` is what a
    /// syntax error reports back, so callers pass the SQL the user wrote,
    /// not the generated script.
    pub async fn read(&self, process: &mut RemoteProcess, query_text: &str) -> Result<StreamedRows> {
        let deadline = Instant::now() + self.time_budget;
        let mut stderr = process.take_stderr().map(|pipe| tokio::spawn(drain(pipe)));

        let result = self
            .collect(process, &mut stderr, query_text, deadline)
            .await;

        process.terminate().await;
        if let Some(task) = stderr {
            task.abort();
        }

        result
    }

    async fn collect(
        &self,
        process: &mut RemoteProcess,
        stderr: &mut Option<JoinHandle<String>>,
        query_text: &str,
        deadline: Instant,
    ) -> Result<StreamedRows> {
        let stdout = process
            .take_stdout()
            .ok_or_else(|| EngineError::internal("Remote process stdout is not captured"))?;

        let (rows, end) = self
            .read_lines(BufReader::new(stdout), deadline)
            .await?;

        match end {
            StreamEnd::CapReached => {
                warn!(
                    "Row cap of {} reached on {}, stopping read",
                    self.row_cap,
                    process.host()
                );
                Ok(StreamedRows {
                    rows,
                    timed_out: false,
                    truncated: true,
                })
            }
            StreamEnd::DeadlineHit => Ok(timed_out(rows, self.time_budget)),
            StreamEnd::Eof => {
                let status = match timeout_at(deadline, process.wait()).await {
                    Ok(status) => status.map_err(|e| {
                        EngineError::connectivity(format!("Failed to wait for remote process: {e}"))
                    })?,
                    Err(_) => return Ok(timed_out(rows, self.time_budget)),
                };

                let stderr_text = match stderr.as_mut() {
                    Some(task) => match timeout_at(deadline, task).await {
                        Ok(Ok(text)) => text,
                        Ok(Err(e)) => {
                            debug!("stderr reader failed: {e}");
                            String::new()
                        }
                        Err(_) => {
                            debug!("stderr still open at deadline");
                            String::new()
                        }
                    },
                    None => String::new(),
                };

                classify_exit(status, &stderr_text, query_text)?;
                Ok(StreamedRows {
                    rows,
                    timed_out: false,
                    truncated: false,
                })
            }
        }
    }

    /// Reads and parses lines until EOF, the cap, or the deadline.
    ///
    /// A line that is not a row object aborts the read; rows parsed before
    /// it are dropped along with it.
    pub(crate) async fn read_lines<R>(
        &self,
        reader: R,
        deadline: Instant,
    ) -> Result<(Vec<ResultRow>, StreamEnd)>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut rows = Vec::new();

        loop {
            if rows.len() >= self.row_cap {
                return Ok((rows, StreamEnd::CapReached));
            }
            // A stream that always has a line ready would never let the
            // timer fire below.
            if Instant::now() >= deadline {
                return Ok((rows, StreamEnd::DeadlineHit));
            }

            let line = match timeout_at(deadline, lines.next_line()).await {
                Err(_) => return Ok((rows, StreamEnd::DeadlineHit)),
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return Ok((rows, StreamEnd::Eof)),
                Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    warn!("Remote output is not valid UTF-8");
                    return Err(EngineError::decode("<invalid utf-8>", e.to_string()));
                }
                Ok(Err(e)) => {
                    return Err(EngineError::connectivity(format!(
                        "Failed to read remote output: {e}"
                    )))
                }
            };

            if let Some(row) = parse_row_line(&line)? {
                rows.push(row);
            }
        }
    }
}

fn timed_out(rows: Vec<ResultRow>, budget: Duration) -> StreamedRows {
    warn!(
        "Time budget of {:?} exceeded, returning {} rows",
        budget,
        rows.len()
    );
    StreamedRows {
        rows,
        timed_out: true,
        truncated: false,
    }
}

async fn drain(mut pipe: ChildStderr) -> String {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!("Failed to read remote stderr: {e}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Parses one line of `-json` output into a row.
///
/// Array brackets, separating commas and whitespace around the object are
/// stripped first. Blank lines yield `None`.
pub fn parse_row_line(line: &str) -> Result<Option<ResultRow>> {
    let trimmed =
        line.trim_matches(|c: char| c == '[' || c == ']' || c == ',' || c.is_whitespace());
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
        warn!("Error decoding JSON line: {line}");
        EngineError::decode(line, e.to_string())
    })?;

    match value {
        serde_json::Value::Object(object) => Ok(Some(ResultRow::from_json_object(object))),
        other => Err(EngineError::decode(
            line,
            format!("expected a JSON object, found {}", json_kind(&other)),
        )),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Turns a finished process's exit status and stderr into an error, if any.
///
/// A parse-error marker wins over the exit status; any other non-zero exit
/// is reported as a connectivity failure.
pub fn classify_exit(status: ExitStatus, stderr: &str, query_text: &str) -> Result<()> {
    if PARSE_ERROR_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
    {
        return Err(EngineError::syntax(stderr.trim(), query_text));
    }

    if !status.success() {
        let detail = stderr.trim();
        return Err(EngineError::connectivity(if detail.is_empty() {
            format!("Remote process exited with {status}")
        } else {
            format!("Remote process exited with {status}: {detail}")
        }));
    }

    Ok(())
}
